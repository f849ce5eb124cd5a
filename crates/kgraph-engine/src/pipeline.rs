use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use kgraph_core::{
    repo_key, CallSite, ClassEntity, Error, FileEntity, FunctionEntity, ImportSite, Language,
    Position, Result,
};

use crate::change::{detect_changes, ChangeDetectorConfig, FileRecord as ChangeFileRecord, Mode, SkippedFile, DEFAULT_MAX_FILE_SIZE};
use crate::commit_history::CommitHistory;
use crate::git::repository::GitRepository;
use crate::graph::writer::FileRecord as GraphFileRecord;
use crate::graph::{GraphStore, GraphWriter, PlaceholderResolver, ResolutionMode, ResolutionStrategy};
use crate::parser::{FileAst, ParserRegistry};

pub const DEFAULT_PARSE_CONCURRENCY: usize = 4;

/// Everything a `run` invocation needs, gathered from CLI flags/env.
pub struct PipelineConfig {
    /// Local path of a clone/checkout already on disk — cloning itself is a
    /// CLI-level concern (`gix::clone` against `--repo` when it's a URL).
    pub repo_path: PathBuf,
    pub repository: String,
    pub repository_url: String,
    pub branch: String,
    pub mode: Mode,
    pub force_reindex: bool,
    pub parse_concurrency: usize,
    pub resolution_strategy: ResolutionStrategy,
    pub resolution_mode: ResolutionMode,
    pub commit_history_path: PathBuf,
}

impl PipelineConfig {
    pub fn new(repo_path: impl Into<PathBuf>, repository: impl Into<String>, repository_url: impl Into<String>) -> Self {
        Self {
            repo_path: repo_path.into(),
            repository: repository.into(),
            repository_url: repository_url.into(),
            branch: "main".to_string(),
            mode: Mode::Incremental,
            force_reindex: false,
            parse_concurrency: DEFAULT_PARSE_CONCURRENCY,
            resolution_strategy: ResolutionStrategy::Hashmap,
            resolution_mode: ResolutionMode::Bulk,
            commit_history_path: PathBuf::from("commit_history.json"),
        }
    }
}

#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub commit: String,
    pub is_full_indexing: bool,
    pub files_detected: usize,
    pub files_written: usize,
    pub files_failed: Vec<(String, String)>,
    pub skipped: Vec<SkippedFile>,
    pub deleted: Vec<String>,
    pub deletions_failed: Vec<(String, String)>,
    pub calls_resolved: u64,
    pub calls_unresolved: u64,
    pub imports_resolved: u64,
    pub imports_unresolved: u64,
    pub last_indexed_commit_updated: bool,
}

/// Orchestrates ChangeDetector → Parser (worker pool) → GraphWriter →
/// PlaceholderResolver for a single repository run.
pub struct Pipeline {
    store: Arc<dyn GraphStore>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn run(&self, config: &PipelineConfig) -> Result<PipelineOutcome> {
        let repo = GitRepository::open(&config.repo_path)?;
        let mut history = CommitHistory::load(&config.commit_history_path)?;
        let key = repo_key(&config.repository_url, &config.branch);
        let last_commit = history.get(&key).map(str::to_string);

        let detector_config = ChangeDetectorConfig {
            repository: config.repository.clone(),
            url: config.repository_url.clone(),
            branch: config.branch.clone(),
            mode: config.mode,
            force_reindex: config.force_reindex,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        };
        let change_set = detect_changes(&repo, &detector_config, last_commit.as_deref())?;

        let writer = GraphWriter::new(self.store.clone());
        writer.ensure_schema().await?;
        if change_set.is_full_indexing {
            writer.clear_repository(&config.repository, true).await?;
        }

        let mut deletions_failed = Vec::new();
        for path in &change_set.deleted_paths {
            let file_id = FileEntity::derive_id(&config.repository, path);
            if let Err(e) = writer.delete_file(&file_id).await {
                warn!(path = %path, error = %e, "failed to delete file node for removed path");
                deletions_failed.push((path.clone(), e.to_string()));
            }
        }

        let registry = Arc::new(ParserRegistry::new());
        let semaphore = Arc::new(Semaphore::new(config.parse_concurrency.max(1)));
        let files_detected_count = change_set.file_data.len();
        let mut parse_tasks = Vec::with_capacity(files_detected_count);

        for record in change_set.file_data {
            let registry = Arc::clone(&registry);
            let semaphore = Arc::clone(&semaphore);
            parse_tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let path = Path::new(&record.path).to_path_buf();
                let parsed = registry.parse_file(&path, &record.content);
                (record, parsed)
            }));
        }

        let resolver = PlaceholderResolver::new(self.store.clone(), config.resolution_strategy);
        let mut files_written = 0usize;
        let mut files_failed = Vec::new();

        for task in parse_tasks {
            let (record, parsed) = task.await.map_err(|e| Error::Bug(format!("parse task panicked: {e}")))?;
            match parsed {
                Ok((language, ast)) => {
                    let graph_record = to_graph_record(&config.repository, &config.repository_url, &record, language, &ast);
                    match writer.write_file(&graph_record).await {
                        Ok(()) => {
                            files_written += 1;
                            if config.resolution_mode == ResolutionMode::Immediate {
                                if let Err(e) = resolver.resolve_file(&config.repository, &graph_record.file.id).await {
                                    warn!(file = %record.path, error = %e, "immediate resolution pass failed");
                                }
                            }
                        }
                        Err(e) => {
                            error!(file = %record.path, error = %e, "failed to write file to graph");
                            files_failed.push((record.path.clone(), e.to_string()));
                        }
                    }
                }
                Err(e) => {
                    warn!(file = %record.path, error = %e, "failed to parse file");
                    files_failed.push((record.path.clone(), e.to_string()));
                }
            }
        }

        // Bulk resolution always runs, even when immediate mode already
        // resolved most placeholders eagerly — it is the pass that catches
        // forward references to functions parsed later in this same run.
        let resolution = resolver.resolve_repository(&config.repository).await?;

        let all_accounted = files_written + files_failed.len() == files_detected_count && deletions_failed.is_empty();
        let last_indexed_commit_updated = all_accounted;
        if all_accounted {
            history.set_and_save(&key, &change_set.commit)?;
        } else {
            warn!(
                repository = %config.repository,
                deletions_failed = deletions_failed.len(),
                "not every file was written, failed, or deleted; leaving last_indexed_commit untouched"
            );
        }

        info!(
            repository = %config.repository,
            commit = %change_set.commit,
            written = files_written,
            failed = files_failed.len(),
            calls_resolved = resolution.calls_resolved,
            calls_unresolved = resolution.calls_unresolved,
            "pipeline run complete"
        );

        Ok(PipelineOutcome {
            commit: change_set.commit,
            is_full_indexing: change_set.is_full_indexing,
            files_detected: change_set.files_detected,
            files_written,
            files_failed,
            skipped: change_set.skipped,
            deleted: change_set.deleted_paths,
            deletions_failed,
            calls_resolved: resolution.calls_resolved,
            calls_unresolved: resolution.calls_unresolved,
            imports_resolved: resolution.imports_resolved,
            imports_unresolved: resolution.imports_unresolved,
            last_indexed_commit_updated,
        })
    }
}

/// Converts parser output for one file into graph entities, deriving every
/// id the same way a later, independent run would — that's what makes
/// `write_file` idempotent across runs.
fn to_graph_record(
    repository: &str,
    repository_url: &str,
    record: &ChangeFileRecord,
    language: Language,
    ast: &FileAst,
) -> GraphFileRecord {
    let file_id = FileEntity::derive_id(repository, &record.path);
    let file = FileEntity {
        id: file_id.clone(),
        path: record.path.clone(),
        name: Path::new(&record.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| record.path.clone()),
        language,
        repository: repository.to_string(),
        repository_url: repository_url.to_string(),
        commit: record.commit.clone(),
        branch: record.branch.clone(),
        last_updated: crate::change::now(),
    };

    let mut class_ids: HashMap<String, String> = HashMap::new();
    let classes: Vec<ClassEntity> = ast
        .classes
        .iter()
        .map(|c| {
            let id = ClassEntity::derive_id(&file_id, &c.name);
            class_ids.insert(c.name.clone(), id.clone());
            ClassEntity {
                id,
                name: c.name.clone(),
                file_id: file_id.clone(),
                start_line: c.start_line,
                end_line: c.end_line,
                docstring: c.docstring.clone(),
                bases: c.bases.clone(),
            }
        })
        .collect();

    let mut function_ids: HashMap<(String, String), String> = HashMap::new();
    let functions: Vec<FunctionEntity> = ast
        .functions
        .iter()
        .map(|f| {
            let enclosing = f.enclosing_class.clone().unwrap_or_default();
            let class_id = class_ids.get(&enclosing).cloned().unwrap_or_default();
            let id = FunctionEntity::derive_id(&file_id, &f.name, &class_id);
            function_ids.insert((enclosing, f.name.clone()), id.clone());
            FunctionEntity {
                id,
                name: f.name.clone(),
                file_id: file_id.clone(),
                class_id,
                start_line: f.start_line,
                end_line: f.end_line,
                params: f.params.clone(),
                docstring: f.docstring.clone(),
                is_method: f.enclosing_class.is_some(),
            }
        })
        .collect();

    let call_sites: Vec<CallSite> = ast
        .calls
        .iter()
        .map(|c| {
            let id = CallSite::derive_id(&file_id, c.start_line, c.start_col, &c.call_name);
            let caller_class_id = c.enclosing_class.as_ref().and_then(|cn| class_ids.get(cn)).cloned();
            let caller_function_id = function_ids
                .get(&(c.enclosing_class.clone().unwrap_or_default(), c.enclosing_function.clone().unwrap_or_default()))
                .cloned();
            CallSite {
                id,
                caller_file_id: file_id.clone(),
                caller_function_id,
                caller_class_id,
                call_name: c.call_name.clone(),
                call_module: c.call_module.clone(),
                position: Position {
                    start_line: c.start_line,
                    start_col: c.start_col,
                    end_line: c.end_line,
                    end_col: c.end_col,
                },
                is_attribute_call: c.is_attribute_call,
            }
        })
        .collect();

    let import_sites: Vec<ImportSite> = ast
        .imports
        .iter()
        .map(|i| {
            let kind = if i.is_from_import { "from" } else { "import" };
            let qualified = if i.module.is_empty() {
                i.imported_name.clone()
            } else {
                format!("{}.{}", i.module, i.imported_name)
            };
            let id = ImportSite::derive_id(&file_id, kind, i.start_line, &qualified);
            ImportSite {
                id,
                file_id: file_id.clone(),
                import_name: i.imported_name.clone(),
                module_name: if i.module.is_empty() { None } else { Some(i.module.clone()) },
                alias: i.alias.clone(),
                is_from_import: i.is_from_import,
                position: Position {
                    start_line: i.start_line,
                    start_col: 0,
                    end_line: i.start_line,
                    end_col: 0,
                },
            }
        })
        .collect();

    GraphFileRecord {
        file,
        classes,
        functions,
        call_sites,
        import_sites,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ExtractedClass, ExtractedFunction};

    #[test]
    fn to_graph_record_links_methods_to_their_class() {
        let record = ChangeFileRecord {
            path: "a.py".into(),
            content: vec![],
            repository: "repo".into(),
            url: "https://example.com/r.git".into(),
            commit: "c1".into(),
            branch: "main".into(),
        };
        let ast = FileAst {
            tree: None,
            classes: vec![ExtractedClass {
                name: "Dog".into(),
                start_line: 1,
                end_line: 5,
                docstring: None,
                bases: vec![],
            }],
            functions: vec![ExtractedFunction {
                name: "bark".into(),
                start_line: 2,
                end_line: 3,
                params: vec![],
                docstring: None,
                return_type: None,
                enclosing_class: Some("Dog".into()),
            }],
            imports: vec![],
            calls: vec![],
        };

        let graph_record = to_graph_record("repo", "https://example.com/r.git", &record, Language::Python, &ast);
        assert_eq!(graph_record.functions.len(), 1);
        assert_eq!(graph_record.functions[0].class_id, graph_record.classes[0].id);
    }
}
