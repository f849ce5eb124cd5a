use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use kgraph_engine::artifacts::{self, GitOutput};
use kgraph_engine::change::{detect_changes, ChangeDetectorConfig, DEFAULT_MAX_FILE_SIZE};
use kgraph_engine::commit_history::CommitHistory;
use kgraph_engine::git::GitRepository;
use kgraph_engine::graph::{Neo4jStore, ResolutionStrategy};
use kgraph_engine::{Pipeline, PipelineConfig};

use crate::Step;

pub struct RunArgs {
    pub repo: String,
    pub branch: String,
    pub output_dir: Option<PathBuf>,
    pub mode: kgraph_engine::change::Mode,
    pub force_reindex: bool,
    pub step: Step,
    pub resolution_strategy: ResolutionStrategy,
    pub immediate_resolution: bool,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub neo4j_database: Option<String>,
    pub workspace_dir: PathBuf,
}

/// Resolve `--repo` to a local checkout: a path that exists on disk is used
/// as-is, anything else is treated as a clone URL staged under
/// `workspace_dir`.
fn resolve_repo_path(repo: &str, workspace_dir: &PathBuf) -> Result<(PathBuf, String, String)> {
    let as_path = PathBuf::from(repo);
    if as_path.exists() {
        let name = as_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| repo.to_string());
        return Ok((as_path, name, repo.to_string()));
    }

    let name = repo
        .rsplit('/')
        .next()
        .unwrap_or(repo)
        .trim_end_matches(".git")
        .to_string();
    let dest = workspace_dir.join(&name);

    if !dest.exists() {
        info!(url = %repo, dest = %dest.display(), "cloning repository into workspace");
        GitRepository::clone(repo, &dest).with_context(|| format!("failed to clone {repo}"))?;
    }

    Ok((dest, name, repo.to_string()))
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let (repo_path, repository, repository_url) = resolve_repo_path(&args.repo, &args.workspace_dir)?;

    if matches!(args.step, Step::Git) {
        let repo = GitRepository::open(&repo_path).context("git stage: failed to open repository")?;
        let history_path = args.workspace_dir.join("commit_history.json");
        let history = CommitHistory::load(&history_path).context("git stage: failed to load commit history")?;
        let key = kgraph_core::repo_key(&repository_url, &args.branch);
        let last_commit = history.get(&key).map(str::to_string);

        let config = ChangeDetectorConfig {
            repository: repository.clone(),
            url: repository_url.clone(),
            branch: args.branch.clone(),
            mode: args.mode,
            force_reindex: args.force_reindex,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        };
        let change_set: GitOutput =
            detect_changes(&repo, &config, last_commit.as_deref()).context("git stage: change detection failed")?;

        print_git_summary(&change_set);
        if let Some(dir) = &args.output_dir {
            artifacts::write_json(&dir.join("git_output.json"), &change_set).context("git stage: failed to write artifact")?;
        }
        return Ok(());
    }

    if matches!(args.step, Step::Parse) {
        use kgraph_engine::artifacts::{FailedFile, ParsedFile, ParserOutput};
        use kgraph_engine::parser::ParserRegistry;

        let repo = GitRepository::open(&repo_path).context("parse stage: failed to open repository")?;
        let history_path = args.workspace_dir.join("commit_history.json");
        let history = CommitHistory::load(&history_path).context("parse stage: failed to load commit history")?;
        let key = kgraph_core::repo_key(&repository_url, &args.branch);
        let last_commit = history.get(&key).map(str::to_string);

        let config = ChangeDetectorConfig {
            repository: repository.clone(),
            url: repository_url.clone(),
            branch: args.branch.clone(),
            mode: args.mode,
            force_reindex: args.force_reindex,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        };
        let change_set = detect_changes(&repo, &config, last_commit.as_deref()).context("parse stage: change detection failed")?;

        let registry = ParserRegistry::new();
        let mut asts = Vec::new();
        let mut failed_files = Vec::new();
        for record in &change_set.file_data {
            let path = std::path::Path::new(&record.path);
            match registry.parse_file(path, &record.content) {
                Ok((language, ast)) => asts.push(ParsedFile { path: record.path.clone(), language, ast }),
                Err(e) => failed_files.push(FailedFile { path: record.path.clone(), error: e.to_string() }),
            }
        }

        let output = ParserOutput {
            repository: repository.clone(),
            url: repository_url.clone(),
            commit: change_set.commit.clone(),
            branch: args.branch.clone(),
            is_full_indexing: change_set.is_full_indexing,
            files_parsed: asts.len(),
            files_failed: failed_files.len(),
            asts,
            failed_files,
        };

        println!("files parsed: {}", output.files_parsed);
        println!("files failed: {}", output.files_failed);
        if let Some(dir) = &args.output_dir {
            artifacts::write_json(&dir.join("parser_output.json"), &output).context("parse stage: failed to write artifact")?;
        }
        return Ok(());
    }

    // `graph`/`all` need a live connection, since the
    // pipeline writes through to the store as it goes — there is no
    // standalone "parse only" path that skips the graph.
    let store = Arc::new(
        Neo4jStore::connect(
            &args.neo4j_uri,
            &args.neo4j_user,
            &args.neo4j_password,
            args.neo4j_database.as_deref(),
        )
        .await
        .context("failed to connect to Neo4j")?,
    );

    let mut config = PipelineConfig::new(repo_path, repository.clone(), repository_url);
    config.branch = args.branch;
    config.mode = args.mode;
    config.force_reindex = args.force_reindex;
    config.resolution_strategy = args.resolution_strategy;
    config.resolution_mode = if args.immediate_resolution {
        kgraph_engine::graph::ResolutionMode::Immediate
    } else {
        kgraph_engine::graph::ResolutionMode::Bulk
    };
    config.commit_history_path = args.workspace_dir.join("commit_history.json");

    let pipeline = Pipeline::new(store.clone());
    let outcome = pipeline.run(&config).await.context("pipeline run failed")?;

    print_run_summary(&repository, &outcome);

    if matches!(args.step, Step::Graph | Step::All) {
        if let Some(dir) = &args.output_dir {
            use kgraph_engine::artifacts::{GraphOutput, GraphStatsOutput};
            use kgraph_engine::graph::{GraphStore as _, ResolutionSummary};

            let stats = store.stats(&repository).await.context("failed to read graph stats for artifact")?;
            let resolution = ResolutionSummary {
                calls_resolved: outcome.calls_resolved,
                calls_unresolved: outcome.calls_unresolved,
                imports_resolved: outcome.imports_resolved,
                imports_unresolved: outcome.imports_unresolved,
                resolve_failures: 0,
            };
            let output = GraphOutput {
                repository: repository.clone(),
                files_processed: outcome.files_written,
                files_failed: outcome.files_failed.len(),
                graph_stats: GraphStatsOutput::from_stats(stats, &resolution),
                errors: outcome
                    .files_failed
                    .iter()
                    .chain(outcome.deletions_failed.iter())
                    .map(|(_, e)| e.clone())
                    .collect(),
            };
            artifacts::write_json(&dir.join("graph_output.json"), &output).context("failed to write graph_output.json")?;
        }
    }

    if !outcome.last_indexed_commit_updated {
        anyhow::bail!("run completed but not every file was accounted for; last_indexed_commit was not advanced");
    }

    Ok(())
}

fn print_git_summary(change_set: &GitOutput) {
    println!("commit:          {}", change_set.commit);
    println!("full indexing:   {}", change_set.is_full_indexing);
    println!("files detected:  {}", change_set.files_detected);
    println!("files processed: {}", change_set.files_processed);
    println!("files deleted:   {}", change_set.deleted_paths.len());
    println!("files skipped:   {}", change_set.skipped.len());
}

fn print_run_summary(repository: &str, outcome: &kgraph_engine::PipelineOutcome) {
    println!("repository:          {repository}");
    println!("commit:              {}", outcome.commit);
    println!("full indexing:       {}", outcome.is_full_indexing);
    println!("files detected:      {}", outcome.files_detected);
    println!("files processed:     {}", outcome.files_written);
    println!("files failed:        {}", outcome.files_failed.len());
    for (path, err) in outcome.files_failed.iter().take(10) {
        println!("  - {path}: {err}");
    }
    println!("files deleted:       {}", outcome.deleted.len());
    println!("deletions failed:    {}", outcome.deletions_failed.len());
    for (path, err) in outcome.deletions_failed.iter().take(10) {
        println!("  - {path}: {err}");
    }
    println!("calls resolved:      {}", outcome.calls_resolved);
    println!("calls unresolved:    {}", outcome.calls_unresolved);
    println!("imports resolved:    {}", outcome.imports_resolved);
    println!("imports unresolved:  {}", outcome.imports_unresolved);
}
