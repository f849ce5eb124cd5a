use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use kgraph_core::Result;

use super::store::{CallSiteRow, ClassRow, FunctionRow, GraphStore, ImportSiteRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionStrategy {
    /// Linear scan of every function against every call site, as a single
    /// store-side join would do. Simplest, O(sites * functions).
    Join,
    /// Build one `name -> [FunctionRow]` index up front, O(sites + functions).
    #[default]
    Hashmap,
    /// Same index as `Hashmap`, partitioned into shards keyed by the first
    /// byte of the function name so lookups can be built and queried
    /// independently per shard.
    Sharded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionMode {
    /// Resolve after every file in the run has been written. Required for
    /// cross-file correctness when a referenced function is defined in a
    /// file later in the batch.
    #[default]
    Bulk,
    /// Resolve a single file's placeholders immediately against whatever is
    /// already in the store. May miss targets defined later in the same run.
    Immediate,
}

const SHARD_COUNT: usize = 8;

fn shard_of(name: &str) -> usize {
    name.bytes().next().map(|b| b as usize % SHARD_COUNT).unwrap_or(0)
}

/// Resolves CallSite/ImportSite placeholders against the entities already
/// written to a [`GraphStore`], following the fixed scoring table and
/// tie-break order. The three [`ResolutionStrategy`] variants build their
/// lookup structures differently but must agree on every score and
/// tie-break decision.
pub struct PlaceholderResolver {
    store: Arc<dyn GraphStore>,
    strategy: ResolutionStrategy,
}

struct FunctionIndex {
    by_name: HashMap<String, Vec<FunctionRow>>,
}

impl FunctionIndex {
    fn build(functions: &[FunctionRow], strategy: ResolutionStrategy) -> Self {
        match strategy {
            ResolutionStrategy::Join => FunctionIndex { by_name: HashMap::new() },
            ResolutionStrategy::Hashmap => {
                let mut by_name: HashMap<String, Vec<FunctionRow>> = HashMap::new();
                for f in functions {
                    by_name.entry(f.name.clone()).or_default().push(f.clone());
                }
                FunctionIndex { by_name }
            }
            ResolutionStrategy::Sharded => {
                let mut shards: Vec<HashMap<String, Vec<FunctionRow>>> =
                    (0..SHARD_COUNT).map(|_| HashMap::new()).collect();
                for f in functions {
                    shards[shard_of(&f.name)].entry(f.name.clone()).or_default().push(f.clone());
                }
                let mut by_name = HashMap::new();
                for shard in shards {
                    by_name.extend(shard);
                }
                FunctionIndex { by_name }
            }
        }
    }

    fn candidates<'a>(&'a self, name: &str, all: &'a [FunctionRow], strategy: ResolutionStrategy) -> Vec<&'a FunctionRow> {
        match strategy {
            ResolutionStrategy::Join => all.iter().filter(|f| f.name == name).collect(),
            ResolutionStrategy::Hashmap | ResolutionStrategy::Sharded => {
                self.by_name.get(name).map(|v| v.iter().collect()).unwrap_or_default()
            }
        }
    }
}

fn call_candidate_score(
    cs: &CallSiteRow,
    f: &FunctionRow,
    classes: &[ClassRow],
    imports_in_file: &[&ImportSiteRow],
) -> Option<f64> {
    if f.name != cs.call_name {
        return None;
    }

    if cs.is_attribute_call {
        let module = cs.call_module.as_deref()?;
        let contained_by_named_class = classes
            .iter()
            .any(|c| c.id == f.class_id && c.name == module);
        if contained_by_named_class {
            return Some(1.00);
        }
        let module_is_import_alias = imports_in_file.iter().any(|i| i.import_name == module);
        if module_is_import_alias {
            return Some(0.80);
        }
        None
    } else if f.file_id == cs.caller_file_id {
        Some(1.00)
    } else {
        Some(0.70)
    }
}

/// `true` if `candidate` should replace `current` as the best match, per the
/// tie-break order: higher score; same-file wins; smaller `start_line`
/// distance wins; lexicographically smallest id wins.
fn call_candidate_is_better(
    candidate: (&FunctionRow, f64),
    current: (&FunctionRow, f64),
    cs: &CallSiteRow,
) -> bool {
    let (cand_fn, cand_score) = candidate;
    let (curr_fn, curr_score) = current;

    if cand_score != curr_score {
        return cand_score > curr_score;
    }

    let cand_same_file = cand_fn.file_id == cs.caller_file_id;
    let curr_same_file = curr_fn.file_id == cs.caller_file_id;
    if cand_same_file != curr_same_file {
        return cand_same_file;
    }

    if cand_same_file {
        let cand_dist = (cand_fn.start_line as i64 - cs.start_line as i64).unsigned_abs();
        let curr_dist = (curr_fn.start_line as i64 - cs.start_line as i64).unsigned_abs();
        if cand_dist != curr_dist {
            return cand_dist < curr_dist;
        }
    }

    cand_fn.id < curr_fn.id
}

fn path_to_module(path: &str) -> String {
    let no_ext = path.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(path);
    let no_ext = no_ext.strip_suffix("/__init__").unwrap_or(no_ext);
    no_ext.replace(['/', '\\'], ".")
}

impl PlaceholderResolver {
    pub fn new(store: Arc<dyn GraphStore>, strategy: ResolutionStrategy) -> Self {
        Self { store, strategy }
    }

    /// Resolve every unresolved placeholder for `repository`. Used for bulk
    /// mode, after all files in the run have been written.
    pub async fn resolve_repository(&self, repository: &str) -> Result<ResolutionSummary> {
        let functions = self.store.all_functions(repository).await?;
        let classes = self.store.all_classes(repository).await?;
        let files = self.store.all_files(repository).await?;
        let call_sites = self.store.unresolved_call_sites(repository).await?;
        let import_sites = self.store.unresolved_import_sites(repository).await?;

        self.resolve_against(&functions, &classes, &files, &call_sites, &import_sites).await
    }

    /// Resolve only the placeholders belonging to `file_id`, against
    /// whatever is currently in the store. Used for immediate mode.
    pub async fn resolve_file(&self, repository: &str, file_id: &str) -> Result<ResolutionSummary> {
        let functions = self.store.all_functions(repository).await?;
        let classes = self.store.all_classes(repository).await?;
        let files = self.store.all_files(repository).await?;
        let call_sites: Vec<CallSiteRow> = self
            .store
            .unresolved_call_sites(repository)
            .await?
            .into_iter()
            .filter(|c| c.caller_file_id == file_id)
            .collect();
        let import_sites: Vec<ImportSiteRow> = self
            .store
            .unresolved_import_sites(repository)
            .await?
            .into_iter()
            .filter(|i| i.file_id == file_id)
            .collect();

        self.resolve_against(&functions, &classes, &files, &call_sites, &import_sites).await
    }

    async fn resolve_against(
        &self,
        functions: &[FunctionRow],
        classes: &[ClassRow],
        files: &[super::store::FileRow],
        call_sites: &[CallSiteRow],
        import_sites: &[ImportSiteRow],
    ) -> Result<ResolutionSummary> {
        let index = FunctionIndex::build(functions, self.strategy);
        let mut summary = ResolutionSummary::default();

        for cs in call_sites {
            let imports_in_file: Vec<&ImportSiteRow> =
                import_sites.iter().filter(|i| i.file_id == cs.caller_file_id).collect();

            let candidates = index.candidates(&cs.call_name, functions, self.strategy);
            let mut best: Option<(&FunctionRow, f64)> = None;
            for f in candidates {
                let Some(score) = call_candidate_score(cs, f, classes, &imports_in_file) else {
                    continue;
                };
                best = match best {
                    None => Some((f, score)),
                    Some(current) if call_candidate_is_better((f, score), current, cs) => Some((f, score)),
                    some => some,
                };
            }

            match best {
                Some((f, score)) => {
                    if let Err(e) = self.store.resolve_call_site(&cs.id, &f.id, score).await {
                        warn!(call_site_id = %cs.id, error = %e, "failed to record call site resolution");
                        summary.resolve_failures += 1;
                    } else {
                        summary.calls_resolved += 1;
                    }
                }
                None => summary.calls_unresolved += 1,
            }
        }

        for is in import_sites {
            if let Some((target_id, score)) = self.resolve_import(is, classes, files) {
                if let Err(e) = self.store.resolve_import_site(&is.id, &target_id, score).await {
                    warn!(import_site_id = %is.id, error = %e, "failed to record import site resolution");
                    summary.resolve_failures += 1;
                } else {
                    summary.imports_resolved += 1;
                }
            } else {
                summary.imports_unresolved += 1;
            }
        }

        Ok(summary)
    }

    fn resolve_import(
        &self,
        is: &ImportSiteRow,
        classes: &[ClassRow],
        files: &[super::store::FileRow],
    ) -> Option<(String, f64)> {
        if !is.is_from_import {
            let target = files.iter().find(|f| path_to_module(&f.path) == is.import_name)?;
            return Some((target.id.clone(), 1.0));
        }

        let module = is.module_name.as_deref().unwrap_or_default();
        let mut best: Option<(&ClassRow, f64)> = None;
        for class in classes.iter().filter(|c| c.name == is.import_name) {
            let file = files.iter().find(|f| f.id == class.file_id);
            let score = match file {
                Some(f) if path_to_module(&f.path) == module => 1.0,
                _ => 0.7,
            };
            best = match best {
                None => Some((class, score)),
                Some((_, curr)) if score > curr => Some((class, score)),
                Some((curr_c, curr)) if score == curr && class.id < curr_c.id => Some((class, score)),
                some => some,
            };
        }
        best.map(|(c, s)| (c.id.clone(), s))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionSummary {
    pub calls_resolved: u64,
    pub calls_unresolved: u64,
    pub imports_resolved: u64,
    pub imports_unresolved: u64,
    pub resolve_failures: u64,
}
