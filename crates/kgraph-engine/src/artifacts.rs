use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use kgraph_core::{Error, Language, Result};

use crate::change::ChangeSet;
use crate::graph::{GraphStats, ResolutionSummary};
use crate::parser::FileAst;

/// `git_output.json` — the ChangeDetector's stage artifact. `ChangeSet`
/// already has exactly this shape, so this is a type alias rather than a
/// parallel struct that could drift from it.
pub type GitOutput = ChangeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFile {
    pub path: String,
    pub language: Language,
    pub ast: FileAst,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedFile {
    pub path: String,
    pub error: String,
}

/// `parser_output.json` — the Parser stage's artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserOutput {
    pub repository: String,
    pub url: String,
    pub commit: String,
    pub branch: String,
    pub is_full_indexing: bool,
    pub files_parsed: usize,
    pub files_failed: usize,
    pub asts: Vec<ParsedFile>,
    pub failed_files: Vec<FailedFile>,
}

/// `graph_output.json` — the GraphWriter/PlaceholderResolver stage's
/// artifact, summarizing the commit rather than restating the full graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphOutput {
    pub repository: String,
    pub files_processed: usize,
    pub files_failed: usize,
    pub graph_stats: GraphStatsOutput,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStatsOutput {
    pub files: u64,
    pub classes: u64,
    pub functions: u64,
    pub call_sites: u64,
    pub import_sites: u64,
    pub resolved_calls: u64,
    pub resolved_imports: u64,
    pub relationships: u64,
}

impl GraphStatsOutput {
    /// For a fresh `graph_output.json`: `resolved_calls`/`resolved_imports`
    /// come from this run's own resolution pass rather than the store's
    /// (possibly stale, if resolution is deferred) counts.
    pub fn from_stats(stats: GraphStats, resolution: &ResolutionSummary) -> Self {
        Self::assemble(
            stats.files,
            stats.classes,
            stats.functions,
            stats.call_sites,
            stats.import_sites,
            resolution.calls_resolved,
            resolution.imports_resolved,
        )
    }

    /// For a standalone `report`: every count, including the resolved ones,
    /// comes straight from the store.
    pub fn from_graph_stats(stats: GraphStats) -> Self {
        Self::assemble(
            stats.files,
            stats.classes,
            stats.functions,
            stats.call_sites,
            stats.import_sites,
            stats.resolved_calls,
            stats.resolved_imports,
        )
    }

    fn assemble(
        files: u64,
        classes: u64,
        functions: u64,
        call_sites: u64,
        import_sites: u64,
        resolved_calls: u64,
        resolved_imports: u64,
    ) -> Self {
        let relationships = classes + functions + call_sites + import_sites + resolved_calls + resolved_imports;
        Self { files, classes, functions, call_sites, import_sites, resolved_calls, resolved_imports, relationships }
    }
}

/// Write `value` to `path` as pretty JSON via a temp file + atomic rename,
/// matching [`crate::commit_history::CommitHistory`]'s persistence pattern.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = tempfile::NamedTempFile::new_in(path.parent().unwrap_or_else(|| Path::new(".")))?;
    let body = serde_json::to_vec_pretty(value)?;
    tmp.write_all(&body)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

pub fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_stats_output_sums_relationships() {
        let stats = GraphStats {
            files: 1,
            classes: 1,
            functions: 2,
            call_sites: 3,
            import_sites: 1,
            resolved_calls: 0,
            resolved_imports: 0,
        };
        let resolution = ResolutionSummary {
            calls_resolved: 2,
            calls_unresolved: 1,
            imports_resolved: 1,
            imports_unresolved: 0,
            resolve_failures: 0,
        };
        let out = GraphStatsOutput::from_stats(stats, &resolution);
        assert_eq!(out.relationships, 1 + 2 + 3 + 1 + 2 + 1);
    }

    #[test]
    fn graph_stats_output_from_graph_stats_uses_the_store_s_own_resolved_counts() {
        let stats = GraphStats {
            files: 1,
            classes: 1,
            functions: 2,
            call_sites: 3,
            import_sites: 1,
            resolved_calls: 2,
            resolved_imports: 1,
        };
        let out = GraphStatsOutput::from_graph_stats(stats);
        assert_eq!(out.resolved_calls, 2);
        assert_eq!(out.resolved_imports, 1);
        assert_eq!(out.relationships, 1 + 2 + 3 + 1 + 2 + 1);
    }

    #[test]
    fn json_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph_output.json");
        let output = GraphOutput {
            repository: "repo".into(),
            files_processed: 3,
            files_failed: 0,
            graph_stats: GraphStatsOutput::default(),
            errors: vec![],
        };
        write_json(&path, &output).unwrap();
        let reloaded: GraphOutput = read_json(&path).unwrap();
        assert_eq!(reloaded.repository, "repo");
        assert_eq!(reloaded.files_processed, 3);
    }
}
