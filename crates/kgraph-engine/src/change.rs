use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use kgraph_core::Result;

use crate::git::repository::GitRepository;

pub const DEFAULT_MAX_FILE_SIZE: usize = 1_048_576; // 1 MiB

const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    ".venv",
    "venv",
    "__pycache__",
    ".idea",
    ".vscode",
    ".mypy_cache",
    ".pytest_cache",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Incremental,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub content: Vec<u8>,
    pub repository: String,
    pub url: String,
    pub commit: String,
    pub branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
    pub repository: String,
    pub url: String,
    pub branch: String,
    pub commit: String,
    pub is_full_indexing: bool,
    pub files_detected: usize,
    pub files_processed: usize,
    pub file_data: Vec<FileRecord>,
    pub deleted_paths: Vec<String>,
    pub skipped: Vec<SkippedFile>,
}

pub struct ChangeDetectorConfig {
    pub repository: String,
    pub url: String,
    pub branch: String,
    pub mode: Mode,
    pub force_reindex: bool,
    pub max_file_size: usize,
}

impl ChangeDetectorConfig {
    pub fn new(repository: impl Into<String>, url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            url: url.into(),
            branch: branch.into(),
            mode: Mode::Incremental,
            force_reindex: false,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Returns true if the byte slice contains any byte outside the textual set
/// `{0x07-0x0D, 0x1B} ∪ [0x20,0x100)\{0x7F}` — i.e. it looks binary.
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().any(|&b| {
        let textual = matches!(b, 0x07..=0x0D | 0x1B) || (b >= 0x20 && b != 0x7F);
        !textual
    })
}

fn is_ignored_path(path: &str) -> bool {
    path.split('/').any(|segment| IGNORED_DIRS.contains(&segment))
}

/// Determine the set of files to (re)process for a repository at its current
/// HEAD, relative to `last_commit` (if any), applying the ignore policy,
/// binary sniff, and size cap.
///
/// `c_old` is the previously indexed commit for this `repo_key`, read from
/// `commit_history.json` by the caller. When `None`, or `config.mode ==
/// Mode::Full`, or `config.force_reindex`, this performs a full scan.
pub fn detect_changes(
    repo: &GitRepository,
    config: &ChangeDetectorConfig,
    last_commit: Option<&str>,
) -> Result<ChangeSet> {
    let commit = repo
        .head_hash()?
        .ok_or_else(|| kgraph_core::Error::Connection("repository has no commits".into()))?;

    let is_full = config.mode == Mode::Full || config.force_reindex || last_commit.is_none();

    let (candidate_paths, deleted_paths): (Vec<String>, Vec<String>) = if is_full {
        (repo.list_tree_files(&commit)?, Vec::new())
    } else {
        let old = last_commit.expect("checked above");
        if old == commit {
            (Vec::new(), Vec::new())
        } else {
            repo.diff_tree_files(old, &commit)?
        }
    };

    let files_detected = candidate_paths.len();
    let mut file_data = Vec::with_capacity(candidate_paths.len());
    let mut skipped = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for path in candidate_paths {
        if !seen.insert(path.clone()) {
            continue;
        }
        if is_ignored_path(&path) {
            continue;
        }

        let content = match repo.read_tree_entry(&commit, &path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path, error = %e, "skipping unreadable file");
                skipped.push(SkippedFile {
                    path,
                    reason: format!("unreadable: {e}"),
                });
                continue;
            }
        };

        if content.len() > config.max_file_size {
            skipped.push(SkippedFile {
                path,
                reason: "file_too_large".to_string(),
            });
            continue;
        }

        if is_binary(&content) {
            skipped.push(SkippedFile {
                path,
                reason: "binary".to_string(),
            });
            continue;
        }

        file_data.push(FileRecord {
            path,
            content,
            repository: config.repository.clone(),
            url: config.url.clone(),
            commit: commit.clone(),
            branch: config.branch.clone(),
        });
    }

    info!(
        repository = %config.repository,
        commit = %commit,
        full = is_full,
        detected = files_detected,
        processed = file_data.len(),
        skipped = skipped.len(),
        deleted = deleted_paths.len(),
        "change detection complete"
    );

    let files_processed = file_data.len();
    Ok(ChangeSet {
        repository: config.repository.clone(),
        url: config.url.clone(),
        branch: config.branch.clone(),
        commit,
        is_full_indexing: is_full,
        files_detected,
        files_processed,
        file_data,
        deleted_paths,
        skipped,
    })
}

/// Timestamp helper used when materializing File nodes; kept here so the
/// GraphWriter does not need its own clock dependency.
pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textual_ascii_is_not_binary() {
        assert!(!is_binary(b"def f():\n    pass\n\t# comment\r\n"));
    }

    #[test]
    fn null_byte_is_binary() {
        assert!(is_binary(b"hello\x00world"));
    }

    #[test]
    fn del_byte_is_binary() {
        assert!(is_binary(&[0x7F]));
    }

    #[test]
    fn high_bytes_are_not_binary() {
        // 0x20..0xFF excluding 0x7F is textual per the spec's byte-set rule,
        // even though it isn't valid UTF-8 on its own.
        assert!(!is_binary(&[0xC3, 0xA9]));
    }

    #[test]
    fn ignores_vcs_and_build_dirs() {
        assert!(is_ignored_path(".git/HEAD"));
        assert!(is_ignored_path("a/node_modules/b.js"));
        assert!(is_ignored_path("target/debug/x"));
        assert!(!is_ignored_path("src/main.rs"));
    }
}
