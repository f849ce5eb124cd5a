use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use kgraph_core::Result;

/// Persistent `repo_key -> last_indexed_commit` mapping, stored as
/// `commit_history.json`. Written atomically (temp file + rename) so a crash
/// mid-write never leaves a truncated or corrupt file behind.
#[derive(Debug, Default)]
pub struct CommitHistory {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl CommitHistory {
    pub fn load(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let raw = fs::read_to_string(path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn get(&self, repo_key: &str) -> Option<&str> {
        self.entries.get(repo_key).map(String::as_str)
    }

    /// Record `repo_key -> commit` and persist immediately. Only ever called
    /// after a run has fully succeeded (every file written or failed, bulk
    /// resolution complete) — a partial run must never reach this.
    pub fn set_and_save(&mut self, repo_key: &str, commit: &str) -> Result<()> {
        self.entries.insert(repo_key.to_string(), commit.to_string());
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = tempfile::NamedTempFile::new_in(
            self.path.parent().unwrap_or_else(|| Path::new(".")),
        )?;
        let body = serde_json::to_vec_pretty(&self.entries)?;
        tmp.write_all(&body)?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| kgraph_core::Error::Io(e.error))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commit_history.json");

        let mut history = CommitHistory::load(&path).unwrap();
        assert_eq!(history.get("repo#main"), None);

        history.set_and_save("repo#main", "abc123").unwrap();

        let reloaded = CommitHistory::load(&path).unwrap();
        assert_eq!(reloaded.get("repo#main"), Some("abc123"));
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist.json");
        let history = CommitHistory::load(&path).unwrap();
        assert_eq!(history.get("anything"), None);
    }
}
