use std::path::Path;

use kgraph_core::{Error, Result};

/// A wrapper around `gix::Repository` providing the primitives the
/// ChangeDetector needs: reading blobs and listing/diffing trees at specific
/// commits, without touching the working directory.
pub struct GitRepository {
    inner: gix::Repository,
}

impl GitRepository {
    /// Initialize a new Git repository at the given path.
    pub fn init(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::Connection(format!("failed to create directory {}: {e}", path.display())))?;

        let repo = gix::init(path)
            .map_err(|e| Error::Connection(format!("failed to init repository at {}: {e}", path.display())))?;

        Ok(Self { inner: repo })
    }

    /// Open an existing Git repository at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = gix::open(path)
            .map_err(|e| Error::Connection(format!("failed to open repository at {}: {e}", path.display())))?;

        Ok(Self { inner: repo })
    }

    /// Clone `url` into `dest` with a full working tree checkout.
    pub fn clone(url: &str, dest: &Path) -> Result<Self> {
        let mut prepare_fetch = gix::clone::PrepareFetch::new(
            url,
            dest,
            gix::create::Kind::WithWorktree,
            gix::create::Options::default(),
            gix::open::Options::default(),
        )
        .map_err(|e| Error::Connection(format!("failed to prepare clone of {url}: {e}")))?;

        let (mut prepare_checkout, _outcome) = prepare_fetch
            .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| Error::Connection(format!("failed to fetch {url}: {e}")))?;

        let (repo, _outcome) = prepare_checkout
            .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| Error::Connection(format!("failed to check out {url}: {e}")))?;

        Ok(Self { inner: repo })
    }

    /// Working directory path, falling back to the `.git` directory for
    /// bare repositories.
    pub fn path(&self) -> &Path {
        self.inner.workdir().unwrap_or_else(|| self.inner.git_dir())
    }

    pub fn inner(&self) -> &gix::Repository {
        &self.inner
    }

    /// HEAD commit hash, or `None` if the repository has no commits yet —
    /// the "no prior commit exists" condition that forces a full scan.
    pub fn head_hash(&self) -> Result<Option<String>> {
        let head = self
            .inner
            .head()
            .map_err(|e| Error::Connection(format!("failed to get HEAD: {e}")))?;

        if head.is_unborn() {
            return Ok(None);
        }

        match head.into_peeled_id() {
            Ok(id) => Ok(Some(id.to_hex().to_string())),
            Err(e) => Err(Error::Connection(format!("failed to peel HEAD: {e}"))),
        }
    }

    fn find_tree(&self, commit_hex: &str) -> Result<gix::Tree<'_>> {
        let oid = gix::ObjectId::from_hex(commit_hex.as_bytes())
            .map_err(|e| Error::Connection(format!("invalid commit hex '{commit_hex}': {e}")))?;

        let commit = self
            .inner
            .find_commit(oid)
            .map_err(|e| Error::Connection(format!("failed to find commit {commit_hex}: {e}")))?;

        self.inner
            .find_tree(commit.tree_id().expect("commit always has a tree"))
            .map_err(|e| Error::Connection(format!("failed to find tree for commit {commit_hex}: {e}")))
    }

    /// Read a file's content from a specific commit's tree — not the working
    /// directory. This is how the ChangeDetector reads files "at `c_new`".
    pub fn read_tree_entry(&self, commit_hex: &str, path: &str) -> Result<Vec<u8>> {
        let tree = self.find_tree(commit_hex)?;

        let entry = tree
            .lookup_entry_by_path(path)
            .map_err(|e| Error::Connection(format!("failed to lookup '{path}' in {commit_hex}: {e}")))?
            .ok_or_else(|| Error::IngestFile {
                path: path.to_string(),
                reason: format!("not found in commit {commit_hex}"),
            })?;

        let object = entry
            .object()
            .map_err(|e| Error::Connection(format!("failed to read object for '{path}': {e}")))?;

        if object.kind != gix::object::Kind::Blob {
            return Err(Error::IngestFile {
                path: path.to_string(),
                reason: format!("not a blob (is {:?})", object.kind),
            });
        }

        Ok(object.data.clone())
    }

    /// List every non-tree entry (blobs, symlinks, submodules) in a commit's
    /// tree, recursively, as forward-slash relative paths. Used for full scans.
    pub fn list_tree_files(&self, commit_hex: &str) -> Result<Vec<String>> {
        let tree = self.find_tree(commit_hex)?;

        let entries = tree
            .traverse()
            .breadthfirst
            .files()
            .map_err(|e| Error::Connection(format!("tree traversal failed for {commit_hex}: {e}")))?;

        Ok(entries
            .into_iter()
            .filter(|e| !e.mode.is_tree())
            .map(|e| e.filepath.to_string())
            .collect())
    }

    /// Diff two commits' trees. Returns `(added_or_modified, deleted)` as
    /// forward-slash relative paths. Used for incremental scans.
    pub fn diff_tree_files(&self, old_commit_hex: &str, new_commit_hex: &str) -> Result<(Vec<String>, Vec<String>)> {
        let old_tree = self.find_tree(old_commit_hex)?;
        let new_tree = self.find_tree(new_commit_hex)?;

        let mut added_or_modified = Vec::new();
        let mut deleted = Vec::new();

        let mut platform = old_tree
            .changes()
            .map_err(|e| Error::Connection(format!("failed to start tree diff: {e}")))?;

        platform
            .for_each_to_obtain_tree(&new_tree, |change| {
                use gix::object::tree::diff::Change;
                match &change {
                    Change::Addition { entry_mode, .. } if !entry_mode.is_tree() => {
                        added_or_modified.push(change.location().to_string());
                    }
                    Change::Modification { entry_mode, .. } if !entry_mode.is_tree() => {
                        added_or_modified.push(change.location().to_string());
                    }
                    Change::Deletion { entry_mode, .. } if !entry_mode.is_tree() => {
                        deleted.push(change.location().to_string());
                    }
                    _ => {}
                }
                Ok::<_, std::convert::Infallible>(gix::object::tree::diff::Action::Continue(()))
            })
            .map_err(|e| Error::Connection(format!("tree diff failed: {e}")))?;

        Ok((added_or_modified, deleted))
    }
}
