use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use kgraph_core::{CallSite, ClassEntity, FileEntity, FunctionEntity, ImportSite, Result as CoreResult};
use kgraph_engine::change::Mode;
use kgraph_engine::graph::fake_store::FakeGraphStore;
use kgraph_engine::graph::{
    CallSiteRow, ClassRow, FileRow, FunctionRow, GraphStats, GraphStore, ImportSiteRow,
};
use kgraph_engine::{Pipeline, PipelineConfig};

/// Wraps a `FakeGraphStore`, failing every `delete_file_cascade` call, to
/// exercise the pipeline's deleted-path failure accounting.
struct DeleteFailingStore {
    inner: FakeGraphStore,
}

#[async_trait]
impl GraphStore for DeleteFailingStore {
    async fn setup_schema(&self) -> CoreResult<()> {
        self.inner.setup_schema().await
    }
    async fn clear_repository(&self, repository: &str, preserve_schema: bool) -> CoreResult<()> {
        self.inner.clear_repository(repository, preserve_schema).await
    }
    async fn clear_all(&self, preserve_schema: bool) -> CoreResult<()> {
        self.inner.clear_all(preserve_schema).await
    }
    async fn delete_file_cascade(&self, _file_id: &str) -> CoreResult<()> {
        Err(kgraph_core::Error::Bug("simulated delete failure".into()))
    }
    async fn upsert_file(&self, file: &FileEntity) -> CoreResult<()> {
        self.inner.upsert_file(file).await
    }
    async fn upsert_class(&self, class: &ClassEntity) -> CoreResult<()> {
        self.inner.upsert_class(class).await
    }
    async fn upsert_function(&self, function: &FunctionEntity) -> CoreResult<()> {
        self.inner.upsert_function(function).await
    }
    async fn upsert_call_site(&self, call_site: &CallSite) -> CoreResult<()> {
        self.inner.upsert_call_site(call_site).await
    }
    async fn upsert_import_site(&self, import_site: &ImportSite) -> CoreResult<()> {
        self.inner.upsert_import_site(import_site).await
    }
    async fn link_contains(&self, parent_id: &str, child_id: &str) -> CoreResult<()> {
        self.inner.link_contains(parent_id, child_id).await
    }
    async fn link_inherits(&self, class_id: &str, base_name: &str, file_id: &str) -> CoreResult<()> {
        self.inner.link_inherits(class_id, base_name, file_id).await
    }
    async fn resolve_call_site(&self, call_site_id: &str, function_id: &str, score: f64) -> CoreResult<()> {
        self.inner.resolve_call_site(call_site_id, function_id, score).await
    }
    async fn resolve_import_site(&self, import_site_id: &str, target_id: &str, score: f64) -> CoreResult<()> {
        self.inner.resolve_import_site(import_site_id, target_id, score).await
    }
    async fn all_files(&self, repository: &str) -> CoreResult<Vec<FileRow>> {
        self.inner.all_files(repository).await
    }
    async fn all_classes(&self, repository: &str) -> CoreResult<Vec<ClassRow>> {
        self.inner.all_classes(repository).await
    }
    async fn all_functions(&self, repository: &str) -> CoreResult<Vec<FunctionRow>> {
        self.inner.all_functions(repository).await
    }
    async fn unresolved_call_sites(&self, repository: &str) -> CoreResult<Vec<CallSiteRow>> {
        self.inner.unresolved_call_sites(repository).await
    }
    async fn unresolved_import_sites(&self, repository: &str) -> CoreResult<Vec<ImportSiteRow>> {
        self.inner.unresolved_import_sites(repository).await
    }
    async fn stats(&self, repository: &str) -> CoreResult<GraphStats> {
        self.inner.stats(repository).await
    }
    async fn stats_all(&self) -> CoreResult<GraphStats> {
        self.inner.stats_all().await
    }
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git").args(args).current_dir(dir).status().expect("git must be on PATH for tests");
    assert!(status.success(), "git {args:?} failed in {}", dir.display());
}

fn init_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    git(dir.path(), &["init", "-q"]);
    git(dir.path(), &["config", "user.email", "test@test.com"]);
    git(dir.path(), &["config", "user.name", "Test User"]);
    dir
}

fn commit_all(dir: &Path, message: &str) {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", message]);
}

fn pipeline_config(repo_dir: &Path, history_path: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::new(repo_dir, "demo", "https://example.com/demo.git");
    config.commit_history_path = history_path.to_path_buf();
    config
}

#[tokio::test]
async fn full_run_materializes_classes_functions_and_call_sites() {
    let repo = init_repo();
    fs::write(
        repo.path().join("animals.py"),
        br#"
class Animal:
    def speak(self):
        pass

class Dog(Animal):
    def speak(self):
        return greet(self)

def greet(who):
    return "hi"
"#,
    )
    .unwrap();
    commit_all(repo.path(), "initial");

    let store = Arc::new(FakeGraphStore::new());
    let history_path = repo.path().join(".kgraph").join("commit_history.json");
    let config = pipeline_config(repo.path(), &history_path);

    let pipeline = Pipeline::new(store.clone());
    let outcome = pipeline.run(&config).await.unwrap();

    assert_eq!(outcome.files_written, 1);
    assert!(outcome.files_failed.is_empty());
    assert!(outcome.last_indexed_commit_updated);
    assert_eq!(store.file_count(), 1);
    assert_eq!(store.class_count(), 2);
    assert_eq!(store.function_count(), 3);
    assert!(outcome.calls_resolved >= 1);
}

#[tokio::test]
async fn incremental_run_only_processes_changed_files() {
    let repo = init_repo();
    fs::write(repo.path().join("a.py"), b"def a():\n    pass\n").unwrap();
    fs::write(repo.path().join("b.py"), b"def b():\n    pass\n").unwrap();
    commit_all(repo.path(), "first");

    let store = Arc::new(FakeGraphStore::new());
    let history_path = repo.path().join(".kgraph").join("commit_history.json");
    let config = pipeline_config(repo.path(), &history_path);
    let pipeline = Pipeline::new(store.clone());
    pipeline.run(&config).await.unwrap();
    assert_eq!(store.file_count(), 2);

    fs::write(repo.path().join("a.py"), b"def a():\n    return 1\n").unwrap();
    commit_all(repo.path(), "second");

    let outcome = pipeline.run(&config).await.unwrap();
    assert!(!outcome.is_full_indexing);
    assert_eq!(outcome.files_written, 1);
    assert_eq!(store.file_count(), 2);
}

#[tokio::test]
async fn force_reindex_performs_a_full_scan_even_with_history() {
    let repo = init_repo();
    fs::write(repo.path().join("a.py"), b"def a():\n    pass\n").unwrap();
    commit_all(repo.path(), "first");

    let store = Arc::new(FakeGraphStore::new());
    let history_path = repo.path().join(".kgraph").join("commit_history.json");
    let config = pipeline_config(repo.path(), &history_path);
    let pipeline = Pipeline::new(store.clone());
    pipeline.run(&config).await.unwrap();

    fs::write(repo.path().join("b.py"), b"def b():\n    pass\n").unwrap();
    commit_all(repo.path(), "second");

    let mut forced = pipeline_config(repo.path(), &history_path);
    forced.force_reindex = true;
    forced.mode = Mode::Incremental;
    let outcome = pipeline.run(&forced).await.unwrap();

    assert!(outcome.is_full_indexing);
    assert_eq!(outcome.files_written, 2);
}

#[tokio::test]
async fn method_call_on_fresh_instance_resolves_to_containing_class() {
    let repo = init_repo();
    fs::write(
        repo.path().join("widget.py"),
        br#"
class C:
    def m(self):
        pass

def g():
    C().m()
"#,
    )
    .unwrap();
    commit_all(repo.path(), "initial");

    let store = Arc::new(FakeGraphStore::new());
    let history_path = repo.path().join(".kgraph").join("commit_history.json");
    let config = pipeline_config(repo.path(), &history_path);

    let pipeline = Pipeline::new(store.clone());
    let outcome = pipeline.run(&config).await.unwrap();

    assert!(outcome.files_failed.is_empty());
    // `C().m()` must resolve to `C::m`, not be left dangling because the
    // parser captured the object's text ("C()") instead of the class name.
    assert_eq!(outcome.calls_resolved, 1);
    assert_eq!(outcome.calls_unresolved, 0);
}

#[tokio::test]
async fn inheritance_resolves_across_files_in_the_same_repository() {
    let repo = init_repo();
    fs::write(repo.path().join("animal.py"), b"class Animal:\n    pass\n").unwrap();
    fs::write(
        repo.path().join("dog.py"),
        br#"
from animal import Animal

class Dog(Animal):
    pass
"#,
    )
    .unwrap();
    commit_all(repo.path(), "initial");

    let store = Arc::new(FakeGraphStore::new());
    let history_path = repo.path().join(".kgraph").join("commit_history.json");
    let config = pipeline_config(repo.path(), &history_path);

    let pipeline = Pipeline::new(store.clone());
    let outcome = pipeline.run(&config).await.unwrap();

    assert!(outcome.files_failed.is_empty());
    let classes = store.all_classes("demo").await.unwrap();
    let animal_id = classes.iter().find(|c| c.name == "Animal").unwrap().id.clone();
    let dog_id = classes.iter().find(|c| c.name == "Dog").unwrap().id.clone();
    assert!(store.inherits_edges().contains(&(dog_id, animal_id)));
}

#[tokio::test]
async fn failed_file_deletion_leaves_last_indexed_commit_untouched() {
    let repo = init_repo();
    fs::write(repo.path().join("a.py"), b"def a():\n    pass\n").unwrap();
    commit_all(repo.path(), "first");

    let store = Arc::new(DeleteFailingStore { inner: FakeGraphStore::new() });
    let history_path = repo.path().join(".kgraph").join("commit_history.json");
    let config = pipeline_config(repo.path(), &history_path);
    let pipeline = Pipeline::new(store.clone());
    pipeline.run(&config).await.unwrap();

    fs::remove_file(repo.path().join("a.py")).unwrap();
    commit_all(repo.path(), "second");

    let outcome = pipeline.run(&config).await.unwrap();

    assert_eq!(outcome.deletions_failed.len(), 1);
    // A failed deletion must block the commit watermark, or a later run
    // would never retry deleting this file's orphaned graph nodes.
    assert!(!outcome.last_indexed_commit_updated);
}

#[tokio::test]
async fn empty_repository_completes_successfully() {
    let repo = init_repo();
    git(repo.path(), &["commit", "-q", "--allow-empty", "-m", "empty"]);

    let store = Arc::new(FakeGraphStore::new());
    let history_path = repo.path().join(".kgraph").join("commit_history.json");
    let config = pipeline_config(repo.path(), &history_path);
    let pipeline = Pipeline::new(store.clone());
    let outcome = pipeline.run(&config).await.unwrap();

    assert_eq!(outcome.files_written, 0);
    assert!(outcome.files_failed.is_empty());
    assert!(outcome.last_indexed_commit_updated);
    assert_eq!(store.file_count(), 0);
}
