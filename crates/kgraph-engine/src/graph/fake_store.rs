use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use kgraph_core::{CallSite, ClassEntity, Error, FileEntity, FunctionEntity, ImportSite, Result};

use super::store::{CallSiteRow, ClassRow, FileRow, FunctionRow, GraphStats, GraphStore, ImportSiteRow};

#[derive(Default)]
struct Inner {
    files: HashMap<String, FileEntity>,
    classes: HashMap<String, ClassEntity>,
    functions: HashMap<String, FunctionEntity>,
    call_sites: HashMap<String, CallSite>,
    import_sites: HashMap<String, ImportSite>,
    contains: Vec<(String, String)>,
    inherits: Vec<(String, String)>,
    call_resolutions: HashMap<String, (String, f64)>,
    import_resolutions: HashMap<String, (String, f64)>,
    schema_initialized: bool,
}

/// In-memory [`GraphStore`] used by writer/resolver tests. Records every
/// mutation so tests can assert on upsert/delete ordering without a running
/// Neo4j instance.
#[derive(Default)]
pub struct FakeGraphStore {
    inner: Mutex<Inner>,
}

impl FakeGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_count(&self) -> usize {
        self.inner.lock().unwrap().files.len()
    }

    pub fn class_count(&self) -> usize {
        self.inner.lock().unwrap().classes.len()
    }

    pub fn function_count(&self) -> usize {
        self.inner.lock().unwrap().functions.len()
    }

    pub fn contains_edges(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().contains.clone()
    }

    pub fn inherits_edges(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().inherits.clone()
    }

    pub fn call_resolution(&self, call_site_id: &str) -> Option<(String, f64)> {
        self.inner.lock().unwrap().call_resolutions.get(call_site_id).cloned()
    }

    pub fn import_resolution(&self, import_site_id: &str) -> Option<(String, f64)> {
        self.inner.lock().unwrap().import_resolutions.get(import_site_id).cloned()
    }

    pub fn schema_initialized(&self) -> bool {
        self.inner.lock().unwrap().schema_initialized
    }
}

#[async_trait]
impl GraphStore for FakeGraphStore {
    async fn setup_schema(&self) -> Result<()> {
        self.inner.lock().unwrap().schema_initialized = true;
        Ok(())
    }

    async fn clear_repository(&self, repository: &str, preserve_schema: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let file_ids: Vec<String> = inner
            .files
            .values()
            .filter(|f| f.repository == repository)
            .map(|f| f.id.clone())
            .collect();
        inner.files.retain(|_, f| f.repository != repository);
        inner.classes.retain(|_, c| !file_ids.contains(&c.file_id));
        inner.functions.retain(|_, f| !file_ids.contains(&f.file_id));
        inner.call_sites.retain(|_, c| !file_ids.contains(&c.caller_file_id));
        inner.import_sites.retain(|_, i| !file_ids.contains(&i.file_id));
        if !preserve_schema {
            inner.schema_initialized = false;
        }
        Ok(())
    }

    async fn clear_all(&self, preserve_schema: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        *inner = Inner { schema_initialized: preserve_schema, ..Inner::default() };
        Ok(())
    }

    async fn delete_file_cascade(&self, file_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.files.remove(file_id);
        inner.classes.retain(|_, c| c.file_id != file_id);
        inner.functions.retain(|_, f| f.file_id != file_id);
        inner.call_sites.retain(|_, c| c.caller_file_id != file_id);
        inner.import_sites.retain(|_, i| i.file_id != file_id);
        inner.contains.retain(|(p, c)| p != file_id && c != file_id);
        Ok(())
    }

    async fn upsert_file(&self, file: &FileEntity) -> Result<()> {
        self.inner.lock().unwrap().files.insert(file.id.clone(), file.clone());
        Ok(())
    }

    async fn upsert_class(&self, class: &ClassEntity) -> Result<()> {
        self.inner.lock().unwrap().classes.insert(class.id.clone(), class.clone());
        Ok(())
    }

    async fn upsert_function(&self, function: &FunctionEntity) -> Result<()> {
        self.inner.lock().unwrap().functions.insert(function.id.clone(), function.clone());
        Ok(())
    }

    async fn upsert_call_site(&self, call_site: &CallSite) -> Result<()> {
        self.inner.lock().unwrap().call_sites.insert(call_site.id.clone(), call_site.clone());
        Ok(())
    }

    async fn upsert_import_site(&self, import_site: &ImportSite) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .import_sites
            .insert(import_site.id.clone(), import_site.clone());
        Ok(())
    }

    async fn link_contains(&self, parent_id: &str, child_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let edge = (parent_id.to_string(), child_id.to_string());
        if !inner.contains.contains(&edge) {
            inner.contains.push(edge);
        }
        Ok(())
    }

    async fn link_inherits(&self, class_id: &str, base_name: &str, file_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let Some(repository) = inner.files.get(file_id).map(|f| f.repository.clone()) else {
            return Ok(());
        };
        // A base class can live in any file of the same repository, not
        // just the subclass's own file — mirrors Neo4jStore::link_inherits.
        let mut candidates: Vec<&String> = inner
            .classes
            .values()
            .filter(|c| {
                c.name == base_name
                    && inner.files.get(&c.file_id).map(|f| f.repository == repository).unwrap_or(false)
            })
            .map(|c| &c.id)
            .collect();
        candidates.sort();
        if let Some(base_id) = candidates.first().map(|id| id.to_string()) {
            let edge = (class_id.to_string(), base_id);
            if !inner.inherits.contains(&edge) {
                inner.inherits.push(edge);
            }
        }
        Ok(())
    }

    async fn resolve_call_site(&self, call_site_id: &str, function_id: &str, score: f64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.call_sites.contains_key(call_site_id) {
            return Err(Error::Resolve {
                id: call_site_id.to_string(),
                message: "unknown call site".into(),
            });
        }
        inner
            .call_resolutions
            .insert(call_site_id.to_string(), (function_id.to_string(), score));
        Ok(())
    }

    async fn resolve_import_site(&self, import_site_id: &str, target_id: &str, score: f64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.import_sites.contains_key(import_site_id) {
            return Err(Error::Resolve {
                id: import_site_id.to_string(),
                message: "unknown import site".into(),
            });
        }
        inner
            .import_resolutions
            .insert(import_site_id.to_string(), (target_id.to_string(), score));
        Ok(())
    }

    async fn all_files(&self, repository: &str) -> Result<Vec<FileRow>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .files
            .values()
            .filter(|f| f.repository == repository)
            .map(|f| FileRow {
                id: f.id.clone(),
                path: f.path.clone(),
                repository: f.repository.clone(),
            })
            .collect())
    }

    async fn all_classes(&self, repository: &str) -> Result<Vec<ClassRow>> {
        let inner = self.inner.lock().unwrap();
        let file_ids: Vec<&String> = inner
            .files
            .values()
            .filter(|f| f.repository == repository)
            .map(|f| &f.id)
            .collect();
        Ok(inner
            .classes
            .values()
            .filter(|c| file_ids.iter().any(|id| **id == c.file_id))
            .map(|c| ClassRow {
                id: c.id.clone(),
                file_id: c.file_id.clone(),
                name: c.name.clone(),
            })
            .collect())
    }

    async fn all_functions(&self, repository: &str) -> Result<Vec<FunctionRow>> {
        let inner = self.inner.lock().unwrap();
        let file_ids: Vec<&String> = inner
            .files
            .values()
            .filter(|f| f.repository == repository)
            .map(|f| &f.id)
            .collect();
        Ok(inner
            .functions
            .values()
            .filter(|f| file_ids.iter().any(|id| **id == f.file_id))
            .map(|f| FunctionRow {
                id: f.id.clone(),
                file_id: f.file_id.clone(),
                class_id: f.class_id.clone(),
                name: f.name.clone(),
                start_line: f.start_line,
            })
            .collect())
    }

    async fn unresolved_call_sites(&self, repository: &str) -> Result<Vec<CallSiteRow>> {
        let inner = self.inner.lock().unwrap();
        let file_ids: Vec<&String> = inner
            .files
            .values()
            .filter(|f| f.repository == repository)
            .map(|f| &f.id)
            .collect();
        Ok(inner
            .call_sites
            .values()
            .filter(|c| file_ids.iter().any(|id| **id == c.caller_file_id))
            .filter(|c| !inner.call_resolutions.contains_key(&c.id))
            .map(|c| CallSiteRow {
                id: c.id.clone(),
                caller_file_id: c.caller_file_id.clone(),
                call_name: c.call_name.clone(),
                call_module: c.call_module.clone(),
                is_attribute_call: c.is_attribute_call,
                start_line: c.position.start_line,
            })
            .collect())
    }

    async fn unresolved_import_sites(&self, repository: &str) -> Result<Vec<ImportSiteRow>> {
        let inner = self.inner.lock().unwrap();
        let file_ids: Vec<&String> = inner
            .files
            .values()
            .filter(|f| f.repository == repository)
            .map(|f| &f.id)
            .collect();
        Ok(inner
            .import_sites
            .values()
            .filter(|i| file_ids.iter().any(|id| **id == i.file_id))
            .filter(|i| !inner.import_resolutions.contains_key(&i.id))
            .map(|i| ImportSiteRow {
                id: i.id.clone(),
                file_id: i.file_id.clone(),
                import_name: i.import_name.clone(),
                module_name: i.module_name.clone(),
                is_from_import: i.is_from_import,
            })
            .collect())
    }

    async fn stats(&self, repository: &str) -> Result<GraphStats> {
        let inner = self.inner.lock().unwrap();
        let file_ids: Vec<&String> = inner
            .files
            .values()
            .filter(|f| f.repository == repository)
            .map(|f| &f.id)
            .collect();
        let in_repo = |id: &str| file_ids.iter().any(|f| f.as_str() == id);
        Ok(GraphStats {
            files: file_ids.len() as u64,
            classes: inner.classes.values().filter(|c| in_repo(&c.file_id)).count() as u64,
            functions: inner.functions.values().filter(|f| in_repo(&f.file_id)).count() as u64,
            call_sites: inner.call_sites.values().filter(|c| in_repo(&c.caller_file_id)).count() as u64,
            import_sites: inner.import_sites.values().filter(|i| in_repo(&i.file_id)).count() as u64,
            resolved_calls: inner
                .call_resolutions
                .keys()
                .filter(|id| inner.call_sites.get(*id).map(|c| in_repo(&c.caller_file_id)).unwrap_or(false))
                .count() as u64,
            resolved_imports: inner
                .import_resolutions
                .keys()
                .filter(|id| inner.import_sites.get(*id).map(|i| in_repo(&i.file_id)).unwrap_or(false))
                .count() as u64,
        })
    }

    async fn stats_all(&self) -> Result<GraphStats> {
        let inner = self.inner.lock().unwrap();
        Ok(GraphStats {
            files: inner.files.len() as u64,
            classes: inner.classes.len() as u64,
            functions: inner.functions.len() as u64,
            call_sites: inner.call_sites.len() as u64,
            import_sites: inner.import_sites.len() as u64,
            resolved_calls: inner.call_resolutions.len() as u64,
            resolved_imports: inner.import_resolutions.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgraph_core::Language;

    fn file(id: &str, repository: &str) -> FileEntity {
        FileEntity {
            id: id.to_string(),
            path: format!("{id}.py"),
            name: id.to_string(),
            language: Language::Python,
            repository: repository.to_string(),
            repository_url: "https://example.com/r.git".to_string(),
            commit: "abc".to_string(),
            branch: "main".to_string(),
            last_updated: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = FakeGraphStore::new();
        let f = file("f1", "repo");
        store.upsert_file(&f).await.unwrap();
        store.upsert_file(&f).await.unwrap();
        assert_eq!(store.file_count(), 1);
    }

    #[tokio::test]
    async fn delete_file_cascade_removes_children() {
        let store = FakeGraphStore::new();
        let f = file("f1", "repo");
        store.upsert_file(&f).await.unwrap();
        store
            .upsert_class(&ClassEntity {
                id: "c1".into(),
                name: "C".into(),
                file_id: "f1".into(),
                start_line: 1,
                end_line: 2,
                docstring: None,
                bases: vec![],
            })
            .await
            .unwrap();
        store.link_contains("f1", "c1").await.unwrap();

        store.delete_file_cascade("f1").await.unwrap();
        assert_eq!(store.file_count(), 0);
        assert_eq!(store.class_count(), 0);
        assert!(store.contains_edges().is_empty());
    }

    #[tokio::test]
    async fn resolve_call_site_requires_existing_node() {
        let store = FakeGraphStore::new();
        let err = store.resolve_call_site("missing", "fn1", 1.0).await.unwrap_err();
        assert!(matches!(err, Error::Resolve { .. }));
    }

    #[tokio::test]
    async fn clear_repository_is_scoped() {
        let store = FakeGraphStore::new();
        store.upsert_file(&file("a", "repo1")).await.unwrap();
        store.upsert_file(&file("b", "repo2")).await.unwrap();
        store.clear_repository("repo1", true).await.unwrap();
        assert_eq!(store.file_count(), 1);
    }

    fn class(id: &str, name: &str, file_id: &str) -> ClassEntity {
        ClassEntity {
            id: id.into(),
            name: name.into(),
            file_id: file_id.into(),
            start_line: 1,
            end_line: 2,
            docstring: None,
            bases: vec![],
        }
    }

    #[tokio::test]
    async fn link_inherits_finds_a_base_class_defined_in_another_file() {
        let store = FakeGraphStore::new();
        store.upsert_file(&file("animal_py", "repo")).await.unwrap();
        store.upsert_file(&file("dog_py", "repo")).await.unwrap();
        store.upsert_class(&class("animal", "Animal", "animal_py")).await.unwrap();
        store.upsert_class(&class("dog", "Dog", "dog_py")).await.unwrap();

        store.link_inherits("dog", "Animal", "dog_py").await.unwrap();

        assert!(store.inherits_edges().contains(&("dog".to_string(), "animal".to_string())));
    }

    #[tokio::test]
    async fn link_inherits_ignores_base_classes_in_other_repositories() {
        let store = FakeGraphStore::new();
        store.upsert_file(&file("animal_py", "other-repo")).await.unwrap();
        store.upsert_file(&file("dog_py", "repo")).await.unwrap();
        store.upsert_class(&class("animal", "Animal", "animal_py")).await.unwrap();
        store.upsert_class(&class("dog", "Dog", "dog_py")).await.unwrap();

        store.link_inherits("dog", "Animal", "dog_py").await.unwrap();

        assert!(store.inherits_edges().is_empty());
    }
}
