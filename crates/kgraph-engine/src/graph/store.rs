use async_trait::async_trait;

use kgraph_core::{CallSite, ClassEntity, FileEntity, FunctionEntity, ImportSite, Result};

/// A Function node as returned by a bulk fetch, carrying just the fields the
/// resolver's scoring rules need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRow {
    pub id: String,
    pub file_id: String,
    /// Empty string for free functions, matching [`FunctionEntity::class_id`].
    pub class_id: String,
    pub name: String,
    pub start_line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRow {
    pub id: String,
    pub file_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRow {
    pub id: String,
    pub path: String,
    pub repository: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteRow {
    pub id: String,
    pub caller_file_id: String,
    pub call_name: String,
    pub call_module: Option<String>,
    pub is_attribute_call: bool,
    pub start_line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSiteRow {
    pub id: String,
    pub file_id: String,
    pub import_name: String,
    pub module_name: Option<String>,
    pub is_from_import: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GraphStats {
    pub files: u64,
    pub classes: u64,
    pub functions: u64,
    pub call_sites: u64,
    pub import_sites: u64,
    pub resolved_calls: u64,
    pub resolved_imports: u64,
}

/// The graph backend's primitive operations. GraphWriter and
/// PlaceholderResolver are written entirely against this trait so they can
/// be exercised against [`super::fake_store::FakeGraphStore`] without a live
/// database, and so the Cypher dialect lives in exactly one place
/// ([`super::neo4j_store::Neo4jStore`]).
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn setup_schema(&self) -> Result<()>;

    /// Delete every node and relationship for `repository`. If
    /// `preserve_schema` is false, also drop the constraints/indexes created
    /// by `setup_schema`.
    async fn clear_repository(&self, repository: &str, preserve_schema: bool) -> Result<()>;

    /// Delete every node and relationship for every repository.
    async fn clear_all(&self, preserve_schema: bool) -> Result<()>;

    /// Delete a File node and everything it CONTAINS, transitively
    /// (Class, Function, CallSite, ImportSite), along with any RESOLVES_TO
    /// edges pointing at the deleted nodes.
    async fn delete_file_cascade(&self, file_id: &str) -> Result<()>;

    async fn upsert_file(&self, file: &FileEntity) -> Result<()>;
    async fn upsert_class(&self, class: &ClassEntity) -> Result<()>;
    async fn upsert_function(&self, function: &FunctionEntity) -> Result<()>;
    async fn upsert_call_site(&self, call_site: &CallSite) -> Result<()>;
    async fn upsert_import_site(&self, import_site: &ImportSite) -> Result<()>;

    /// MERGE a CONTAINS edge `parent_id -> child_id`.
    async fn link_contains(&self, parent_id: &str, child_id: &str) -> Result<()>;

    /// MERGE an INHERITS_FROM edge from `class_id` to whichever Class named
    /// `base_name` exists in the same repository as `file_id`'s File node.
    /// A no-op if no such Class exists yet (a later run may create it).
    async fn link_inherits(&self, class_id: &str, base_name: &str, file_id: &str) -> Result<()>;

    async fn resolve_call_site(&self, call_site_id: &str, function_id: &str, score: f64) -> Result<()>;
    async fn resolve_import_site(&self, import_site_id: &str, target_id: &str, score: f64) -> Result<()>;

    async fn all_files(&self, repository: &str) -> Result<Vec<FileRow>>;
    async fn all_classes(&self, repository: &str) -> Result<Vec<ClassRow>>;
    async fn all_functions(&self, repository: &str) -> Result<Vec<FunctionRow>>;
    async fn unresolved_call_sites(&self, repository: &str) -> Result<Vec<CallSiteRow>>;
    async fn unresolved_import_sites(&self, repository: &str) -> Result<Vec<ImportSiteRow>>;

    async fn stats(&self, repository: &str) -> Result<GraphStats>;

    /// Aggregate counts across every repository in the graph.
    async fn stats_all(&self) -> Result<GraphStats>;
}
