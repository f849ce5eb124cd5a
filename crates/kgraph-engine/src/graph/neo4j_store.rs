use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph};

use kgraph_core::{CallSite, ClassEntity, Error, FileEntity, FunctionEntity, ImportSite, Result};

use super::store::{CallSiteRow, ClassRow, FileRow, FunctionRow, GraphStats, GraphStore, ImportSiteRow};

/// Neo4j-backed [`GraphStore`]. Every write is a single `MERGE ... SET`
/// statement so re-running the same upsert is a no-op beyond the property
/// overwrite, matching the idempotent-upsert contract.
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    pub async fn connect(uri: &str, user: &str, password: &str, database: Option<&str>) -> Result<Self> {
        let graph = match database {
            Some(db) => {
                let config = ConfigBuilder::default()
                    .uri(uri)
                    .user(user)
                    .password(password)
                    .db(db)
                    .build()
                    .map_err(|e| Error::Connection(e.to_string()))?;
                Graph::connect(config)
                    .await
                    .map_err(|e| Error::Connection(e.to_string()))?
            }
            None => Graph::new(uri, user, password)
                .await
                .map_err(|e| Error::Connection(e.to_string()))?,
        };
        Ok(Self { graph })
    }

    async fn run(&self, q: neo4rs::Query) -> Result<()> {
        self.graph
            .run(q)
            .await
            .map_err(|e| Error::Write { id: String::new(), message: e.to_string() })
    }

    fn nullable(v: &Option<String>) -> String {
        v.clone().unwrap_or_default()
    }

    async fn drop_schema(&self) -> Result<()> {
        let drops = [
            "DROP CONSTRAINT file_id_unique IF EXISTS",
            "DROP CONSTRAINT class_id_unique IF EXISTS",
            "DROP CONSTRAINT function_id_unique IF EXISTS",
            "DROP CONSTRAINT call_site_id_unique IF EXISTS",
            "DROP CONSTRAINT import_site_id_unique IF EXISTS",
        ];
        for stmt in drops {
            self.run(query(stmt)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn setup_schema(&self) -> Result<()> {
        let statements = [
            "CREATE CONSTRAINT file_id_unique IF NOT EXISTS FOR (f:File) REQUIRE f.id IS UNIQUE",
            "CREATE CONSTRAINT class_id_unique IF NOT EXISTS FOR (c:Class) REQUIRE c.id IS UNIQUE",
            "CREATE CONSTRAINT function_id_unique IF NOT EXISTS FOR (fn:Function) REQUIRE fn.id IS UNIQUE",
            "CREATE CONSTRAINT call_site_id_unique IF NOT EXISTS FOR (cs:CallSite) REQUIRE cs.id IS UNIQUE",
            "CREATE CONSTRAINT import_site_id_unique IF NOT EXISTS FOR (is:ImportSite) REQUIRE is.id IS UNIQUE",
            "CREATE INDEX function_name_file IF NOT EXISTS FOR (fn:Function) ON (fn.name, fn.file_id)",
            "CREATE INDEX function_name_class IF NOT EXISTS FOR (fn:Function) ON (fn.name, fn.class_id)",
            "CREATE INDEX class_name_file IF NOT EXISTS FOR (c:Class) ON (c.name, c.file_id)",
            "CREATE INDEX call_site_name_module IF NOT EXISTS FOR (cs:CallSite) ON (cs.call_name, cs.call_module)",
            "CREATE INDEX import_site_name_module IF NOT EXISTS FOR (is:ImportSite) ON (is.import_name, is.module_name)",
        ];
        for stmt in statements {
            self.run(query(stmt)).await?;
        }
        Ok(())
    }

    async fn clear_repository(&self, repository: &str, preserve_schema: bool) -> Result<()> {
        self.run(
            query(
                "MATCH (f:File {repository: $repository}) \
                 OPTIONAL MATCH (f)-[:CONTAINS*0..]->(n) \
                 DETACH DELETE f, n",
            )
            .param("repository", repository),
        )
        .await?;

        if !preserve_schema {
            self.drop_schema().await?;
        }
        Ok(())
    }

    async fn clear_all(&self, preserve_schema: bool) -> Result<()> {
        self.run(query(
            "MATCH (f:File) \
             OPTIONAL MATCH (f)-[:CONTAINS*0..]->(n) \
             DETACH DELETE f, n",
        ))
        .await?;

        if !preserve_schema {
            self.drop_schema().await?;
        }
        Ok(())
    }

    async fn delete_file_cascade(&self, file_id: &str) -> Result<()> {
        self.run(
            query(
                "MATCH (f:File {id: $file_id}) \
                 OPTIONAL MATCH (f)-[:CONTAINS*0..]->(n) \
                 DETACH DELETE f, n",
            )
            .param("file_id", file_id),
        )
        .await
    }

    async fn upsert_file(&self, file: &FileEntity) -> Result<()> {
        self.run(
            query(
                "MERGE (f:File {id: $id}) \
                 SET f.path = $path, f.name = $name, f.language = $language, \
                     f.repository = $repository, f.repository_url = $repository_url, \
                     f.commit = $commit, f.branch = $branch, f.last_updated = $last_updated",
            )
            .param("id", file.id.clone())
            .param("path", file.path.clone())
            .param("name", file.name.clone())
            .param("language", file.language.to_string())
            .param("repository", file.repository.clone())
            .param("repository_url", file.repository_url.clone())
            .param("commit", file.commit.clone())
            .param("branch", file.branch.clone())
            .param("last_updated", file.last_updated.to_rfc3339()),
        )
        .await
    }

    async fn upsert_class(&self, class: &ClassEntity) -> Result<()> {
        self.run(
            query(
                "MERGE (c:Class {id: $id}) \
                 SET c.name = $name, c.file_id = $file_id, c.start_line = $start_line, \
                     c.end_line = $end_line, c.docstring = $docstring, c.bases = $bases",
            )
            .param("id", class.id.clone())
            .param("name", class.name.clone())
            .param("file_id", class.file_id.clone())
            .param("start_line", class.start_line as i64)
            .param("end_line", class.end_line as i64)
            .param("docstring", Self::nullable(&class.docstring))
            .param("bases", class.bases.clone()),
        )
        .await
    }

    async fn upsert_function(&self, function: &FunctionEntity) -> Result<()> {
        self.run(
            query(
                "MERGE (fn:Function {id: $id}) \
                 SET fn.name = $name, fn.file_id = $file_id, fn.class_id = $class_id, \
                     fn.start_line = $start_line, fn.end_line = $end_line, \
                     fn.params = $params, fn.docstring = $docstring, fn.is_method = $is_method",
            )
            .param("id", function.id.clone())
            .param("name", function.name.clone())
            .param("file_id", function.file_id.clone())
            .param("class_id", function.class_id.clone())
            .param("start_line", function.start_line as i64)
            .param("end_line", function.end_line as i64)
            .param("params", function.params.clone())
            .param("docstring", Self::nullable(&function.docstring))
            .param("is_method", function.is_method),
        )
        .await
    }

    async fn upsert_call_site(&self, call_site: &CallSite) -> Result<()> {
        self.run(
            query(
                "MERGE (cs:CallSite {id: $id}) \
                 SET cs.caller_file_id = $caller_file_id, \
                     cs.caller_function_id = $caller_function_id, \
                     cs.caller_class_id = $caller_class_id, \
                     cs.call_name = $call_name, cs.call_module = $call_module, \
                     cs.is_attribute_call = $is_attribute_call, \
                     cs.start_line = $start_line, cs.start_col = $start_col, \
                     cs.end_line = $end_line, cs.end_col = $end_col",
            )
            .param("id", call_site.id.clone())
            .param("caller_file_id", call_site.caller_file_id.clone())
            .param("caller_function_id", Self::nullable(&call_site.caller_function_id))
            .param("caller_class_id", Self::nullable(&call_site.caller_class_id))
            .param("call_name", call_site.call_name.clone())
            .param("call_module", Self::nullable(&call_site.call_module))
            .param("is_attribute_call", call_site.is_attribute_call)
            .param("start_line", call_site.position.start_line as i64)
            .param("start_col", call_site.position.start_col as i64)
            .param("end_line", call_site.position.end_line as i64)
            .param("end_col", call_site.position.end_col as i64),
        )
        .await
    }

    async fn upsert_import_site(&self, import_site: &ImportSite) -> Result<()> {
        self.run(
            query(
                "MERGE (is:ImportSite {id: $id}) \
                 SET is.file_id = $file_id, is.import_name = $import_name, \
                     is.module_name = $module_name, is.alias = $alias, \
                     is.is_from_import = $is_from_import, \
                     is.start_line = $start_line, is.start_col = $start_col, \
                     is.end_line = $end_line, is.end_col = $end_col",
            )
            .param("id", import_site.id.clone())
            .param("file_id", import_site.file_id.clone())
            .param("import_name", import_site.import_name.clone())
            .param("module_name", Self::nullable(&import_site.module_name))
            .param("alias", Self::nullable(&import_site.alias))
            .param("is_from_import", import_site.is_from_import)
            .param("start_line", import_site.position.start_line as i64)
            .param("start_col", import_site.position.start_col as i64)
            .param("end_line", import_site.position.end_line as i64)
            .param("end_col", import_site.position.end_col as i64),
        )
        .await
    }

    async fn link_contains(&self, parent_id: &str, child_id: &str) -> Result<()> {
        self.run(
            query(
                "MATCH (p {id: $parent_id}), (c {id: $child_id}) \
                 MERGE (p)-[:CONTAINS]->(c)",
            )
            .param("parent_id", parent_id)
            .param("child_id", child_id),
        )
        .await
    }

    /// A base class named `base_name` can live in any file of the same
    /// repository (the defining module may be imported rather than local);
    /// `ORDER BY ... LIMIT 1` makes the pick deterministic when more than
    /// one same-named Class exists in the repository.
    async fn link_inherits(&self, class_id: &str, base_name: &str, file_id: &str) -> Result<()> {
        self.run(
            query(
                "MATCH (c:Class {id: $class_id}), (f:File {id: $file_id}) \
                 MATCH (bf:File {repository: f.repository})-[:CONTAINS]->(base:Class {name: $base_name}) \
                 WITH c, base ORDER BY base.id ASC LIMIT 1 \
                 MERGE (c)-[:INHERITS_FROM]->(base)",
            )
            .param("class_id", class_id)
            .param("file_id", file_id)
            .param("base_name", base_name),
        )
        .await
    }

    async fn resolve_call_site(&self, call_site_id: &str, function_id: &str, score: f64) -> Result<()> {
        self.run(
            query(
                "MATCH (cs:CallSite {id: $call_site_id}), (fn:Function {id: $function_id}) \
                 MERGE (cs)-[r:RESOLVES_TO]->(fn) \
                 SET r.score = $score",
            )
            .param("call_site_id", call_site_id)
            .param("function_id", function_id)
            .param("score", score),
        )
        .await
    }

    async fn resolve_import_site(&self, import_site_id: &str, target_id: &str, score: f64) -> Result<()> {
        self.run(
            query(
                "MATCH (is:ImportSite {id: $import_site_id}), (t {id: $target_id}) \
                 MERGE (is)-[r:RESOLVES_TO]->(t) \
                 SET r.score = $score",
            )
            .param("import_site_id", import_site_id)
            .param("target_id", target_id)
            .param("score", score),
        )
        .await
    }

    async fn all_files(&self, repository: &str) -> Result<Vec<FileRow>> {
        let mut result = self
            .graph
            .execute(query("MATCH (f:File {repository: $repository}) RETURN f.id AS id, f.path AS path").param("repository", repository))
            .await
            .map_err(|e| Error::Resolve { id: String::new(), message: e.to_string() })?;

        let mut rows = Vec::new();
        while let Some(row) = result.next().await.map_err(|e| Error::Resolve { id: String::new(), message: e.to_string() })? {
            rows.push(FileRow {
                id: row.get("id").unwrap_or_default(),
                path: row.get("path").unwrap_or_default(),
                repository: repository.to_string(),
            });
        }
        Ok(rows)
    }

    async fn all_classes(&self, repository: &str) -> Result<Vec<ClassRow>> {
        let mut result = self
            .graph
            .execute(
                query(
                    "MATCH (f:File {repository: $repository})-[:CONTAINS]->(c:Class) \
                     RETURN c.id AS id, c.file_id AS file_id, c.name AS name",
                )
                .param("repository", repository),
            )
            .await
            .map_err(|e| Error::Resolve { id: String::new(), message: e.to_string() })?;

        let mut rows = Vec::new();
        while let Some(row) = result.next().await.map_err(|e| Error::Resolve { id: String::new(), message: e.to_string() })? {
            rows.push(ClassRow {
                id: row.get("id").unwrap_or_default(),
                file_id: row.get("file_id").unwrap_or_default(),
                name: row.get("name").unwrap_or_default(),
            });
        }
        Ok(rows)
    }

    async fn all_functions(&self, repository: &str) -> Result<Vec<FunctionRow>> {
        let mut result = self
            .graph
            .execute(
                query(
                    "MATCH (f:File {repository: $repository})-[:CONTAINS*1..2]->(fn:Function) \
                     RETURN DISTINCT fn.id AS id, fn.file_id AS file_id, fn.class_id AS class_id, \
                            fn.name AS name, fn.start_line AS start_line",
                )
                .param("repository", repository),
            )
            .await
            .map_err(|e| Error::Resolve { id: String::new(), message: e.to_string() })?;

        let mut rows = Vec::new();
        while let Some(row) = result.next().await.map_err(|e| Error::Resolve { id: String::new(), message: e.to_string() })? {
            rows.push(FunctionRow {
                id: row.get("id").unwrap_or_default(),
                file_id: row.get("file_id").unwrap_or_default(),
                class_id: row.get("class_id").unwrap_or_default(),
                name: row.get("name").unwrap_or_default(),
                start_line: row.get::<i64>("start_line").unwrap_or_default() as u32,
            });
        }
        Ok(rows)
    }

    async fn unresolved_call_sites(&self, repository: &str) -> Result<Vec<CallSiteRow>> {
        let mut result = self
            .graph
            .execute(
                query(
                    "MATCH (f:File {repository: $repository})-[:CONTAINS*1..3]->(cs:CallSite) \
                     WHERE NOT (cs)-[:RESOLVES_TO]->() \
                     RETURN DISTINCT cs.id AS id, cs.caller_file_id AS caller_file_id, \
                            cs.call_name AS call_name, cs.call_module AS call_module, \
                            cs.is_attribute_call AS is_attribute_call, cs.start_line AS start_line",
                )
                .param("repository", repository),
            )
            .await
            .map_err(|e| Error::Resolve { id: String::new(), message: e.to_string() })?;

        let mut rows = Vec::new();
        while let Some(row) = result.next().await.map_err(|e| Error::Resolve { id: String::new(), message: e.to_string() })? {
            let module: String = row.get("call_module").unwrap_or_default();
            rows.push(CallSiteRow {
                id: row.get("id").unwrap_or_default(),
                caller_file_id: row.get("caller_file_id").unwrap_or_default(),
                call_name: row.get("call_name").unwrap_or_default(),
                call_module: if module.is_empty() { None } else { Some(module) },
                is_attribute_call: row.get("is_attribute_call").unwrap_or_default(),
                start_line: row.get::<i64>("start_line").unwrap_or_default() as u32,
            });
        }
        Ok(rows)
    }

    async fn unresolved_import_sites(&self, repository: &str) -> Result<Vec<ImportSiteRow>> {
        let mut result = self
            .graph
            .execute(
                query(
                    "MATCH (f:File {repository: $repository})-[:CONTAINS]->(is:ImportSite) \
                     WHERE NOT (is)-[:RESOLVES_TO]->() \
                     RETURN is.id AS id, is.file_id AS file_id, is.import_name AS import_name, \
                            is.module_name AS module_name, is.is_from_import AS is_from_import",
                )
                .param("repository", repository),
            )
            .await
            .map_err(|e| Error::Resolve { id: String::new(), message: e.to_string() })?;

        let mut rows = Vec::new();
        while let Some(row) = result.next().await.map_err(|e| Error::Resolve { id: String::new(), message: e.to_string() })? {
            let module: String = row.get("module_name").unwrap_or_default();
            rows.push(ImportSiteRow {
                id: row.get("id").unwrap_or_default(),
                file_id: row.get("file_id").unwrap_or_default(),
                import_name: row.get("import_name").unwrap_or_default(),
                module_name: if module.is_empty() { None } else { Some(module) },
                is_from_import: row.get("is_from_import").unwrap_or_default(),
            });
        }
        Ok(rows)
    }

    async fn stats(&self, repository: &str) -> Result<GraphStats> {
        let mut result = self
            .graph
            .execute(
                query(
                    "MATCH (f:File {repository: $repository}) \
                     OPTIONAL MATCH (f)-[:CONTAINS]->(c:Class) \
                     OPTIONAL MATCH (f)-[:CONTAINS*1..2]->(fn:Function) \
                     OPTIONAL MATCH (f)-[:CONTAINS*1..3]->(cs:CallSite) \
                     OPTIONAL MATCH (f)-[:CONTAINS]->(is:ImportSite) \
                     OPTIONAL MATCH (cs)-[:RESOLVES_TO]->() \
                     OPTIONAL MATCH (is)-[:RESOLVES_TO]->() \
                     RETURN count(DISTINCT f) AS files, count(DISTINCT c) AS classes, \
                            count(DISTINCT fn) AS functions, count(DISTINCT cs) AS call_sites, \
                            count(DISTINCT is) AS import_sites, \
                            count(DISTINCT CASE WHEN (cs)-[:RESOLVES_TO]->() THEN cs END) AS resolved_calls, \
                            count(DISTINCT CASE WHEN (is)-[:RESOLVES_TO]->() THEN is END) AS resolved_imports",
                )
                .param("repository", repository),
            )
            .await
            .map_err(|e| Error::Resolve { id: String::new(), message: e.to_string() })?;

        if let Some(row) = result.next().await.map_err(|e| Error::Resolve { id: String::new(), message: e.to_string() })? {
            Ok(GraphStats {
                files: row.get::<i64>("files").unwrap_or_default() as u64,
                classes: row.get::<i64>("classes").unwrap_or_default() as u64,
                functions: row.get::<i64>("functions").unwrap_or_default() as u64,
                call_sites: row.get::<i64>("call_sites").unwrap_or_default() as u64,
                import_sites: row.get::<i64>("import_sites").unwrap_or_default() as u64,
                resolved_calls: row.get::<i64>("resolved_calls").unwrap_or_default() as u64,
                resolved_imports: row.get::<i64>("resolved_imports").unwrap_or_default() as u64,
            })
        } else {
            Ok(GraphStats::default())
        }
    }

    async fn stats_all(&self) -> Result<GraphStats> {
        let mut result = self
            .graph
            .execute(query(
                "MATCH (f:File) \
                 OPTIONAL MATCH (f)-[:CONTAINS]->(c:Class) \
                 OPTIONAL MATCH (f)-[:CONTAINS*1..2]->(fn:Function) \
                 OPTIONAL MATCH (f)-[:CONTAINS*1..3]->(cs:CallSite) \
                 OPTIONAL MATCH (f)-[:CONTAINS]->(is:ImportSite) \
                 OPTIONAL MATCH (cs)-[:RESOLVES_TO]->() \
                 OPTIONAL MATCH (is)-[:RESOLVES_TO]->() \
                 RETURN count(DISTINCT f) AS files, count(DISTINCT c) AS classes, \
                        count(DISTINCT fn) AS functions, count(DISTINCT cs) AS call_sites, \
                        count(DISTINCT is) AS import_sites, \
                        count(DISTINCT CASE WHEN (cs)-[:RESOLVES_TO]->() THEN cs END) AS resolved_calls, \
                        count(DISTINCT CASE WHEN (is)-[:RESOLVES_TO]->() THEN is END) AS resolved_imports",
            ))
            .await
            .map_err(|e| Error::Resolve { id: String::new(), message: e.to_string() })?;

        if let Some(row) = result.next().await.map_err(|e| Error::Resolve { id: String::new(), message: e.to_string() })? {
            Ok(GraphStats {
                files: row.get::<i64>("files").unwrap_or_default() as u64,
                classes: row.get::<i64>("classes").unwrap_or_default() as u64,
                functions: row.get::<i64>("functions").unwrap_or_default() as u64,
                call_sites: row.get::<i64>("call_sites").unwrap_or_default() as u64,
                import_sites: row.get::<i64>("import_sites").unwrap_or_default() as u64,
                resolved_calls: row.get::<i64>("resolved_calls").unwrap_or_default() as u64,
                resolved_imports: row.get::<i64>("resolved_imports").unwrap_or_default() as u64,
            })
        } else {
            Ok(GraphStats::default())
        }
    }
}
