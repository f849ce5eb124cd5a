use std::path::PathBuf;

use anyhow::{Context, Result};

use kgraph_engine::artifacts::{self, GraphStatsOutput};
use kgraph_engine::graph::{GraphStore as _, Neo4jStore};

pub struct ReportArgs {
    pub output: Option<PathBuf>,
    pub repository: Option<String>,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub neo4j_database: Option<String>,
}

pub async fn execute(args: ReportArgs) -> Result<()> {
    let store = Neo4jStore::connect(
        &args.neo4j_uri,
        &args.neo4j_user,
        &args.neo4j_password,
        args.neo4j_database.as_deref(),
    )
    .await
    .context("failed to connect to Neo4j")?;

    let stats = match &args.repository {
        Some(repository) => store.stats(repository).await.context("failed to read graph stats")?,
        None => store.stats_all().await.context("failed to read graph stats")?,
    };

    let report = GraphStatsOutput::from_graph_stats(stats);

    match args.output {
        Some(path) => {
            artifacts::write_json(&path, &report).context("failed to write report")?;
            println!("report written to {}", path.display());
        }
        None => {
            println!("files:             {}", report.files);
            println!("classes:           {}", report.classes);
            println!("functions:         {}", report.functions);
            println!("call sites:        {}", report.call_sites);
            println!("import sites:      {}", report.import_sites);
            println!("resolved calls:    {}", report.resolved_calls);
            println!("resolved imports:  {}", report.resolved_imports);
            println!("relationships:     {}", report.relationships);
        }
    }
    Ok(())
}
