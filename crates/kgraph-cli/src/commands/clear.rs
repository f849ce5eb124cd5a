use std::io::{self, Write as _};

use anyhow::{Context, Result};

use kgraph_engine::graph::{GraphWriter, Neo4jStore};

pub struct ClearArgs {
    pub repository: Option<String>,
    pub force: bool,
    pub preserve_schema: bool,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub neo4j_database: Option<String>,
}

pub async fn execute(args: ClearArgs) -> Result<()> {
    // Wiping every repository in one call is allowed, but only when the
    // caller explicitly opts in with --force; without a --repository there
    // is no single name to echo back in an interactive confirmation prompt.
    if args.repository.is_none() && !args.force {
        anyhow::bail!("clearing every repository requires both omitting --repository and passing --force");
    }

    if !args.force {
        let repository = args.repository.as_deref().expect("checked above");
        print!("This will permanently delete repository '{repository}' from the graph. Continue? [y/N] ");
        io::stdout().flush().ok();
        let mut answer = String::new();
        io::stdin().read_line(&mut answer).context("failed to read confirmation")?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("aborted");
            return Ok(());
        }
    }

    let store = Neo4jStore::connect(
        &args.neo4j_uri,
        &args.neo4j_user,
        &args.neo4j_password,
        args.neo4j_database.as_deref(),
    )
    .await
    .context("failed to connect to Neo4j")?;

    let writer = GraphWriter::new(std::sync::Arc::new(store));
    match &args.repository {
        Some(repository) => {
            writer
                .clear_repository(repository, args.preserve_schema)
                .await
                .context("failed to clear repository")?;
            println!("cleared repository: {repository}");
        }
        None => {
            writer.clear_all(args.preserve_schema).await.context("failed to clear graph")?;
            println!("cleared all repositories");
        }
    }
    Ok(())
}
