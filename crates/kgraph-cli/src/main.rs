mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use kgraph_engine::change::Mode;
use kgraph_engine::graph::ResolutionStrategy;

#[derive(Parser)]
#[command(name = "kgraph", about = "Polyglot code-graph indexer — run, clear, and report")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Neo4j Bolt URI.
    #[arg(long, global = true, env = "NEO4J_URI", default_value = "bolt://localhost:7687")]
    neo4j_uri: String,

    /// Neo4j user.
    #[arg(long, global = true, env = "NEO4J_USER", default_value = "neo4j")]
    neo4j_user: String,

    /// Neo4j password.
    #[arg(long, global = true, env = "NEO4J_PASSWORD")]
    neo4j_password: Option<String>,

    /// Neo4j database name, for multi-database deployments.
    #[arg(long, global = true, env = "NEO4J_DATABASE")]
    neo4j_database: Option<String>,

    /// Directory used to stage cloned repositories and stage/step artifacts.
    #[arg(long, global = true, env = "WORKSPACE_DIR", default_value = "./kgraph-workspace")]
    workspace_dir: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliMode {
    Incremental,
    Full,
}

impl From<CliMode> for Mode {
    fn from(m: CliMode) -> Self {
        match m {
            CliMode::Incremental => Mode::Incremental,
            CliMode::Full => Mode::Full,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliStep {
    Git,
    Parse,
    Graph,
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliStrategy {
    Join,
    Hashmap,
    Sharded,
}

impl From<CliStrategy> for ResolutionStrategy {
    fn from(s: CliStrategy) -> Self {
        match s {
            CliStrategy::Join => ResolutionStrategy::Join,
            CliStrategy::Hashmap => ResolutionStrategy::Hashmap,
            CliStrategy::Sharded => ResolutionStrategy::Sharded,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Index a repository: detect changes, parse, write to the graph, resolve placeholders.
    Run {
        /// Repository URL or local path.
        #[arg(long)]
        repo: String,

        /// Branch to index.
        #[arg(long, default_value = "main")]
        branch: String,

        /// Directory to write intermediate `--step` JSON artifacts to.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Incremental (diff against the last indexed commit) or full reindex.
        #[arg(long, value_enum, default_value = "incremental")]
        mode: CliMode,

        /// Ignore the persisted last-indexed commit and reindex everything.
        #[arg(long)]
        force_reindex: bool,

        /// Stop after this stage, writing its JSON artifact to `--output-dir`.
        #[arg(long, value_enum, default_value = "all")]
        step: CliStep,

        /// How the resolver indexes Function candidates.
        #[arg(long, value_enum, default_value = "hashmap")]
        resolution_strategy: CliStrategy,

        /// Resolve each file's placeholders as soon as it's written, in
        /// addition to the mandatory bulk pass at the end of the run.
        #[arg(long)]
        immediate_resolution: bool,
    },

    /// Delete a repository's nodes and edges from the graph.
    Clear {
        /// Repository to clear. Omit to clear every repository.
        #[arg(long)]
        repository: Option<String>,

        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,

        /// Keep the uniqueness constraints/indexes created by `run`.
        #[arg(long)]
        preserve_schema: bool,
    },

    /// Print aggregate graph statistics.
    Report {
        /// Write the report as JSON to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Restrict the report to a single repository.
        #[arg(long)]
        repository: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kgraph=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            repo,
            branch,
            output_dir,
            mode,
            force_reindex,
            step,
            resolution_strategy,
            immediate_resolution,
        } => {
            commands::run::execute(commands::run::RunArgs {
                repo,
                branch,
                output_dir,
                mode: mode.into(),
                force_reindex,
                step,
                resolution_strategy: resolution_strategy.into(),
                immediate_resolution,
                neo4j_uri: cli.neo4j_uri,
                neo4j_user: cli.neo4j_user,
                neo4j_password: cli.neo4j_password.unwrap_or_default(),
                neo4j_database: cli.neo4j_database,
                workspace_dir: cli.workspace_dir,
            })
            .await
        }
        Commands::Clear { repository, force, preserve_schema } => {
            commands::clear::execute(commands::clear::ClearArgs {
                repository,
                force,
                preserve_schema,
                neo4j_uri: cli.neo4j_uri,
                neo4j_user: cli.neo4j_user,
                neo4j_password: cli.neo4j_password.unwrap_or_default(),
                neo4j_database: cli.neo4j_database,
            })
            .await
        }
        Commands::Report { output, repository } => {
            commands::report::execute(commands::report::ReportArgs {
                output,
                repository,
                neo4j_uri: cli.neo4j_uri,
                neo4j_user: cli.neo4j_user,
                neo4j_password: cli.neo4j_password.unwrap_or_default(),
                neo4j_database: cli.neo4j_database,
            })
            .await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

pub(crate) use CliStep as Step;
