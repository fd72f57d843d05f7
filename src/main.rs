//! Depscope CLI entry point

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "depscope")]
#[command(about = "Inspect the dependency graph of a JavaScript project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project directory (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,
}

/// Options shared by every command that builds a graph.
#[derive(Args, Clone)]
pub struct GraphArgs {
    /// Maximum dependency depth (overrides depscope.toml)
    #[arg(short, long)]
    depth: Option<usize>,

    /// Only list the workspace package in the current directory
    #[arg(long)]
    no_monorepo: bool,

    /// Record packages matching these patterns without listing their dependencies
    #[arg(long = "skip", value_name = "PATTERN")]
    skip: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every resolved package
    List {
        #[command(flatten)]
        graph: GraphArgs,

        /// Print nodes as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the packages matching name/version patterns
    Query {
        /// Patterns such as `react`, `@vue/*`, `lodash@<4.17.21`
        #[arg(required = true)]
        patterns: Vec<String>,

        /// Require every pattern to match instead of any
        #[arg(long)]
        all: bool,

        #[command(flatten)]
        graph: GraphArgs,
    },
    /// Resolve manifests and fetch registry metadata
    Enrich {
        #[command(flatten)]
        graph: GraphArgs,

        /// Use cached metadata only
        #[arg(long)]
        offline: bool,

        /// Print nodes as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear the metadata cache
    Clear {
        /// Only drop expired latest-version entries
        #[arg(long)]
        expired: bool,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays clean
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "depscope={log_level},depscope_core={log_level},depscope_adapters={log_level},depscope_enrich={log_level}"
        )))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Depscope v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Project root: {}", cli.root.display());

    match cli.command {
        Commands::List { graph, json } => commands::list(cli.root, graph, json).await,
        Commands::Query {
            patterns,
            all,
            graph,
        } => commands::query(cli.root, graph, patterns, all).await,
        Commands::Enrich {
            graph,
            offline,
            json,
        } => commands::enrich(cli.root, graph, offline, json).await,
        Commands::Clear { expired } => commands::clear(cli.root, expired),
        Commands::Version => {
            println!("Depscope v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
