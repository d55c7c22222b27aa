//! Command-line front end for the seekd orchestration core.
//!
//! Loads configuration, builds the core over the configured static indexes
//! and runs one command. Diagnostics go to stderr; results go to stdout.

use clap::{Parser, Subcommand};
use seekd::loader::JsonIndexOpener;
use seekd::{DaemonConfig, OrchestrationCore, QueryEvent, QueryResult};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Search local indexes through the seekd query core.
#[derive(Parser)]
#[command(name = "seekd", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "SEEKD_CONFIG")]
    config: Option<PathBuf>,

    /// Extra static index directory to load. May be repeated.
    #[arg(long = "index", value_name = "DIR")]
    indexes: Vec<PathBuf>,

    /// Only run the named backend. May be repeated.
    #[arg(long = "only", value_name = "NAME")]
    only: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a query and print the hits.
    Search {
        /// Query text, in the simple query language.
        #[arg(required = true)]
        query: Vec<String>,

        /// Print hits as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// List known backends.
    List,

    /// Show indexing status of every backend.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let path = cli
        .config
        .clone()
        .unwrap_or_else(DaemonConfig::default_config_path);
    let mut config = DaemonConfig::load_lenient(&path);
    // A one-shot command has nobody to wait for.
    config.indexing.start_immediately = true;

    let mut builder = OrchestrationCore::builder(config).with_static_opener(JsonIndexOpener);
    for dir in cli.indexes {
        builder = builder.add_static_index(dir);
    }
    for name in cli.only {
        builder = builder.only_allow(name);
    }
    let core = builder.build();
    core.start();

    match cli.command {
        Command::Search { query, json } => search(&core, &query.join(" "), json).await,
        Command::List => {
            println!("{}", serde_json::to_string_pretty(&core.list_backends())?);
            Ok(())
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&core.status())?);
            Ok(())
        }
    }
}

async fn search(core: &OrchestrationCore, text: &str, json: bool) -> anyhow::Result<()> {
    let mut query = core.query(text);
    let (result, mut events) = QueryResult::new();
    core.dispatch(&mut query, &result)
        .map_err(|e| anyhow::anyhow!("query failed: {e}"))?;

    while let Some(event) = events.recv().await {
        match event {
            QueryEvent::SearchTerms(summary) => {
                tracing::debug!(exact = ?summary.exact, stemmed = ?summary.stemmed, "search terms");
            }
            QueryEvent::Started => {}
            QueryEvent::HitsAdded { hits, .. } => {
                for hit in hits {
                    if json {
                        println!("{}", serde_json::to_string(&hit)?);
                    } else {
                        println!("{:>6.2}  {:<12}  {}", hit.score, hit.source, hit.uri);
                    }
                }
            }
            QueryEvent::Finished { total_hits } => {
                tracing::info!(total_hits, "query finished");
                break;
            }
        }
    }
    Ok(())
}
