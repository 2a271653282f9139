//! # Site Search Index CLI (`ssi`)
//!
//! ## Usage
//!
//! ```bash
//! ssi --config ./ssi.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ssi build` | Ingest nodes, build the index, write the snapshot |
//! | `ssi inspect` | Ingest nodes and print the built artifact as JSON |
//! | `ssi serve` | Ingest nodes and serve the index over HTTP |
//!
//! Summaries go to stdout; logs go to stderr and honour `RUST_LOG`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use site_search_index::config::{self, Config};
use site_search_index::connector_fs::{load_nodes, load_nodes_from};
use site_search_index::index::IndexArtifact;
use site_search_index::models::SourceNode;
use site_search_index::pipeline::Pipeline;
use site_search_index::server;

#[derive(Parser)]
#[command(
    name = "ssi",
    about = "Build and serve a Fuse.js search index over site pages",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./ssi.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest nodes, build the index and write the configured snapshot.
    Build {
        /// Directory of node files, overriding `[source].root`.
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Print the built artifact as JSON without writing a snapshot.
    Inspect {
        /// Directory of node files, overriding `[source].root`.
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Serve `GET /search-index` on `[server].bind`.
    Serve {
        /// Directory of node files, overriding `[source].root`.
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn read_nodes(cfg: &Config, input: Option<&Path>) -> Result<Vec<SourceNode>> {
    match input {
        Some(root) => load_nodes_from(root, &cfg.source),
        None => load_nodes(&cfg.source),
    }
}

async fn prepare(cfg: &Config, input: Option<&Path>) -> Result<Pipeline> {
    let nodes = read_nodes(cfg, input)?;
    let pipeline = Pipeline::new(cfg)?;
    pipeline.ingest(nodes).await?;
    Ok(pipeline)
}

fn print_counts(artifact: Option<&IndexArtifact>) {
    match artifact {
        None => println!("documents: 0"),
        Some(IndexArtifact::Single(bucket)) => println!("documents: {}", bucket.documents.len()),
        Some(artifact) => {
            for (namespace, count) in artifact.summary() {
                println!("documents.{}: {}", namespace, count);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg.log_level);

    match cli.command {
        Commands::Build { input } => {
            let pipeline = prepare(&cfg, input.as_deref()).await?;
            let report = pipeline.build_and_snapshot().await?;

            println!("pages: {}", report.pages());
            print_counts(report.artifact.as_ref());
            match &report.registry {
                Some(registry) => println!("digest: {}", registry.content_digest),
                None => println!("digest: -"),
            }
            if let Some(path) = &report.snapshot {
                println!("snapshot: {}", path.display());
            }
            println!("ok");
        }
        Commands::Inspect { input } => {
            let pipeline = prepare(&cfg, input.as_deref()).await?;
            let result = pipeline.query().query_site_search_index().await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Serve { input } => {
            let pipeline = prepare(&cfg, input.as_deref()).await?;
            server::run_server(&cfg, pipeline.query()).await?;
        }
    }

    Ok(())
}
