//! # Incident Harness CLI (`inci`)
//!
//! Front end over the engine's operations. Every command prints the
//! operation's JSON envelope to stdout, so the binary can back a dashboard
//! or be scripted directly.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `inci init` | Create the store directory and collection |
//! | `inci ingest <source>` | Load incidents from a file or URL |
//! | `inci search "<query>"` | Find similar incidents |
//! | `inci stats` | Collection statistics |
//! | `inci galaxy` | 3-D layout, cached by cardinality |
//! | `inci clear` | Delete and recreate the collection |

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use incident_harness::config;
use incident_harness::engine::Engine;
use incident_harness::search::DEFAULT_TOP_K;

/// Incident Harness — a semantic retrieval store for incident records.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with `[store]`, `[embedding]`, and `[ingest]` sections.
#[derive(Parser)]
#[command(
    name = "inci",
    about = "Incident Harness — semantic retrieval over incident records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/inci.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the store directory and the collection.
    ///
    /// Idempotent — running it against an existing collection is safe.
    Init,

    /// Load incidents from a file (CSV/JSON) or a web page.
    Ingest {
        /// File path/name or URL.
        source: String,

        /// Source kind: `file` or `url`.
        #[arg(long, default_value = "file")]
        kind: String,
    },

    /// Find incidents similar to a free-text description.
    Search {
        /// The query text.
        query: String,

        /// Maximum number of results (hard-capped at 50).
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Metadata equality filters as `key=value` pairs.
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,
    },

    /// Print collection statistics.
    Stats,

    /// Print the 3-D galaxy layout.
    Galaxy {
        /// Recompute even if a valid cache exists.
        #[arg(long)]
        no_cache: bool,
    },

    /// Delete the collection's contents and recreate it empty.
    Clear,
}

/// Parse a `key=value` pair for `--filter` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let engine = Engine::open(cfg).await?;

    match cli.command {
        Commands::Init => {
            println!(
                "Collection '{}' initialized ({} incidents).",
                engine.store().collection_name(),
                engine.store().count().await?
            );
        }
        Commands::Ingest { source, kind } => {
            print_json(&engine.ingest(&source, &kind).await)?;
        }
        Commands::Search {
            query,
            top_k,
            filters,
        } => {
            let filter_map: BTreeMap<String, String> = filters.into_iter().collect();
            let filters = if filter_map.is_empty() {
                None
            } else {
                Some(&filter_map)
            };
            print_json(&engine.search(&query, top_k, filters).await)?;
        }
        Commands::Stats => {
            print_json(&engine.stats().await)?;
        }
        Commands::Galaxy { no_cache } => {
            print_json(&engine.galaxy(!no_cache).await)?;
        }
        Commands::Clear => {
            print_json(&engine.clear().await)?;
        }
    }

    engine.store().close().await;
    Ok(())
}
