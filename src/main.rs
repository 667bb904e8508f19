use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rag_search::Result;
use rag_search::commands::{ingest_corpus, init_config, search, show_config};

#[derive(Parser)]
#[command(name = "rag-search")]
#[command(about = "Chunk-aware semantic search over a vector collection")]
#[command(version)]
struct Cli {
    /// Override the configuration directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a JSON-Lines corpus into the vector collection
    Ingest {
        /// Path to the corpus file (one JSON record per line)
        corpus: PathBuf,
    },
    /// Search the collection and print ranked results
    Search {
        /// The query text
        query: String,
        /// Number of results to return
        #[arg(long, default_value_t = 5)]
        top_k: usize,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or initialize the configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { corpus } => {
            ingest_corpus(cli.config_dir.as_deref(), &corpus)?;
        }
        Commands::Search { query, top_k, json } => {
            search(cli.config_dir.as_deref(), &query, top_k, json)?;
        }
        Commands::Config { init } => {
            if init {
                init_config(cli.config_dir.as_deref())?;
            } else {
                show_config(cli.config_dir.as_deref())?;
            }
        }
    }

    Ok(())
}
