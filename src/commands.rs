use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::config::{Config, get_config_dir};
use crate::documents::load_corpus;
use crate::embeddings::GeminiClient;
use crate::ingestion::{IngestSettings, Ingestor};
use crate::retriever::{ResultEntry, RetrievalSettings, Retriever};
use crate::store::QdrantStore;

fn load_config(config_dir: Option<&Path>) -> Result<Config> {
    let dir = match config_dir {
        Some(dir) => dir.to_path_buf(),
        None => get_config_dir()?,
    };
    Config::load(dir)
}

fn build_clients(config: &Config) -> Result<(QdrantStore, GeminiClient)> {
    let api_key = config.resolve_api_key().context(
        "No Gemini API key configured; set [gemini].api_key or the GEMINI_API_KEY environment variable",
    )?;

    let store = QdrantStore::new(&config.qdrant)?;
    let embedder = GeminiClient::new(&config.gemini, api_key)?;
    Ok((store, embedder))
}

/// Ingest a JSON-Lines corpus file into the configured collection
#[inline]
pub fn ingest_corpus(config_dir: Option<&Path>, corpus: &Path) -> Result<()> {
    let config = load_config(config_dir)?;
    let (store, embedder) = build_clients(&config)?;

    let documents = load_corpus(corpus)?;
    if documents.is_empty() {
        println!("No documents found in {}", corpus.display());
        return Ok(());
    }

    println!(
        "Loaded {} documents from {}",
        documents.len(),
        corpus.display()
    );
    info!(
        "Starting ingestion into collection {}",
        config.qdrant.collection
    );

    let ingestor = Ingestor::new(&store, &embedder, IngestSettings::from_config(&config));

    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(format!("Ingesting {} documents...", documents.len()));
    bar.enable_steady_tick(Duration::from_millis(120));

    let report = ingestor.ingest(&documents)?;
    bar.finish_and_clear();

    if report.skipped_existing {
        println!(
            "{}",
            style("Collection already holds vectors; nothing to ingest.").yellow()
        );
        return Ok(());
    }

    println!("{}", style("Ingestion complete").bold().green());
    println!("  Whole documents embedded: {}", report.documents_embedded);
    println!(
        "  Documents chunked: {} ({} chunk vectors)",
        report.documents_chunked, report.chunks_embedded
    );
    println!("  Documents skipped: {}", report.documents_skipped);
    println!("  Points written: {}", report.points_written);

    Ok(())
}

/// Run a semantic search and print the ranked results
#[inline]
pub fn search(config_dir: Option<&Path>, query: &str, top_k: usize, json: bool) -> Result<()> {
    let config = load_config(config_dir)?;
    let (store, embedder) = build_clients(&config)?;
    let retriever = Retriever::new(&store, &embedder, RetrievalSettings::from_config(&config));

    let results = retriever.semantic_search(query, top_k);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("Failed to serialize results")?
        );
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, entry) in results.iter().enumerate() {
        print_entry(rank + 1, entry);
    }

    Ok(())
}

fn print_entry(rank: usize, entry: &ResultEntry) {
    let filename = entry
        .metadata
        .get("filename")
        .map_or("<unknown>", String::as_str);

    println!(
        "{} {} {}",
        style(format!("{rank}.")).bold(),
        style(filename).bold().cyan(),
        style(format!("(score {:.3})", entry.score)).dim()
    );

    if let Some(note) = entry.metadata.get("note") {
        println!("   {}", style(note).yellow());
    }

    for (key, value) in &entry.metadata {
        if key != "filename" && key != "note" {
            println!("   {key}: {value}");
        }
    }

    println!("   {}", excerpt(&entry.text, 240));
    println!();
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }

    let mut shortened: String = flattened.chars().take(max_chars).collect();
    shortened.push('…');
    shortened
}

/// Write a default config file if none exists yet
#[inline]
pub fn init_config(config_dir: Option<&Path>) -> Result<()> {
    let dir: PathBuf = match config_dir {
        Some(dir) => dir.to_path_buf(),
        None => get_config_dir()?,
    };

    let config_path = dir.join("config.toml");
    if config_path.exists() {
        println!("Config file already exists: {}", config_path.display());
        return Ok(());
    }

    let config = Config {
        base_dir: dir,
        ..Config::default()
    };
    config.save()?;

    println!(
        "{} {}",
        style("Wrote default config to").green(),
        style(config_path.display()).cyan()
    );
    Ok(())
}

/// Print the active configuration
#[inline]
pub fn show_config(config_dir: Option<&Path>) -> Result<()> {
    let config = load_config(config_dir)?;

    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!();
    eprintln!("{}", style("Gemini:").bold().yellow());
    eprintln!("  model: {}", config.gemini.model);
    eprintln!("  vector_size: {}", config.gemini.vector_size);
    eprintln!(
        "  api_key: {}",
        if config.resolve_api_key().is_some() {
            "<set>"
        } else {
            "<not set>"
        }
    );
    eprintln!();
    eprintln!("{}", style("Qdrant:").bold().yellow());
    eprintln!("  url: {}", config.qdrant.url);
    eprintln!("  collection: {}", config.qdrant.collection);
    eprintln!();
    eprintln!("{}", style("Ingestion:").bold().yellow());
    eprintln!("  max_chunk_size: {}", config.ingestion.max_chunk_size);
    eprintln!("  batch_size: {}", config.ingestion.batch_size);
    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!("  overfetch_factor: {}", config.retrieval.overfetch_factor);
    eprintln!(
        "  max_chunks_per_merge: {}",
        config.retrieval.max_chunks_per_merge
    );

    Ok(())
}
