//! Command-line entry point for build ingestion

use build_ingest::config::{bail, Config, Context, ErrorContextExt, Result};
use build_ingest::error::IngestError;
use build_ingest::ingest::{Ingestor, Validation};
use build_ingest::metrics::IngestMetrics;
use build_ingest::publish::IndexPublisher;
use build_ingest::reconcile::Reconciler;
use build_ingest::record_store::{BuildStore, InsertOutcome, RecordStore, SledRecordStore};
use build_ingest::search::{BuildSearch, SearchIndex, TantivyBuildIndex};
use build_ingest::validation::BuildSchema;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{self, EnvFilter};
use walkdir::WalkDir;

const USAGE: &str = "\
Usage:
  build-ingest ingest <path>...         Ingest JSON files or directories of them
  build-ingest search <query> [limit]   Full-text search over indexed builds
  build-ingest reconcile [--repair]     Compare the index with the store
  build-ingest stats                    Show store and index counts
  build-ingest config                   Print the effective configuration";

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    let level = if config.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    };

    match command.as_str() {
        "ingest" => {
            if args.len() < 2 {
                bail!("ingest needs at least one path\n\n{}", USAGE);
            }
            let paths: Vec<PathBuf> = args[1..].iter().map(PathBuf::from).collect();
            run_ingest(&config, &paths).await
        }
        "search" => {
            let Some(query) = args.get(1) else {
                bail!("search needs a query\n\n{}", USAGE);
            };
            let limit = match args.get(2) {
                Some(limit) => limit.parse::<usize>().context("limit must be a number")?,
                None => 10,
            };
            run_search(&config, query, limit)
        }
        "reconcile" => run_reconcile(&config, args.iter().any(|a| a == "--repair")).await,
        "stats" => run_stats(&config).await,
        "config" => {
            config.print_summary();
            Ok(())
        }
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    }
}

fn open_store(config: &Config) -> Result<Arc<SledRecordStore>> {
    let path = config.records_dir();
    let store = SledRecordStore::open(&path).file_context(&path)?;
    Ok(Arc::new(store))
}

fn open_index(config: &Config) -> Result<Arc<TantivyBuildIndex>> {
    let index = TantivyBuildIndex::new(config.tantivy_config())
        .file_context(&config.index_dir())?;
    Ok(Arc::new(index))
}

fn load_schema(config: &Config) -> Result<BuildSchema> {
    match &config.schema_path {
        Some(path) => BuildSchema::load(path).file_context(path),
        None => BuildSchema::builtin().context("Built-in build schema is invalid"),
    }
}

async fn run_ingest(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let schema = Arc::new(load_schema(config)?);
    let metrics = Arc::new(IngestMetrics::new());
    let store = BuildStore::with_metrics(open_store(config)?, config.insert_strategy, metrics.clone());
    let publisher = IndexPublisher::with_metrics(open_index(config)?, config.retry_policy(), metrics.clone());
    let ingestor = Ingestor::new(schema, store, publisher, metrics.clone());

    let files = collect_json_files(paths)?;
    tracing::info!("Ingesting {} JSON files", files.len());

    for file in &files {
        if let Err(e) = ingest_file(&ingestor, file).await {
            tracing::error!("{:#}", e);
        }
    }

    metrics.snapshot().print_summary();
    Ok(())
}

async fn ingest_file(ingestor: &Ingestor, path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(path).file_context(path)?;
    let value: Value = serde_json::from_str(&contents).file_context(path)?;
    let source = path.display().to_string();

    match value {
        Value::Array(documents) => {
            let report = ingestor
                .ingest_batch(documents, Validation::Enforce)
                .await
                .ingest_context(&source)?;
            println!(
                "{}: {} received, {} created, {} skipped, {} published",
                source,
                report.received,
                report.created,
                report.skipped(),
                report.published
            );
        }
        document => match ingestor.ingest(document).await {
            Ok(InsertOutcome::Created(record)) => {
                println!("{}: created record {} ({})", source, record.id, record.hash)
            }
            Ok(InsertOutcome::Skipped { hash }) => println!("{}: already stored ({})", source, hash),
            Err(e @ IngestError::Index { .. }) => {
                println!("{}: stored, not yet searchable ({})", source, e)
            }
            Err(e) => return Err(e).ingest_context(&source),
        },
    }
    Ok(())
}

/// Expand directories to the `*.json` files beneath them
fn collect_json_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
                let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
                let is_json = entry.path().extension().is_some_and(|ext| ext == "json");
                if entry.file_type().is_file() && is_json {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("No such file or directory: {}", path.display());
        }
    }
    Ok(files)
}

fn run_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    let index = open_index(config)?;
    let hits = BuildSearch::from_index(&index)
        .search(query, limit)
        .search_context(query)?;

    if hits.is_empty() {
        println!("No builds match '{}'", query);
        return Ok(());
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!("{}. [{:.3}] record {} {}", rank + 1, hit.score, hit.record_id, hit.hash);
        println!("   {}", hit.document);
    }
    Ok(())
}

async fn run_reconcile(config: &Config, repair: bool) -> Result<()> {
    let store = open_store(config)?;
    let publisher = IndexPublisher::new(open_index(config)?, config.retry_policy());
    let reconciler = Reconciler::new(store, publisher);

    let report = reconciler.check().await?;
    report.print_summary();

    if repair && !report.is_consistent() {
        let summary = reconciler.repair(&report).await?;
        println!(
            "Republished {}, failed {}, removed {} orphaned documents",
            summary.republished, summary.failed, summary.orphans_removed
        );
    }
    Ok(())
}

async fn run_stats(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let index = open_index(config)?;

    let stored = store.count().await.context("Failed to count records")?;
    let indexed = index.indexed_ids().await.context("Failed to read index")?.len();

    println!("Stored records:  {}", stored);
    println!("Indexed records: {}", indexed);
    Ok(())
}
