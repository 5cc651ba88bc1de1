//! Configuration management with environment variable support

pub mod errors;

pub use errors::{anyhow, bail, Context, Error, ErrorContextExt, Result};

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::publish::RetryPolicy;
use crate::record_store::InsertStrategy;
use crate::search::TantivyConfig;

/// Ingestion configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the record store and search index
    pub data_dir: PathBuf,
    /// Schema file; `None` uses the built-in build schema
    pub schema_path: Option<PathBuf>,
    /// How single inserts detect duplicates
    pub insert_strategy: InsertStrategy,
    /// Publish attempts per record (including the first)
    pub retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Cap on a single retry delay in milliseconds
    pub retry_max_delay_ms: u64,
    /// Tantivy memory budget per thread in MB
    pub index_memory_mb: usize,
    /// Tantivy indexing threads (0 = auto)
    pub index_threads: usize,
    /// Enable debug logging
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            schema_path: None,
            insert_strategy: InsertStrategy::SeekPermission,
            retry_attempts: 3,
            retry_delay_ms: 100,
            retry_max_delay_ms: 2_000,
            index_memory_mb: 50,
            index_threads: 0, // Auto-detect
            debug: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - BUILD_INGEST_DATA_DIR: Data directory (default: platform data dir)
    /// - BUILD_INGEST_SCHEMA: JSON schema file (default: built-in schema)
    /// - BUILD_INGEST_INSERT_STRATEGY: `permission` or `forgiveness` (default: permission)
    /// - BUILD_INGEST_RETRY_ATTEMPTS: Publish attempts (default: 3)
    /// - BUILD_INGEST_RETRY_DELAY_MS: Initial retry delay in ms (default: 100)
    /// - BUILD_INGEST_RETRY_MAX_DELAY_MS: Max single retry delay in ms (default: 2000)
    /// - BUILD_INGEST_INDEX_MEMORY_MB: Tantivy memory per thread (default: 50)
    /// - BUILD_INGEST_INDEX_THREADS: Tantivy threads (default: 0 for auto)
    /// - BUILD_INGEST_DEBUG: Enable debug logging (default: false)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("BUILD_INGEST_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(path) = env::var("BUILD_INGEST_SCHEMA") {
            config.schema_path = Some(PathBuf::from(path));
        }

        if let Ok(strategy) = env::var("BUILD_INGEST_INSERT_STRATEGY") {
            match strategy.parse() {
                Ok(strategy) => config.insert_strategy = strategy,
                Err(e) => tracing::warn!("Ignoring BUILD_INGEST_INSERT_STRATEGY: {}", e),
            }
        }

        if let Ok(attempts) = env::var("BUILD_INGEST_RETRY_ATTEMPTS") {
            if let Ok(num) = attempts.parse::<u32>() {
                config.retry_attempts = num.max(1);
            }
        }

        if let Ok(delay) = env::var("BUILD_INGEST_RETRY_DELAY_MS") {
            if let Ok(ms) = delay.parse::<u64>() {
                config.retry_delay_ms = ms;
            }
        }

        if let Ok(delay) = env::var("BUILD_INGEST_RETRY_MAX_DELAY_MS") {
            if let Ok(ms) = delay.parse::<u64>() {
                config.retry_max_delay_ms = ms;
            }
        }

        if let Ok(memory) = env::var("BUILD_INGEST_INDEX_MEMORY_MB") {
            if let Ok(mb) = memory.parse::<usize>() {
                config.index_memory_mb = mb;
            }
        }

        if let Ok(threads) = env::var("BUILD_INGEST_INDEX_THREADS") {
            if let Ok(num) = threads.parse::<usize>() {
                config.index_threads = num;
            }
        }

        if let Ok(debug) = env::var("BUILD_INGEST_DEBUG") {
            config.debug = debug.eq_ignore_ascii_case("true") || debug == "1";
        }

        config
    }

    /// Get the record store directory
    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("records")
    }

    /// Get the Tantivy index directory
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    /// Backoff schedule for publishing
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }

    /// Tantivy settings; auto thread count is capped at 4
    pub fn tantivy_config(&self) -> TantivyConfig {
        let num_threads = if self.index_threads == 0 {
            num_cpus::get().clamp(1, 4)
        } else {
            self.index_threads
        };
        TantivyConfig {
            index_path: self.index_dir(),
            // Tantivy refuses less than 15MB per thread
            memory_budget_mb: self.index_memory_mb.max(15),
            num_threads,
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("\n=== Configuration ===");
        println!("Data Directory:  {}", self.data_dir.display());
        println!(
            "Schema:          {}",
            self.schema_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in".to_string())
        );
        println!("Insert Strategy: {:?}", self.insert_strategy);
        println!("Retry Attempts:  {}", self.retry_attempts);
        println!("Retry Delay:     {}ms (max {}ms)", self.retry_delay_ms, self.retry_max_delay_ms);
        println!("Index Memory:    {} MB/thread", self.index_memory_mb);
        println!("Index Threads:   {}", if self.index_threads == 0 { "auto".to_string() } else { self.index_threads.to_string() });
        println!("Debug:           {}", self.debug);
        println!("====================\n");
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("org", "build-ingest", "build-ingest") {
        dirs.data_dir().to_path_buf()
    } else {
        // Fallback to current directory
        PathBuf::from("./data")
    }
}
