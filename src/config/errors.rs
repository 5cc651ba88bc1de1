//! Error handling utilities for application glue
//!
//! Library components return typed errors (`IngestError`, `StoreError`,
//! `IndexError`); the CLI and reconciliation wrap them with anyhow context.

pub use anyhow::{anyhow, bail, Context, Error, Result};

/// Error context builders for common operations
pub trait ErrorContextExt<T> {
    /// Add ingestion context
    fn ingest_context(self, source: &str) -> Result<T>;

    /// Add search operation context
    fn search_context(self, query: &str) -> Result<T>;

    /// Add file operation context
    fn file_context(self, path: &std::path::Path) -> Result<T>;
}

impl<T, E> ErrorContextExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn ingest_context(self, source: &str) -> Result<T> {
        self.with_context(|| format!("Ingestion failed: {}", source))
    }

    fn search_context(self, query: &str) -> Result<T> {
        self.with_context(|| format!("Search operation failed for query: {}", query))
    }

    fn file_context(self, path: &std::path::Path) -> Result<T> {
        self.with_context(|| format!("File operation failed: {}", path.display()))
    }
}
