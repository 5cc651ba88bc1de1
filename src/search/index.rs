//! Search index collaborator and its Tantivy implementation
//!
//! The index only has to offer upsert-by-id: writing the same record twice
//! leaves one logical entry. Tantivy has no native upsert, so each write
//! deletes by `record_id` and adds the new document in the same commit.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tantivy::collector::DocSetCollector;
use tantivy::query::AllQuery;
use tantivy::schema::Value as _;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use super::error::IndexError;
use super::schema::BuildIndexSchema;
use crate::identity::BuildHash;
use crate::record_store::{BuildRecord, RecordId};

/// Search-side view of a stored record
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub record_id: RecordId,
    pub build_hash: BuildHash,
    pub build: Value,
    pub created_at: u64,
}

impl IndexDocument {
    /// Convert a stored record, keyed by its storage id
    pub fn from_record(record: &BuildRecord) -> Self {
        Self {
            record_id: record.id,
            build_hash: record.hash.clone(),
            build: record.document.clone(),
            created_at: record.created_at,
        }
    }

    /// All scalar leaves of the document, space separated
    pub fn body(&self) -> String {
        let mut parts = Vec::new();
        collect_leaves(&self.build, &mut parts);
        parts.join(" ")
    }

    /// Field-name keyed JSON accepted by `TantivyDocument::parse_json`
    fn to_tantivy_json(&self) -> Value {
        // JSON fields only take objects
        let build = match &self.build {
            Value::Object(_) => self.build.clone(),
            other => json!({ "value": other }),
        };
        json!({
            "record_id": self.record_id,
            "build_hash": self.build_hash.as_str(),
            "build": build,
            "build_json": self.build.to_string(),
            "body": self.body(),
            "created_at": self.created_at,
        })
    }
}

fn collect_leaves(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push(s.clone()),
        Value::Bool(_) | Value::Number(_) => out.push(value.to_string()),
        Value::Array(items) => items.iter().for_each(|item| collect_leaves(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_leaves(item, out)),
    }
}

/// Trait for search index backends
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Write a document, replacing any previous one with the same record id
    async fn upsert(&self, document: &IndexDocument) -> Result<(), IndexError>;

    /// Remove the document for a record id, if any
    async fn remove(&self, record_id: RecordId) -> Result<(), IndexError>;

    /// Record ids currently searchable
    async fn indexed_ids(&self) -> Result<HashSet<RecordId>, IndexError>;
}

/// Configuration for TantivyBuildIndex
#[derive(Debug, Clone)]
pub struct TantivyConfig {
    /// Path to Tantivy index directory
    pub index_path: PathBuf,
    /// Memory budget in MB per thread
    pub memory_budget_mb: usize,
    /// Number of threads for indexing
    pub num_threads: usize,
}

impl TantivyConfig {
    /// Create default configuration
    pub fn default(index_path: &Path) -> Self {
        Self {
            index_path: index_path.to_path_buf(),
            memory_budget_mb: 50,
            num_threads: 1,
        }
    }
}

/// Tantivy-backed build index
pub struct TantivyBuildIndex {
    index: Index,
    writer: Arc<Mutex<IndexWriter>>,
    reader: IndexReader,
    schema: BuildIndexSchema,
}

impl TantivyBuildIndex {
    /// Open or create an index on disk
    pub fn new(config: TantivyConfig) -> Result<Self, IndexError> {
        let schema = BuildIndexSchema::new();

        let index = if config.index_path.join("meta.json").exists() {
            Index::open_in_dir(&config.index_path)?
        } else {
            std::fs::create_dir_all(&config.index_path)
                .map_err(|e| IndexError::permanent(format!("cannot create index directory: {}", e)))?;
            Index::create_in_dir(&config.index_path, schema.schema())?
        };

        let num_threads = config.num_threads.max(1);
        let total_memory_budget = config.memory_budget_mb * num_threads * 1024 * 1024;

        tracing::info!(
            "Tantivy configured at {}: {}MB total budget, {} threads",
            config.index_path.display(),
            config.memory_budget_mb * num_threads,
            num_threads
        );

        Self::from_index(index, schema, num_threads, total_memory_budget)
    }

    /// Index held in RAM, discarded on drop
    pub fn in_memory() -> Result<Self, IndexError> {
        let schema = BuildIndexSchema::new();
        let index = Index::create_in_ram(schema.schema());
        Self::from_index(index, schema, 1, 50 * 1024 * 1024)
    }

    fn from_index(
        index: Index,
        schema: BuildIndexSchema,
        num_threads: usize,
        memory_budget: usize,
    ) -> Result<Self, IndexError> {
        let writer = index.writer_with_num_threads(num_threads, memory_budget)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            writer: Arc::new(Mutex::new(writer)),
            reader,
            schema,
        })
    }

    fn id_term(&self, record_id: RecordId) -> Term {
        Term::from_field_u64(self.schema.record_id, record_id)
    }

    /// Apply `op` and commit on a blocking thread
    ///
    /// Any failure rolls the writer back, so a delete never lands without the
    /// add that should follow it.
    async fn write<F>(&self, op: F) -> Result<(), IndexError>
    where
        F: FnOnce(&mut IndexWriter) -> Result<(), IndexError> + Send + 'static,
    {
        let writer = Arc::clone(&self.writer);
        let reader = self.reader.clone();

        tokio::task::spawn_blocking(move || {
            let mut writer = writer
                .lock()
                .map_err(|_| IndexError::permanent("index writer lock poisoned"))?;

            let result = op(&mut *writer).and_then(|()| {
                writer.commit()?;
                Ok(())
            });
            if let Err(e) = result {
                if let Err(rollback_err) = writer.rollback() {
                    tracing::warn!("Failed to rollback Tantivy writer: {}", rollback_err);
                }
                return Err(e);
            }

            reader.reload()?;
            Ok(())
        })
        .await
        .map_err(|e| IndexError::transient(format!("index writer task failed: {}", e)))?
    }

    /// Get reference to the Tantivy index
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Get reference to the schema
    pub fn schema(&self) -> &BuildIndexSchema {
        &self.schema
    }

    pub fn reader(&self) -> &IndexReader {
        &self.reader
    }
}

#[async_trait]
impl SearchIndex for TantivyBuildIndex {
    async fn upsert(&self, document: &IndexDocument) -> Result<(), IndexError> {
        let doc = TantivyDocument::parse_json(&self.schema.schema, &document.to_tantivy_json().to_string())
            .map_err(|e| IndexError::permanent(format!("record {}: {}", document.record_id, e)))?;

        let term = self.id_term(document.record_id);
        self.write(move |writer| {
            writer.delete_term(term);
            writer.add_document(doc)?;
            Ok(())
        })
        .await?;

        tracing::debug!("Indexed record {} ({})", document.record_id, document.build_hash);
        Ok(())
    }

    async fn remove(&self, record_id: RecordId) -> Result<(), IndexError> {
        let term = self.id_term(record_id);
        self.write(move |writer| {
            writer.delete_term(term);
            Ok(())
        })
        .await?;

        tracing::debug!("Removed record {} from index", record_id);
        Ok(())
    }

    async fn indexed_ids(&self) -> Result<HashSet<RecordId>, IndexError> {
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let addresses = searcher.search(&AllQuery, &DocSetCollector)?;

        let mut ids = HashSet::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = searcher.doc(address)?;
            if let Some(id) = doc.get_first(self.schema.record_id).and_then(|v| v.as_u64()) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }
}

impl Drop for TantivyBuildIndex {
    fn drop(&mut self) {
        // Release the directory lock with nothing half-written
        if let Ok(mut writer) = self.writer.lock() {
            if let Err(e) = writer.rollback() {
                tracing::warn!("Failed to rollback Tantivy writer during drop: {}", e);
            }
        }
    }
}
