//! Build record storage with content deduplication
//!
//! [`BuildStore`] implements insert-if-absent (single and bulk) on top of any
//! [`RecordStore`] backend. The backend's uniqueness constraint is the final
//! arbiter of "one record per identifier"; the strategies here only decide how
//! cheaply duplicates are detected.

pub mod error;
pub mod sled_store;
pub mod traits;

pub use error::StoreError;
pub use sled_store::SledRecordStore;
pub use traits::RecordStore;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::IngestError;
use crate::identity::{canonical_json, BuildHash, IdentifiedBuild};
use crate::metrics::IngestMetrics;
use crate::validation::{BuildSchema, ValidationError};

/// Storage-internal identity of a record, distinct from its content identifier
pub type RecordId = u64;

/// A stored build. Write-once: nothing updates or deletes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: RecordId,
    pub hash: BuildHash,
    pub document: Value,
    /// Unix timestamp (seconds) of the first successful insert
    pub created_at: u64,
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// How single inserts avoid surfacing uniqueness conflicts
///
/// Both are correct; they differ only in cost. Duplicates dominate when
/// previously seen builds are re-ingested, which favours checking first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertStrategy {
    /// Look the identifier up, insert only if absent. A writer that loses the
    /// race in between still hits the backend's constraint and is skipped.
    #[default]
    SeekPermission,
    /// Insert unconditionally and treat a uniqueness violation as "skipped".
    SeekForgiveness,
}

impl FromStr for InsertStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "permission" | "seek-permission" => Ok(Self::SeekPermission),
            "forgiveness" | "seek-forgiveness" => Ok(Self::SeekForgiveness),
            other => Err(format!("unknown insert strategy '{}'", other)),
        }
    }
}

/// Result of a single insert-if-absent
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// A new record was stored
    Created(BuildRecord),
    /// Identical content was already stored; nothing was written
    Skipped { hash: BuildHash },
}

impl InsertOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, InsertOutcome::Created(_))
    }

    pub fn hash(&self) -> &BuildHash {
        match self {
            InsertOutcome::Created(record) => &record.hash,
            InsertOutcome::Skipped { hash } => hash,
        }
    }
}

/// Deduplicating front of a [`RecordStore`]
#[derive(Clone)]
pub struct BuildStore {
    backend: Arc<dyn RecordStore>,
    strategy: InsertStrategy,
    metrics: Arc<IngestMetrics>,
}

impl BuildStore {
    pub fn new(backend: Arc<dyn RecordStore>, strategy: InsertStrategy) -> Self {
        Self::with_metrics(backend, strategy, Arc::new(IngestMetrics::new()))
    }

    pub fn with_metrics(
        backend: Arc<dyn RecordStore>,
        strategy: InsertStrategy,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            backend,
            strategy,
            metrics,
        }
    }

    pub fn backend(&self) -> &Arc<dyn RecordStore> {
        &self.backend
    }

    pub fn strategy(&self) -> InsertStrategy {
        self.strategy
    }

    pub fn metrics(&self) -> &Arc<IngestMetrics> {
        &self.metrics
    }

    /// Validate (when a schema is given), identify and insert one document
    pub async fn insert(
        &self,
        document: Value,
        schema: Option<&BuildSchema>,
    ) -> Result<InsertOutcome, IngestError> {
        if let Some(schema) = schema {
            if let Err(e) = schema.validate(&document) {
                self.metrics.record_rejected();
                return Err(e.into());
            }
        }
        Ok(self.insert_if_absent(IdentifiedBuild::new(document)).await?)
    }

    /// Store `build` unless a record with the same identifier exists
    ///
    /// A duplicate is reported as [`InsertOutcome::Skipped`], never as an error,
    /// including when a concurrent writer stored the same content first.
    pub async fn insert_if_absent(&self, build: IdentifiedBuild) -> Result<InsertOutcome, StoreError> {
        let outcome = match self.strategy {
            InsertStrategy::SeekPermission => {
                if let Some(existing) = self.backend.get(build.hash()).await? {
                    self.check_collision(&existing, build.document());
                    InsertOutcome::Skipped {
                        hash: existing.hash,
                    }
                } else {
                    self.insert_or_skip(build).await?
                }
            }
            InsertStrategy::SeekForgiveness => self.insert_or_skip(build).await?,
        };

        match &outcome {
            InsertOutcome::Created(record) => {
                self.metrics.record_created(1);
                tracing::info!("Created build record {} ({})", record.id, record.hash);
            }
            InsertOutcome::Skipped { hash } => {
                self.metrics.record_skipped(1);
                tracing::debug!("Skipped duplicate build {}", hash);
            }
        }
        Ok(outcome)
    }

    async fn insert_or_skip(&self, build: IdentifiedBuild) -> Result<InsertOutcome, StoreError> {
        let hash = build.hash().clone();
        let document = build.document().clone();
        match self.backend.insert_unique(build).await {
            Ok(record) => Ok(InsertOutcome::Created(record)),
            Err(StoreError::UniqueViolation(_)) => {
                if let Some(existing) = self.backend.get(&hash).await? {
                    self.check_collision(&existing, &document);
                }
                Ok(InsertOutcome::Skipped { hash })
            }
            Err(e) => Err(e),
        }
    }

    /// Log (never overwrite) when stored content differs under the same identifier
    fn check_collision(&self, existing: &BuildRecord, candidate: &Value) {
        if canonical_json(&existing.document) != canonical_json(candidate) {
            self.metrics.record_collision();
            tracing::error!(
                "Hash collision: record {} ({}) has different content than the incoming build; keeping the stored record",
                existing.id,
                existing.hash
            );
        }
    }

    /// Bulk insert-if-absent, returning how many records were created
    ///
    /// Note! Not safe against concurrent bulk calls over overlapping content:
    /// the existence check and the write are separate steps. A batch that loses
    /// such a race fails with [`IngestError::StorageConflict`] and writes nothing.
    pub async fn bulk_insert_if_absent(
        &self,
        documents: Vec<Value>,
        schema: Option<&BuildSchema>,
    ) -> Result<usize, IngestError> {
        Ok(self.bulk_insert_records(documents, schema).await?.len())
    }

    /// Bulk insert-if-absent, returning the created records
    ///
    /// 1. Validate and identify every document, collapsing duplicate content
    ///    within the batch to one candidate.
    /// 2. Ask the store once which candidates already exist and drop them.
    /// 3. Write the rest in one operation.
    ///
    /// Validation and hashing run on the rayon pool; the calling task waits for
    /// them, which is accepted for CPU-bound work of a single batch.
    pub async fn bulk_insert_records(
        &self,
        documents: Vec<Value>,
        schema: Option<&BuildSchema>,
    ) -> Result<Vec<BuildRecord>, IngestError> {
        let received = documents.len();

        let identified: Vec<IdentifiedBuild> = match schema {
            Some(schema) => documents
                .into_par_iter()
                .map(|document| -> Result<IdentifiedBuild, ValidationError> {
                    schema.validate(&document)?;
                    Ok(IdentifiedBuild::new(document))
                })
                .collect::<Result<Vec<_>, _>>()
                .inspect_err(|_| self.metrics.record_rejected())?,
            None => documents.into_par_iter().map(IdentifiedBuild::new).collect(),
        };

        let mut seen = HashSet::with_capacity(identified.len());
        let mut candidates: Vec<IdentifiedBuild> = identified
            .into_iter()
            .filter(|build| seen.insert(build.hash().clone()))
            .collect();

        let hashes: Vec<BuildHash> = candidates.iter().map(|b| b.hash().clone()).collect();
        let existing = self.backend.existing_hashes(&hashes).await?;
        candidates.retain(|build| !existing.contains(build.hash()));

        let created = if candidates.is_empty() {
            Vec::new()
        } else {
            self.backend.insert_many(candidates).await?
        };

        self.metrics.record_created(created.len() as u64);
        self.metrics
            .record_skipped((received - created.len()) as u64);
        tracing::info!(
            "Bulk insert: {} received, {} distinct, {} already stored, {} created",
            received,
            hashes.len(),
            existing.len(),
            created.len()
        );
        Ok(created)
    }

    pub async fn get(&self, hash: &BuildHash) -> Result<Option<BuildRecord>, StoreError> {
        self.backend.get(hash).await
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        self.backend.count().await
    }
}
