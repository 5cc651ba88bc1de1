//! Ingestion coordinator
//!
//! Single documents go validate -> identify -> insert-if-absent -> publish,
//! and publish only follows a record that was actually created. Batches go
//! through the bulk dedup path; the records it created are published one by
//! one afterwards, or left for `reconcile` with [`Ingestor::ingest_batch_deferred`].

use serde_json::Value;
use std::sync::Arc;

use crate::error::IngestError;
use crate::identity::IdentifiedBuild;
use crate::metrics::IngestMetrics;
use crate::publish::IndexPublisher;
use crate::record_store::{BuildRecord, BuildStore, InsertOutcome, RecordId};
use crate::search::IndexError;
use crate::validation::BuildSchema;

/// Whether batch documents are validated before storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validation {
    #[default]
    Enforce,
    /// Trust the caller (e.g. re-importing records that were validated before)
    Skip,
}

/// Summary of one batch
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Documents in the batch
    pub received: usize,
    /// Records newly stored
    pub created: usize,
    /// Created records now searchable
    pub published: usize,
    /// Created records that are stored but failed to publish
    pub publish_failures: Vec<(RecordId, IndexError)>,
}

impl BatchReport {
    /// Documents that were duplicates, within the batch or of stored records
    pub fn skipped(&self) -> usize {
        self.received - self.created
    }

    pub fn is_fully_indexed(&self) -> bool {
        self.publish_failures.is_empty()
    }
}

/// Orchestrates storage and indexing of build documents
pub struct Ingestor {
    schema: Arc<BuildSchema>,
    store: BuildStore,
    publisher: IndexPublisher,
    metrics: Arc<IngestMetrics>,
}

impl Ingestor {
    /// `schema` is loaded once by the caller and shared read-only
    pub fn new(
        schema: Arc<BuildSchema>,
        store: BuildStore,
        publisher: IndexPublisher,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            schema,
            store,
            publisher,
            metrics,
        }
    }

    pub fn store(&self) -> &BuildStore {
        &self.store
    }

    pub fn publisher(&self) -> &IndexPublisher {
        &self.publisher
    }

    pub fn metrics(&self) -> &Arc<IngestMetrics> {
        &self.metrics
    }

    /// Ingest one document
    ///
    /// Returns `Skipped` for content that is already stored. On
    /// [`IngestError::Index`] the record is stored but not yet searchable.
    pub async fn ingest(&self, document: Value) -> Result<InsertOutcome, IngestError> {
        self.metrics.record_received(1);

        if let Err(e) = self.schema.validate(&document) {
            self.metrics.record_rejected();
            tracing::warn!("Rejected build document: {}", e);
            return Err(e.into());
        }

        let build = IdentifiedBuild::new(document);
        let outcome = self.store.insert_if_absent(build).await?;

        if let InsertOutcome::Created(record) = &outcome {
            self.publish(record).await?;
        }
        Ok(outcome)
    }

    /// Ingest a batch and publish every record it created
    ///
    /// Publish failures do not stop the batch; they are listed in the report
    /// and the records can be republished by reconciliation. Bulk ingestion of
    /// overlapping content must not run concurrently (see
    /// [`BuildStore::bulk_insert_if_absent`]).
    pub async fn ingest_batch(
        &self,
        documents: Vec<Value>,
        validation: Validation,
    ) -> Result<BatchReport, IngestError> {
        let received = documents.len();
        let created = self.store_batch(documents, validation).await?;

        let mut report = BatchReport {
            received,
            created: created.len(),
            ..Default::default()
        };
        for record in &created {
            match self.publisher.publish(record).await {
                Ok(()) => report.published += 1,
                Err(e) => report.publish_failures.push((record.id, e)),
            }
        }

        if !report.is_fully_indexed() {
            tracing::warn!(
                "{} of {} new records were stored but not indexed",
                report.publish_failures.len(),
                report.created
            );
        }
        Ok(report)
    }

    /// Store a batch without publishing; returns the created count
    pub async fn ingest_batch_deferred(
        &self,
        documents: Vec<Value>,
        validation: Validation,
    ) -> Result<usize, IngestError> {
        Ok(self.store_batch(documents, validation).await?.len())
    }

    async fn store_batch(
        &self,
        documents: Vec<Value>,
        validation: Validation,
    ) -> Result<Vec<BuildRecord>, IngestError> {
        self.metrics.record_received(documents.len() as u64);
        let schema = match validation {
            Validation::Enforce => Some(self.schema.as_ref()),
            Validation::Skip => None,
        };
        self.store.bulk_insert_records(documents, schema).await
    }

    async fn publish(&self, record: &BuildRecord) -> Result<(), IngestError> {
        self.publisher
            .publish(record)
            .await
            .map_err(|source| IngestError::Index {
                record_id: record.id,
                hash: record.hash.clone(),
                source,
            })
    }
}
