//! Propagation of stored records to the search index
//!
//! Publishing happens after the store write has committed, so a failure here
//! never un-stores anything. Transient index failures are retried on a bounded
//! backoff; permanent rejections fail at once.

pub mod retry;

pub use retry::{retry_with_backoff, RetryPolicy};

use std::sync::Arc;

use crate::metrics::IngestMetrics;
use crate::record_store::BuildRecord;
use crate::search::{IndexDocument, IndexError, SearchIndex};

/// Writes build records to a [`SearchIndex`] with retry
#[derive(Clone)]
pub struct IndexPublisher {
    index: Arc<dyn SearchIndex>,
    policy: RetryPolicy,
    metrics: Arc<IngestMetrics>,
}

impl IndexPublisher {
    pub fn new(index: Arc<dyn SearchIndex>, policy: RetryPolicy) -> Self {
        Self::with_metrics(index, policy, Arc::new(IngestMetrics::new()))
    }

    pub fn with_metrics(
        index: Arc<dyn SearchIndex>,
        policy: RetryPolicy,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            index,
            policy,
            metrics,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    /// Publish one record, retrying transient failures
    ///
    /// Safe to call more than once for the same record: the index keeps one
    /// entry per record id.
    pub async fn publish(&self, record: &BuildRecord) -> Result<(), IndexError> {
        let document = IndexDocument::from_record(record);

        let result = retry_with_backoff(
            &self.policy,
            |attempt| {
                if attempt > 1 {
                    self.metrics.record_publish_retry();
                }
                self.index.upsert(&document)
            },
            IndexError::is_transient,
        )
        .await;

        match &result {
            Ok(()) => {
                self.metrics.record_published();
                tracing::debug!("Published record {} ({})", record.id, record.hash);
            }
            Err(e) => {
                self.metrics.record_publish_failure();
                tracing::error!(
                    "Record {} ({}) is stored but could not be indexed: {}",
                    record.id,
                    record.hash,
                    e
                );
            }
        }
        result
    }
}
