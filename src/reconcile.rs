//! Reconciliation of the search index against the record store
//!
//! The store is the source of truth. Records can be missing from the index
//! when publishing exhausted its retries or a batch was stored with deferred
//! indexing; `repair` republishes them.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::publish::IndexPublisher;
use crate::record_store::{RecordId, RecordStore};
use crate::search::SearchIndex;

/// Results from a reconciliation check
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Number of records in the store
    pub stored_count: usize,
    /// Number of documents in the index
    pub indexed_count: usize,
    /// Stored records with no index document
    pub missing_from_index: Vec<RecordId>,
    /// Index documents with no stored record
    pub orphaned_in_index: Vec<RecordId>,
}

impl ReconcileReport {
    /// Whether the index matches the store exactly
    pub fn is_consistent(&self) -> bool {
        self.missing_from_index.is_empty() && self.orphaned_in_index.is_empty()
    }

    /// Print a human-readable summary
    pub fn print_summary(&self) {
        println!("\n=== Index Reconciliation Report ===");
        println!("Stored records:  {}", self.stored_count);
        println!("Indexed records: {}", self.indexed_count);

        if self.is_consistent() {
            println!("✓ Index is CONSISTENT with the store");
        } else {
            println!("✗ Index is INCONSISTENT with the store");
            print_ids("Missing from index", &self.missing_from_index);
            print_ids("Orphaned in index", &self.orphaned_in_index);
        }
        println!("===================================\n");
    }
}

fn print_ids(label: &str, ids: &[RecordId]) {
    if ids.is_empty() {
        return;
    }
    println!("\n{}: {} records", label, ids.len());
    if ids.len() > 10 {
        println!("  (showing first 10)");
    }
    for id in ids.iter().take(10) {
        println!("  - {}", id);
    }
}

/// Outcome of a repair pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairSummary {
    pub republished: usize,
    pub failed: usize,
    pub orphans_removed: usize,
}

/// Compares and repairs store/index consistency
pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    publisher: IndexPublisher,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RecordStore>, publisher: IndexPublisher) -> Self {
        Self { store, publisher }
    }

    fn index(&self) -> &Arc<dyn SearchIndex> {
        self.publisher.index()
    }

    /// Check which records are missing from (or orphaned in) the index
    pub async fn check(&self) -> Result<ReconcileReport> {
        tracing::info!("Starting reconciliation check...");

        let stored_ids = self.store.list_ids().await.context("Failed to list stored records")?;
        let indexed_ids = self
            .index()
            .indexed_ids()
            .await
            .context("Failed to list indexed records")?;

        let missing_from_index: Vec<RecordId> = stored_ids
            .iter()
            .copied()
            .filter(|id| !indexed_ids.contains(id))
            .collect();

        let stored: std::collections::HashSet<RecordId> = stored_ids.iter().copied().collect();
        let mut orphaned_in_index: Vec<RecordId> = indexed_ids
            .iter()
            .copied()
            .filter(|id| !stored.contains(id))
            .collect();
        orphaned_in_index.sort_unstable();

        let report = ReconcileReport {
            stored_count: stored_ids.len(),
            indexed_count: indexed_ids.len(),
            missing_from_index,
            orphaned_in_index,
        };

        tracing::info!(
            "Reconciliation check complete: {} ({} missing, {} orphaned)",
            if report.is_consistent() { "OK" } else { "DRIFT" },
            report.missing_from_index.len(),
            report.orphaned_in_index.len()
        );
        Ok(report)
    }

    /// Republish missing records and drop orphaned index documents
    ///
    /// A record that still fails to publish is counted and skipped; the next
    /// run picks it up again.
    pub async fn repair(&self, report: &ReconcileReport) -> Result<RepairSummary> {
        let mut summary = RepairSummary::default();

        for &id in &report.missing_from_index {
            let Some(record) = self
                .store
                .get_by_id(id)
                .await
                .with_context(|| format!("Failed to load record {}", id))?
            else {
                tracing::warn!("Record {} disappeared before it could be republished", id);
                continue;
            };

            match self.publisher.publish(&record).await {
                Ok(()) => summary.republished += 1,
                Err(e) => {
                    tracing::warn!("Record {} still not indexed: {}", id, e);
                    summary.failed += 1;
                }
            }
        }

        for &id in &report.orphaned_in_index {
            self.index()
                .remove(id)
                .await
                .with_context(|| format!("Failed to remove orphaned index document {}", id))?;
            summary.orphans_removed += 1;
        }

        tracing::info!(
            "Repair complete: {} republished, {} failed, {} orphans removed",
            summary.republished,
            summary.failed,
            summary.orphans_removed
        );
        Ok(summary)
    }
}
