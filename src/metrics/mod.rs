//! Ingestion counters
//!
//! Lock-free counters shared by the store, publisher and coordinator. A
//! [`MetricsSnapshot`] is a plain copy for reporting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters collected during ingestion
#[derive(Debug, Default)]
pub struct IngestMetrics {
    received: AtomicU64,
    rejected: AtomicU64,
    created: AtomicU64,
    skipped: AtomicU64,
    collisions: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
    publish_retries: AtomicU64,
}

/// Point-in-time copy of [`IngestMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub rejected: u64,
    pub created: u64,
    pub skipped: u64,
    pub collisions: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub publish_retries: u64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, n: u64) {
        self.received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_created(&self, n: u64) {
        self.created.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, n: u64) {
        self.skipped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_collision(&self) {
        self.collisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_retry(&self) {
        self.publish_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            publish_retries: self.publish_retries.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Share of received documents that produced a new record
    pub fn creation_rate(&self) -> f64 {
        if self.received == 0 {
            return 0.0;
        }
        self.created as f64 / self.received as f64
    }

    /// Print a summary of the counters
    pub fn print_summary(&self) {
        println!("\n=== Ingestion Metrics ===");
        println!("Received:   {}", self.received);
        println!("Rejected:   {}", self.rejected);
        println!("Created:    {} ({:.1}%)", self.created, self.creation_rate() * 100.0);
        println!("Skipped:    {}", self.skipped);
        println!("Published:  {} ({} retries)", self.published, self.publish_retries);
        if self.publish_failures > 0 {
            println!("Publish failures: {}", self.publish_failures);
        }
        if self.collisions > 0 {
            println!("Hash collisions:  {}", self.collisions);
        }
        println!("=========================\n");
    }
}
