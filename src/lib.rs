//! Build Ingest - content-addressed storage and search for build records
//!
//! Library modules for the ingestion pipeline: documents are validated,
//! identified by a hash of their canonical content, stored at most once and
//! then published to a full-text index.

pub mod config;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod metrics;
pub mod publish;
pub mod reconcile;
pub mod record_store;
pub mod search;
pub mod validation;

pub use error::IngestError;
pub use identity::{BuildHash, IdentifiedBuild};
pub use ingest::{BatchReport, Ingestor, Validation};
pub use record_store::{BuildRecord, BuildStore, InsertOutcome, InsertStrategy};
pub use validation::{BuildSchema, ValidationError};
