//! Caller-facing error type for ingestion
//!
//! Duplicates never show up here: a duplicate insert is a normal outcome.
//! `Storage` vs `Index` tells "nothing was stored" apart from "stored but not
//! searchable yet".

use crate::identity::BuildHash;
use crate::record_store::{RecordId, StoreError};
use crate::search::IndexError;
use crate::validation::ValidationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Document rejected before hashing or storage; retrying needs a changed document
    #[error(transparent)]
    SchemaViolation(#[from] ValidationError),

    /// A uniqueness violation escaped to the application layer
    ///
    /// Only expected on the bulk path when two overlapping batches race; the
    /// caller must serialize bulk ingestion or handle this explicitly.
    #[error("Storage conflict on {hash}: record already exists")]
    StorageConflict { hash: BuildHash },

    /// The record store failed; nothing from this attempt is guaranteed stored
    #[error("Record store failed: {0}")]
    Storage(#[source] StoreError),

    /// Publishing failed after retries; the record stays stored
    #[error("Record {record_id} ({hash}) stored but not indexed: {source}")]
    Index {
        record_id: RecordId,
        hash: BuildHash,
        #[source]
        source: IndexError,
    },
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(hash) => IngestError::StorageConflict { hash },
            other => IngestError::Storage(other),
        }
    }
}

impl IngestError {
    /// True when the record is durably stored despite the error
    pub fn is_stored(&self) -> bool {
        matches!(self, IngestError::Index { .. })
    }
}
