//! Record store backend trait definition
//!
//! The primitives a storage engine must offer. Dedup logic lives above this
//! trait in [`super::BuildStore`]; backends only have to enforce uniqueness.

use async_trait::async_trait;
use std::collections::HashSet;

use super::error::StoreError;
use super::{BuildRecord, RecordId};
use crate::identity::{BuildHash, IdentifiedBuild};

/// Trait for record storage backends
///
/// Implementations must be Send + Sync for use with async runtimes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record by content identifier
    async fn get(&self, hash: &BuildHash) -> Result<Option<BuildRecord>, StoreError>;

    /// Fetch a record by storage id
    async fn get_by_id(&self, id: RecordId) -> Result<Option<BuildRecord>, StoreError>;

    /// Whether a record with this identifier exists
    async fn exists(&self, hash: &BuildHash) -> Result<bool, StoreError> {
        Ok(self.get(hash).await?.is_some())
    }

    /// Insert one record under the uniqueness constraint
    ///
    /// Must fail with [`StoreError::UniqueViolation`] when the identifier is
    /// already present, including when another writer got there first.
    async fn insert_unique(&self, build: IdentifiedBuild) -> Result<BuildRecord, StoreError>;

    /// Subset of `hashes` already present, in a single query
    async fn existing_hashes(&self, hashes: &[BuildHash]) -> Result<HashSet<BuildHash>, StoreError>;

    /// Insert many records in one operation
    ///
    /// All or nothing: if any identifier already exists the whole write fails
    /// with [`StoreError::UniqueViolation`].
    async fn insert_many(&self, builds: Vec<IdentifiedBuild>) -> Result<Vec<BuildRecord>, StoreError>;

    /// All storage ids, ascending
    async fn list_ids(&self) -> Result<Vec<RecordId>, StoreError>;

    /// Number of stored records
    async fn count(&self) -> Result<usize, StoreError>;
}
