//! sled-backed record store
//!
//! Two trees:
//! - `records`: identifier -> bincode(`StoredRecord`)
//! - `record_ids`: big-endian storage id -> identifier
//!
//! Every write runs in a transaction over both trees that first checks the
//! identifier is absent. sled transactions are serializable, so this check is
//! the uniqueness constraint: of two concurrent writers of the same identifier,
//! exactly one commits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::collections::HashSet;
use std::path::Path;

use super::error::StoreError;
use super::traits::RecordStore;
use super::{unix_now, BuildRecord, RecordId};
use crate::identity::{BuildHash, IdentifiedBuild};

const RECORDS_TREE: &str = "records";
const IDS_TREE: &str = "record_ids";

/// On-disk shape of a record
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    id: u64,
    hash: String,
    /// Document as JSON text; bincode cannot carry `serde_json::Value` directly
    document_json: String,
    created_at: u64,
}

impl StoredRecord {
    fn encode(record: &BuildRecord) -> Result<Vec<u8>, StoreError> {
        let stored = StoredRecord {
            id: record.id,
            hash: record.hash.to_string(),
            document_json: record.document.to_string(),
            created_at: record.created_at,
        };
        Ok(bincode::serialize(&stored)?)
    }

    fn decode(bytes: &[u8]) -> Result<BuildRecord, StoreError> {
        let stored: StoredRecord = bincode::deserialize(bytes)?;
        let hash = BuildHash::parse(&stored.hash)
            .ok_or_else(|| StoreError::corrupt(format!("bad identifier {:?}", stored.hash)))?;
        let document: Value = serde_json::from_str(&stored.document_json)
            .map_err(|e| StoreError::serialization(e.to_string()))?;
        Ok(BuildRecord {
            id: stored.id,
            hash,
            document,
            created_at: stored.created_at,
        })
    }
}

fn finish_transaction<T>(result: Result<T, TransactionError<StoreError>>) -> Result<T, StoreError> {
    result.map_err(|e| match e {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => err.into(),
    })
}

/// Durable record store on an embedded sled database
pub struct SledRecordStore {
    db: Db,
    records: Tree,
    ids: Tree,
}

impl SledRecordStore {
    /// Open or create a store at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        // sled only creates the final directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::backend(e.to_string()))?;
        }
        Self::from_db(sled::open(path)?)
    }

    /// In-memory store that is discarded on drop
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let records = db.open_tree(RECORDS_TREE)?;
        let ids = db.open_tree(IDS_TREE)?;
        Ok(Self { db, records, ids })
    }

    fn new_record(&self, build: IdentifiedBuild) -> Result<BuildRecord, StoreError> {
        let (hash, document) = build.into_parts();
        Ok(BuildRecord {
            id: self.db.generate_id()?,
            hash,
            document,
            created_at: unix_now(),
        })
    }

    fn decode_id(key: &[u8]) -> Result<RecordId, StoreError> {
        let bytes: [u8; 8] = key
            .try_into()
            .map_err(|_| StoreError::corrupt(format!("bad id key of {} bytes", key.len())))?;
        Ok(u64::from_be_bytes(bytes))
    }
}

#[async_trait]
impl RecordStore for SledRecordStore {
    async fn get(&self, hash: &BuildHash) -> Result<Option<BuildRecord>, StoreError> {
        match self.records.get(hash.as_bytes())? {
            Some(bytes) => Ok(Some(StoredRecord::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_by_id(&self, id: RecordId) -> Result<Option<BuildRecord>, StoreError> {
        let Some(hash) = self.ids.get(id.to_be_bytes())? else {
            return Ok(None);
        };
        match self.records.get(&hash)? {
            Some(bytes) => Ok(Some(StoredRecord::decode(&bytes)?)),
            None => Err(StoreError::corrupt(format!("id {} points at a missing record", id))),
        }
    }

    async fn exists(&self, hash: &BuildHash) -> Result<bool, StoreError> {
        Ok(self.records.contains_key(hash.as_bytes())?)
    }

    async fn insert_unique(&self, build: IdentifiedBuild) -> Result<BuildRecord, StoreError> {
        let record = self.new_record(build)?;
        let bytes = StoredRecord::encode(&record)?;
        let id_key = record.id.to_be_bytes();

        finish_transaction((&self.records, &self.ids).transaction(|(records, ids)| {
            if records.get(record.hash.as_bytes())?.is_some() {
                return Err(ConflictableTransactionError::Abort(StoreError::UniqueViolation(
                    record.hash.clone(),
                )));
            }
            records.insert(record.hash.as_bytes(), bytes.clone())?;
            ids.insert(&id_key[..], record.hash.as_bytes())?;
            Ok(())
        }))?;
        self.db.flush_async().await?;

        tracing::debug!("Stored record {} as id {}", record.hash, record.id);
        Ok(record)
    }

    async fn existing_hashes(&self, hashes: &[BuildHash]) -> Result<HashSet<BuildHash>, StoreError> {
        let mut existing = HashSet::new();
        for hash in hashes {
            if self.records.contains_key(hash.as_bytes())? {
                existing.insert(hash.clone());
            }
        }
        Ok(existing)
    }

    async fn insert_many(&self, builds: Vec<IdentifiedBuild>) -> Result<Vec<BuildRecord>, StoreError> {
        if builds.is_empty() {
            return Ok(Vec::new());
        }

        let mut rows = Vec::with_capacity(builds.len());
        for build in builds {
            let record = self.new_record(build)?;
            let bytes = StoredRecord::encode(&record)?;
            rows.push((record, bytes));
        }

        finish_transaction((&self.records, &self.ids).transaction(|(records, ids)| {
            for (record, bytes) in &rows {
                if records.get(record.hash.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::UniqueViolation(
                        record.hash.clone(),
                    )));
                }
                records.insert(record.hash.as_bytes(), bytes.clone())?;
                ids.insert(&record.id.to_be_bytes()[..], record.hash.as_bytes())?;
            }
            Ok(())
        }))?;
        self.db.flush_async().await?;

        tracing::debug!("Stored {} records in one batch", rows.len());
        Ok(rows.into_iter().map(|(record, _)| record).collect())
    }

    async fn list_ids(&self) -> Result<Vec<RecordId>, StoreError> {
        let mut ids = Vec::with_capacity(self.ids.len());
        for key in self.ids.iter().keys() {
            ids.push(Self::decode_id(&key?)?);
        }
        Ok(ids)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_insert_and_get() -> Result<(), Box<dyn std::error::Error>> {
        let store = SledRecordStore::temporary()?;
        let build = IdentifiedBuild::new(json!({"id": "abc", "version": "1.0"}));
        let hash = build.hash().clone();

        let record = store.insert_unique(build).await?;
        assert_eq!(record.hash, hash);

        let fetched = store.get(&hash).await?.unwrap();
        assert_eq!(fetched, record);
        assert_eq!(store.get_by_id(record.id).await?.unwrap(), record);
        assert!(store.exists(&hash).await?);
        assert_eq!(store.count().await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_insert_unique_rejects_duplicate() -> Result<(), Box<dyn std::error::Error>> {
        let store = SledRecordStore::temporary()?;
        store.insert_unique(IdentifiedBuild::new(json!({"id": "abc"}))).await?;

        let err = store
            .insert_unique(IdentifiedBuild::new(json!({"id": "abc"})))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(store.count().await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_insert_many_is_all_or_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let store = SledRecordStore::temporary()?;
        store.insert_unique(IdentifiedBuild::new(json!({"id": "b"}))).await?;

        let err = store
            .insert_many(vec![
                IdentifiedBuild::new(json!({"id": "a"})),
                IdentifiedBuild::new(json!({"id": "b"})),
            ])
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        // "a" was not written either
        assert_eq!(store.count().await?, 1);
        assert!(!store.exists(&BuildHash::of(&json!({"id": "a"}))).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_existing_hashes() -> Result<(), Box<dyn std::error::Error>> {
        let store = SledRecordStore::temporary()?;
        let stored = store.insert_unique(IdentifiedBuild::new(json!({"id": "a"}))).await?;
        let missing = BuildHash::of(&json!({"id": "z"}));

        let existing = store
            .existing_hashes(&[stored.hash.clone(), missing.clone()])
            .await?;
        assert!(existing.contains(&stored.hash));
        assert!(!existing.contains(&missing));

        Ok(())
    }

    #[tokio::test]
    async fn test_list_ids_ascending() -> Result<(), Box<dyn std::error::Error>> {
        let store = SledRecordStore::temporary()?;
        let records = store
            .insert_many(vec![
                IdentifiedBuild::new(json!({"id": 1})),
                IdentifiedBuild::new(json!({"id": 2})),
                IdentifiedBuild::new(json!({"id": 3})),
            ])
            .await?;

        let ids = store.list_ids().await?;
        let mut expected: Vec<RecordId> = records.iter().map(|r| r.id).collect();
        expected.sort();
        assert_eq!(ids, expected);

        Ok(())
    }

    #[tokio::test]
    async fn test_persistence() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("records");
        let doc = json!({"id": "abc", "version": "1.0"});

        let created_at = {
            let store = SledRecordStore::open(&path)?;
            store.insert_unique(IdentifiedBuild::new(doc.clone())).await?.created_at
        };

        let store = SledRecordStore::open(&path)?;
        let record = store.get(&BuildHash::of(&doc)).await?.unwrap();
        assert_eq!(record.document, doc);
        assert_eq!(record.created_at, created_at);

        Ok(())
    }
}
