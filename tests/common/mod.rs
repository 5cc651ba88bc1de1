//! Shared fixtures for integration tests
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use build_ingest::identity::{BuildHash, IdentifiedBuild};
use build_ingest::ingest::Ingestor;
use build_ingest::metrics::IngestMetrics;
use build_ingest::publish::{IndexPublisher, RetryPolicy};
use build_ingest::record_store::{
    BuildRecord, BuildStore, InsertStrategy, RecordId, RecordStore, SledRecordStore, StoreError,
};
use build_ingest::search::{IndexDocument, IndexError, SearchIndex};
use build_ingest::validation::BuildSchema;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Search index double that records writes and fails on a script
#[derive(Default)]
pub struct ScriptedIndex {
    failures: Mutex<VecDeque<IndexError>>,
    fail_always: Option<IndexError>,
    documents: Mutex<HashMap<RecordId, IndexDocument>>,
    attempts: AtomicU32,
}

impl ScriptedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `failures.len()` upserts in order, then succeed
    pub fn failing_with(failures: Vec<IndexError>) -> Self {
        Self {
            failures: Mutex::new(failures.into()),
            ..Self::default()
        }
    }

    pub fn always_failing(error: IndexError) -> Self {
        Self {
            fail_always: Some(error),
            ..Self::default()
        }
    }

    /// Upsert calls seen, successful or not
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn document_count(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    pub fn contains(&self, record_id: RecordId) -> bool {
        self.documents.lock().unwrap().contains_key(&record_id)
    }
}

#[async_trait]
impl SearchIndex for ScriptedIndex {
    async fn upsert(&self, document: &IndexDocument) -> Result<(), IndexError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.fail_always {
            return Err(error.clone());
        }
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.documents
            .lock()
            .unwrap()
            .insert(document.record_id, document.clone());
        Ok(())
    }

    async fn remove(&self, record_id: RecordId) -> Result<(), IndexError> {
        self.documents.lock().unwrap().remove(&record_id);
        Ok(())
    }

    async fn indexed_ids(&self) -> Result<HashSet<RecordId>, IndexError> {
        Ok(self.documents.lock().unwrap().keys().copied().collect())
    }
}

/// Store wrapper whose existence check never sees stored records,
/// as if another writer committed between the check and the write
pub struct StaleReadStore {
    inner: SledRecordStore,
}

impl StaleReadStore {
    pub fn new(inner: SledRecordStore) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RecordStore for StaleReadStore {
    async fn get(&self, hash: &BuildHash) -> Result<Option<BuildRecord>, StoreError> {
        self.inner.get(hash).await
    }

    async fn get_by_id(&self, id: RecordId) -> Result<Option<BuildRecord>, StoreError> {
        self.inner.get_by_id(id).await
    }

    async fn insert_unique(&self, build: IdentifiedBuild) -> Result<BuildRecord, StoreError> {
        self.inner.insert_unique(build).await
    }

    async fn existing_hashes(&self, _hashes: &[BuildHash]) -> Result<HashSet<BuildHash>, StoreError> {
        Ok(HashSet::new())
    }

    async fn insert_many(&self, builds: Vec<IdentifiedBuild>) -> Result<Vec<BuildRecord>, StoreError> {
        self.inner.insert_many(builds).await
    }

    async fn list_ids(&self) -> Result<Vec<RecordId>, StoreError> {
        self.inner.list_ids().await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.inner.count().await
    }
}

/// Store that already holds different content under a given identifier,
/// as after a digest collision
pub struct CollidingStore {
    inner: SledRecordStore,
    occupied: BuildRecord,
}

impl CollidingStore {
    /// Pretend `stored` was saved under the identifier of `incoming`
    pub fn new(incoming: &Value, stored: Value) -> Result<Self> {
        Ok(Self {
            inner: SledRecordStore::temporary()?,
            occupied: BuildRecord {
                id: 1,
                hash: BuildHash::of(incoming),
                document: stored,
                created_at: 0,
            },
        })
    }
}

#[async_trait]
impl RecordStore for CollidingStore {
    async fn get(&self, hash: &BuildHash) -> Result<Option<BuildRecord>, StoreError> {
        if *hash == self.occupied.hash {
            return Ok(Some(self.occupied.clone()));
        }
        self.inner.get(hash).await
    }

    async fn get_by_id(&self, id: RecordId) -> Result<Option<BuildRecord>, StoreError> {
        if id == self.occupied.id {
            return Ok(Some(self.occupied.clone()));
        }
        self.inner.get_by_id(id).await
    }

    async fn insert_unique(&self, build: IdentifiedBuild) -> Result<BuildRecord, StoreError> {
        if *build.hash() == self.occupied.hash {
            return Err(StoreError::UniqueViolation(build.hash().clone()));
        }
        self.inner.insert_unique(build).await
    }

    async fn existing_hashes(&self, hashes: &[BuildHash]) -> Result<HashSet<BuildHash>, StoreError> {
        let mut existing = self.inner.existing_hashes(hashes).await?;
        if hashes.contains(&self.occupied.hash) {
            existing.insert(self.occupied.hash.clone());
        }
        Ok(existing)
    }

    async fn insert_many(&self, builds: Vec<IdentifiedBuild>) -> Result<Vec<BuildRecord>, StoreError> {
        self.inner.insert_many(builds).await
    }

    async fn list_ids(&self) -> Result<Vec<RecordId>, StoreError> {
        self.inner.list_ids().await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.count().await? + 1)
    }
}

/// Retry quickly so tests do not sleep
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
}

/// On-disk store plus a scripted index, wired into an ingestor
pub struct TestEnv {
    _temp_dir: TempDir,
    pub store: Arc<SledRecordStore>,
    pub index: Arc<ScriptedIndex>,
    pub metrics: Arc<IngestMetrics>,
    pub ingestor: Ingestor,
}

impl TestEnv {
    pub fn new(schema: BuildSchema, index: ScriptedIndex, strategy: InsertStrategy) -> Result<Self> {
        Self::with_policy(schema, index, strategy, fast_retry(3))
    }

    pub fn with_policy(
        schema: BuildSchema,
        index: ScriptedIndex,
        strategy: InsertStrategy,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let store = Arc::new(SledRecordStore::open(&temp_dir.path().join("records"))?);
        let index = Arc::new(index);
        let metrics = Arc::new(IngestMetrics::new());

        let ingestor = Ingestor::new(
            Arc::new(schema),
            BuildStore::with_metrics(store.clone(), strategy, metrics.clone()),
            IndexPublisher::with_metrics(index.clone(), policy, metrics.clone()),
            metrics.clone(),
        );

        Ok(Self {
            _temp_dir: temp_dir,
            store,
            index,
            metrics,
            ingestor,
        })
    }

    /// Schema-free environment that accepts any document
    pub fn permissive() -> Result<Self> {
        Self::new(accept_all_schema(), ScriptedIndex::new(), InsertStrategy::SeekPermission)
    }
}

pub fn accept_all_schema() -> BuildSchema {
    BuildSchema::from_json_str("{}").expect("empty schema compiles")
}

pub fn firefox_build(version: &str) -> Value {
    json!({
        "build": {"id": "20171009192146", "date": "2017-10-09T19:21:46Z"},
        "source": {
            "product": "firefox",
            "repository": "https://hg.mozilla.org/releases/mozilla-beta",
            "tree": "releases/mozilla-beta",
            "revision": "3d31282ab5cc"
        },
        "target": {
            "platform": "win64",
            "os": "win",
            "locale": "en-US",
            "version": version,
            "channel": "beta"
        },
        "download": {
            "url": format!("https://archive.mozilla.org/pub/firefox/releases/{0}/win64/en-US/Firefox%20Setup%20{0}.exe", version),
            "mimetype": "application/msdos-windows",
            "size": 40005152,
            "date": "2017-10-09T21:31:11Z"
        }
    })
}
