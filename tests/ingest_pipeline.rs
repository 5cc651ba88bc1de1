//! Integration tests for single-document ingestion
//!
//! These tests verify that:
//! 1. Identical content is stored once, whatever its key order
//! 2. Invalid documents are rejected before anything is stored or indexed
//! 3. Publishing happens exactly once, and only for created records
//! 4. Concurrent inserts of the same content create one record under both strategies
//! 5. Different content under an existing identifier is counted, never overwritten
//! 6. Ingested builds are searchable through the Tantivy index

mod common;

use anyhow::Result;
use build_ingest::error::IngestError;
use build_ingest::ingest::Ingestor;
use build_ingest::identity::BuildHash;
use build_ingest::metrics::IngestMetrics;
use build_ingest::publish::IndexPublisher;
use build_ingest::record_store::{BuildStore, InsertOutcome, InsertStrategy, RecordStore, SledRecordStore};
use build_ingest::search::{BuildSearch, TantivyBuildIndex, TantivyConfig};
use build_ingest::validation::BuildSchema;
use common::{fast_retry, firefox_build, CollidingStore, ScriptedIndex, TestEnv};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_same_content_stored_once() -> Result<()> {
    let env = TestEnv::permissive()?;

    let first = env.ingestor.ingest(json!({"id": "abc", "version": "1.0"})).await?;
    assert!(first.is_created());

    let second = env.ingestor.ingest(json!({"version": "1.0", "id": "abc"})).await?;
    assert!(matches!(second, InsertOutcome::Skipped { .. }));
    assert_eq!(first.hash(), second.hash());

    assert_eq!(env.store.count().await?, 1);
    assert_eq!(env.index.document_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_hash_is_v1_prefixed() -> Result<()> {
    let env = TestEnv::permissive()?;

    let outcome = env.ingestor.ingest(json!({"id": "abc"})).await?;
    let hash = outcome.hash().as_str();
    assert!(hash.starts_with("v1:"));
    assert!(BuildHash::parse(hash).is_some());
    Ok(())
}

#[tokio::test]
async fn test_invalid_document_not_stored() -> Result<()> {
    let env = TestEnv::new(
        BuildSchema::builtin()?,
        ScriptedIndex::new(),
        InsertStrategy::SeekPermission,
    )?;

    let mut document = firefox_build("57.0b7");
    document["download"]["size"] = json!("forty megabytes");

    let err = env.ingestor.ingest(document).await.unwrap_err();
    assert!(matches!(err, IngestError::SchemaViolation(_)));
    assert!(!err.is_stored());

    assert_eq!(env.store.count().await?, 0);
    assert_eq!(env.index.attempts(), 0);
    assert_eq!(env.metrics.snapshot().rejected, 1);
    Ok(())
}

#[tokio::test]
async fn test_publish_only_on_create() -> Result<()> {
    let env = TestEnv::new(
        BuildSchema::builtin()?,
        ScriptedIndex::new(),
        InsertStrategy::SeekForgiveness,
    )?;

    for _ in 0..3 {
        env.ingestor.ingest(firefox_build("57.0b7")).await?;
    }
    env.ingestor.ingest(firefox_build("57.0b8")).await?;

    assert_eq!(env.store.count().await?, 2);
    assert_eq!(env.index.attempts(), 2);

    let snapshot = env.metrics.snapshot();
    assert_eq!(snapshot.received, 4);
    assert_eq!(snapshot.created, 2);
    assert_eq!(snapshot.skipped, 2);
    assert_eq!(snapshot.published, 2);
    assert_eq!(snapshot.collisions, 0);
    Ok(())
}

async fn concurrent_inserts(strategy: InsertStrategy) -> Result<()> {
    let temp_dir = TempDir::new()?;
    let backend = Arc::new(SledRecordStore::open(&temp_dir.path().join("records"))?);
    let index = Arc::new(ScriptedIndex::new());
    let metrics = Arc::new(IngestMetrics::new());
    let ingestor = Arc::new(Ingestor::new(
        Arc::new(common::accept_all_schema()),
        BuildStore::with_metrics(backend.clone(), strategy, metrics.clone()),
        IndexPublisher::with_metrics(index.clone(), fast_retry(3), metrics.clone()),
        metrics.clone(),
    ));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let ingestor = Arc::clone(&ingestor);
            tokio::spawn(async move { ingestor.ingest(json!({"id": "abc", "version": "1.0"})).await })
        })
        .collect();

    let mut created = 0;
    for result in futures::future::join_all(handles).await {
        if result??.is_created() {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(backend.count().await?, 1);
    assert_eq!(index.attempts(), 1);
    assert_eq!(metrics.snapshot().skipped, 15);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_seek_permission() -> Result<()> {
    concurrent_inserts(InsertStrategy::SeekPermission).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_seek_forgiveness() -> Result<()> {
    concurrent_inserts(InsertStrategy::SeekForgiveness).await
}

async fn colliding_insert(strategy: InsertStrategy) -> Result<()> {
    let incoming = json!({"id": "abc", "version": "2.0"});
    let stored = json!({"id": "abc", "version": "1.0"});
    let backend = Arc::new(CollidingStore::new(&incoming, stored.clone())?);
    let index = Arc::new(ScriptedIndex::new());
    let metrics = Arc::new(IngestMetrics::new());
    let ingestor = Ingestor::new(
        Arc::new(common::accept_all_schema()),
        BuildStore::with_metrics(backend.clone(), strategy, metrics.clone()),
        IndexPublisher::with_metrics(index.clone(), fast_retry(3), metrics.clone()),
        metrics.clone(),
    );

    let outcome = ingestor.ingest(incoming.clone()).await?;
    assert_eq!(
        outcome,
        InsertOutcome::Skipped {
            hash: BuildHash::of(&incoming)
        }
    );

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.collisions, 1);
    assert_eq!(snapshot.created, 0);
    assert_eq!(index.attempts(), 0);

    let kept = backend.get(&BuildHash::of(&incoming)).await?.expect("stored record kept");
    assert_eq!(kept.document, stored);
    assert_eq!(backend.count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_collision_keeps_stored_record_seek_permission() -> Result<()> {
    colliding_insert(InsertStrategy::SeekPermission).await
}

#[tokio::test]
async fn test_collision_keeps_stored_record_seek_forgiveness() -> Result<()> {
    colliding_insert(InsertStrategy::SeekForgiveness).await
}

#[tokio::test]
async fn test_ingested_build_is_searchable() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let backend = Arc::new(SledRecordStore::open(&temp_dir.path().join("records"))?);
    let index = Arc::new(TantivyBuildIndex::new(TantivyConfig::default(
        &temp_dir.path().join("index"),
    ))?);
    let metrics = Arc::new(IngestMetrics::new());
    let ingestor = Ingestor::new(
        Arc::new(BuildSchema::builtin()?),
        BuildStore::with_metrics(backend, InsertStrategy::SeekPermission, metrics.clone()),
        IndexPublisher::with_metrics(index.clone(), fast_retry(3), metrics.clone()),
        metrics,
    );

    let InsertOutcome::Created(record) = ingestor.ingest(firefox_build("57.0b7")).await? else {
        panic!("expected a new record");
    };
    ingestor.ingest(firefox_build("57.0b7")).await?;

    let hits = BuildSearch::from_index(&index).search("firefox", 10)?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record_id, record.id);
    assert_eq!(hits[0].hash, record.hash);
    assert_eq!(hits[0].document, firefox_build("57.0b7"));
    Ok(())
}
