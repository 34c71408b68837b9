//! End-to-end engine tests over in-memory backends: the store/retrieve
//! round trips, the two-step write protocol, duplicate-store collapse,
//! filter correctness, and integrity recovery.

use engram_core::audit::AuditLogger;
use engram_core::config::EngramConfig;
use engram_core::embeddings::mock::ScriptedFailure;
use engram_core::embeddings::{EmbeddingService, MockProvider};
use engram_core::engine::{MemoryEngine, OpContext, RetrieveRequest};
use engram_core::events::{EventBus, MemoryEvent};
use engram_core::intelligence::IntelligenceService;
use engram_core::metadata::{MemoryMetadataStore, MetadataStore};
use engram_core::reliability::{Dependency, ReliabilityManager};
use engram_core::types::{
    Chunk, ChunkDelta, ChunkInput, ChunkState, ChunkType, Difficulty, Outcome, Provenance,
    Visibility,
};
use engram_core::vector::{InMemoryVectorIndex, VectorMetadata, VectorStore};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Harness {
    engine: Arc<MemoryEngine>,
    intelligence: Arc<IntelligenceService>,
    provider: Arc<MockProvider>,
    vectors: Arc<InMemoryVectorIndex>,
    metadata: Arc<MemoryMetadataStore>,
}

fn test_config() -> EngramConfig {
    let mut config = EngramConfig::default();
    config.embedding.dimension = 256;
    config.embedding.fallback_grace_secs = 3600;
    config.reliability.retry.base_delay_ms = 1;
    config
}

fn harness(config: EngramConfig) -> Harness {
    let provider = Arc::new(MockProvider::new(config.embedding.dimension));
    let reliability = Arc::new(ReliabilityManager::new(&config.reliability));
    let embeddings = Arc::new(EmbeddingService::new(
        Arc::clone(&provider) as Arc<dyn engram_core::EmbeddingProvider>,
        &config.embedding,
        reliability.breaker(Dependency::Embedding),
        reliability.retry_config(),
    ));
    let vectors = Arc::new(InMemoryVectorIndex::new());
    let metadata = Arc::new(MemoryMetadataStore::new());
    let events = EventBus::default();

    let intelligence = Arc::new(IntelligenceService::new(
        config.intelligence.clone(),
        config.decay.clone(),
        Arc::clone(&metadata) as Arc<dyn MetadataStore>,
        Arc::clone(&vectors) as Arc<dyn VectorStore>,
        events.clone(),
    ));
    let engine = Arc::new(MemoryEngine::new(
        config,
        embeddings,
        Arc::clone(&vectors) as Arc<dyn VectorStore>,
        Arc::clone(&metadata) as Arc<dyn MetadataStore>,
        events,
        reliability,
        AuditLogger::disabled(),
    ));
    Harness {
        engine,
        intelligence,
        provider,
        vectors,
        metadata,
    }
}

fn input(content: &str) -> ChunkInput {
    ChunkInput {
        project_id: "acme/api".into(),
        session_id: Some("s1".into()),
        chunk_type: ChunkType::Solution,
        content: content.into(),
        summary: None,
        tags: vec!["db".into(), "perf".into()],
        outcome: Outcome::Success,
        difficulty: Difficulty::Moderate,
        supersedes: None,
        visibility: Visibility::Project,
    }
}

/// Feed the engine's created events into the intelligence layer
/// synchronously, keyed off the returned chunk ids.
async fn run_intelligence(h: &Harness, project_id: &str, chunk_ids: &[Uuid]) {
    for id in chunk_ids {
        let chunk = h
            .metadata
            .get_chunk(project_id, *id)
            .await
            .expect("get")
            .expect("chunk");
        h.intelligence
            .process_event(&MemoryEvent::Created {
                project_id: project_id.into(),
                chunk_id: *id,
                chunk_type: chunk.chunk_type,
                session_id: chunk.session_id.clone(),
            })
            .await
            .expect("process");
    }
}

// ============================================================================
// S1: store then retrieve
// ============================================================================

#[tokio::test]
async fn store_then_retrieve_finds_the_chunk() {
    let h = harness(test_config());
    let ctx = OpContext::new();

    let stored = h
        .engine
        .store(input("Use connection pooling for database"), &ctx)
        .await
        .expect("store");
    assert_eq!(stored.chunk_ids.len(), 1);
    let c1 = stored.chunk_ids[0];

    let result = h
        .engine
        .retrieve(
            RetrieveRequest {
                project_id: "acme/api".into(),
                query: "database pooling".into(),
                k: 5,
                ..Default::default()
            },
            &ctx,
        )
        .await
        .expect("retrieve");

    assert!(!result.degraded);
    let hit = result
        .items
        .iter()
        .find(|r| r.chunk.id == c1)
        .expect("c1 in results");
    assert!(
        hit.similarity >= 0.7,
        "expected similarity >= 0.7, got {}",
        hit.similarity
    );
}

// ============================================================================
// Scope enforcement (engine side of S2)
// ============================================================================

#[tokio::test]
async fn store_without_session_fails_with_invalid_scope() {
    let h = harness(test_config());
    let mut no_session = input("Use connection pooling for database");
    no_session.session_id = None;

    let err = h
        .engine
        .store(no_session, &OpContext::new())
        .await
        .expect_err("invalid scope");
    assert_eq!(err.code(), "invalid_scope");
    assert!(err.to_string().contains("session_id"));
}

#[tokio::test]
async fn project_scope_reads_exclude_session_private_chunks() {
    let h = harness(test_config());
    let ctx = OpContext::new();

    let mut private = input("Private debugging notes about connection pooling");
    private.visibility = Visibility::Session;
    h.engine.store(private, &ctx).await.expect("store private");

    let public = h
        .engine
        .store(input("Use connection pooling for database"), &ctx)
        .await
        .expect("store public");

    let project_scope = h
        .engine
        .retrieve(
            RetrieveRequest {
                project_id: "acme/api".into(),
                query: "connection pooling".into(),
                k: 10,
                ..Default::default()
            },
            &ctx,
        )
        .await
        .expect("retrieve");
    let ids: Vec<Uuid> = project_scope.items.iter().map(|r| r.chunk.id).collect();
    assert_eq!(ids, public.chunk_ids);

    let session_scope = h
        .engine
        .retrieve(
            RetrieveRequest {
                project_id: "acme/api".into(),
                session_id: Some("s1".into()),
                query: "connection pooling".into(),
                k: 10,
                ..Default::default()
            },
            &ctx,
        )
        .await
        .expect("retrieve");
    assert_eq!(session_scope.items.len(), 2);
}

// ============================================================================
// Invariant 3: C and B agree after stores and deletes
// ============================================================================

#[tokio::test]
async fn stores_and_deletes_keep_both_stores_aligned() {
    let h = harness(test_config());
    let ctx = OpContext::new();

    let stored = h
        .engine
        .store(input("Use connection pooling for database"), &ctx)
        .await
        .expect("store");
    assert_eq!(h.metadata.count_live_chunks("acme/api").await.expect("count"), 1);
    assert_eq!(h.vectors.count("acme/api").await.expect("count"), 1);

    assert!(
        h.engine
            .delete("acme/api", stored.chunk_ids[0], &ctx)
            .await
            .expect("delete")
    );
    // Vector removal is asynchronous; give the spawned task a beat.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.metadata.count_live_chunks("acme/api").await.expect("count"), 0);
    assert_eq!(h.vectors.count("acme/api").await.expect("count"), 0);
}

#[tokio::test]
async fn failed_vector_write_rolls_back_the_metadata_row() {
    // A vector store that always fails.
    struct FailingVectors;
    #[async_trait::async_trait]
    impl VectorStore for FailingVectors {
        async fn upsert(&self, _: Uuid, _: Vec<f32>, _: VectorMetadata) -> engram_core::Result<()> {
            Err(engram_core::Error::Storage("index write refused".into()))
        }
        async fn query(
            &self,
            _: &[f32],
            _: &engram_core::Filter,
            _: usize,
        ) -> engram_core::Result<Vec<engram_core::vector::Hit>> {
            Ok(vec![])
        }
        async fn delete(&self, _: Uuid) -> engram_core::Result<bool> {
            Ok(false)
        }
        async fn fetch(
            &self,
            _: Uuid,
        ) -> engram_core::Result<Option<(Vec<f32>, VectorMetadata)>> {
            Ok(None)
        }
        async fn count(&self, _: &str) -> engram_core::Result<usize> {
            Ok(0)
        }
        async fn list(&self, _: &str) -> engram_core::Result<Vec<Uuid>> {
            Ok(vec![])
        }
        async fn ping(&self) -> engram_core::Result<()> {
            Ok(())
        }
    }

    let config = test_config();
    let provider = Arc::new(MockProvider::new(config.embedding.dimension));
    let reliability = Arc::new(ReliabilityManager::new(&config.reliability));
    let embeddings = Arc::new(EmbeddingService::new(
        provider as Arc<dyn engram_core::EmbeddingProvider>,
        &config.embedding,
        reliability.breaker(Dependency::Embedding),
        reliability.retry_config(),
    ));
    let metadata = Arc::new(MemoryMetadataStore::new());
    let engine = MemoryEngine::new(
        config,
        embeddings,
        Arc::new(FailingVectors),
        Arc::clone(&metadata) as Arc<dyn MetadataStore>,
        EventBus::default(),
        reliability,
        AuditLogger::disabled(),
    );

    let err = engine
        .store(input("Use connection pooling for database"), &OpContext::new())
        .await
        .expect_err("vector write fails");
    assert_eq!(err.code(), "storage");
    assert_eq!(
        metadata.count_live_chunks("acme/api").await.expect("count"),
        0
    );
    // The pending row was rolled back, not left behind.
    let pending = metadata
        .list_pending_before(chrono::Utc::now() + chrono::Duration::hours(1))
        .await
        .expect("pending");
    assert!(pending.is_empty());
}

// ============================================================================
// Invariant 5: concurrent duplicate stores collapse
// ============================================================================

#[tokio::test]
async fn concurrent_duplicate_stores_yield_one_chunk() {
    let h = harness(test_config());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&h.engine);
        handles.push(tokio::spawn(async move {
            engine
                .store(
                    input("Use connection pooling for database"),
                    &OpContext::new(),
                )
                .await
        }));
    }

    let mut all_ids = Vec::new();
    for handle in handles {
        let stored = handle.await.expect("join").expect("store");
        all_ids.push(stored.chunk_ids);
    }
    let first = &all_ids[0];
    assert!(all_ids.iter().all(|ids| ids == first));
    assert_eq!(h.metadata.count_live_chunks("acme/api").await.expect("count"), 1);
}

// ============================================================================
// Round trips and idempotence
// ============================================================================

#[tokio::test]
async fn store_then_get_by_id_returns_equal_chunk() {
    let h = harness(test_config());
    let ctx = OpContext::new();
    let original = input("Use connection pooling for database");
    let stored = h.engine.store(original.clone(), &ctx).await.expect("store");

    let chunk = h
        .engine
        .get_chunk("acme/api", stored.chunk_ids[0], Some("s1"))
        .await
        .expect("get");
    assert_eq!(chunk.content, original.content);
    assert_eq!(chunk.tags[..2], ["db".to_string(), "perf".to_string()]);
    assert_eq!(chunk.chunk_type, original.chunk_type);
    assert_eq!(chunk.session_id.as_deref(), Some("s1"));
    assert_eq!(chunk.state, ChunkState::Live);
}

#[tokio::test]
async fn store_delete_get_returns_not_found() {
    let h = harness(test_config());
    let ctx = OpContext::new();
    let stored = h
        .engine
        .store(input("Use connection pooling for database"), &ctx)
        .await
        .expect("store");
    let id = stored.chunk_ids[0];

    h.engine.delete("acme/api", id, &ctx).await.expect("delete");
    let err = h
        .engine
        .get_chunk("acme/api", id, Some("s1"))
        .await
        .expect_err("gone");
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn deleting_twice_succeeds_without_side_effects() {
    let h = harness(test_config());
    let ctx = OpContext::new();
    let stored = h
        .engine
        .store(input("Use connection pooling for database"), &ctx)
        .await
        .expect("store");
    let id = stored.chunk_ids[0];

    assert!(h.engine.delete("acme/api", id, &ctx).await.expect("first"));
    assert!(!h.engine.delete("acme/api", id, &ctx).await.expect("second"));
    // Deleting a chunk that never existed is also fine.
    assert!(
        !h.engine
            .delete("acme/api", Uuid::new_v4(), &ctx)
            .await
            .expect("absent")
    );
}

#[tokio::test]
async fn empty_delta_update_is_a_no_op_and_does_not_re_embed() {
    let h = harness(test_config());
    let ctx = OpContext::new();
    let stored = h
        .engine
        .store(input("Use connection pooling for database"), &ctx)
        .await
        .expect("store");
    let calls_before = h.provider.calls();

    let chunk = h
        .engine
        .update(
            "acme/api",
            stored.chunk_ids[0],
            ChunkDelta::default(),
            Some("s1"),
            &ctx,
        )
        .await
        .expect("update");
    assert_eq!(chunk.content, "Use connection pooling for database");
    assert_eq!(h.provider.calls(), calls_before);
}

#[tokio::test]
async fn content_update_re_embeds_and_updates_the_vector() {
    let h = harness(test_config());
    let ctx = OpContext::new();
    let stored = h
        .engine
        .store(input("Use connection pooling for database"), &ctx)
        .await
        .expect("store");
    let id = stored.chunk_ids[0];
    let calls_before = h.provider.calls();

    let updated = h
        .engine
        .update(
            "acme/api",
            id,
            ChunkDelta {
                content: Some("Adopt pgbouncer in transaction mode for the database".into()),
                outcome: Some(Outcome::Success),
                ..Default::default()
            },
            Some("s1"),
            &ctx,
        )
        .await
        .expect("update");
    assert!(h.provider.calls() > calls_before);

    let (vector, _) = h.vectors.fetch(id).await.expect("fetch").expect("present");
    assert_eq!(vector, updated.embedding);
}

#[tokio::test]
async fn export_import_preserves_cardinality_and_content() {
    let h = harness(test_config());
    let ctx = OpContext::new();
    for content in [
        "Use connection pooling for database",
        "Index the sessions table on project and epoch",
        "Cache embedding results keyed by content hash",
    ] {
        h.engine.store(input(content), &ctx).await.expect("store");
    }

    let export = h.engine.export_project("acme/api").await.expect("export");
    assert_eq!(export.chunks.len(), 3);

    let target = harness(test_config());
    let imported = target
        .engine
        .import_project("acme/fresh", export.clone(), &ctx)
        .await
        .expect("import");
    assert_eq!(imported, 3);

    let imported_chunks = target
        .engine
        .export_project("acme/fresh")
        .await
        .expect("re-export")
        .chunks;
    assert_eq!(imported_chunks.len(), export.chunks.len());
    for original in &export.chunks {
        let copied = imported_chunks
            .iter()
            .find(|c| c.id == original.id)
            .expect("chunk imported");
        assert_eq!(copied.content, original.content);
        assert_eq!(copied.tags, original.tags);
    }
}

// ============================================================================
// Boundary behaviour: chunking length policy through the engine
// ============================================================================

#[tokio::test]
async fn content_below_minimum_defers_and_at_minimum_stores() {
    let h = harness(test_config());
    let ctx = OpContext::new();
    let min = h.engine.config().chunking.min_content_length;

    let deferred = h
        .engine
        .store(input(&"x".repeat(min - 1)), &ctx)
        .await
        .expect("store");
    assert!(deferred.deferred);
    assert!(deferred.chunk_ids.is_empty());

    let stored = h
        .engine
        .store(input(&"x".repeat(min)), &ctx)
        .await
        .expect("store");
    assert!(!stored.deferred);
    assert_eq!(stored.chunk_ids.len(), 1);
}

#[tokio::test]
async fn overlong_content_splits_into_linked_siblings() {
    let mut config = test_config();
    config.chunking.max_content_length = 120;
    let h = harness(config);
    let ctx = OpContext::new();

    let content = "The retry budget was exhausted during rollout. ".repeat(6);
    let content = content.trim().to_string();
    let stored = h.engine.store(input(&content), &ctx).await.expect("store");
    assert!(stored.chunk_ids.len() >= 2);

    let mut rejoined = String::new();
    for (i, id) in stored.chunk_ids.iter().enumerate() {
        let chunk = h
            .engine
            .get_chunk("acme/api", *id, Some("s1"))
            .await
            .expect("get");
        if i == 0 {
            assert!(chunk.parent.is_none());
        } else {
            assert_eq!(chunk.parent, Some(stored.chunk_ids[0]));
        }
        assert_eq!(chunk.session_id.as_deref(), Some("s1"));
        rejoined.push_str(&chunk.content);
    }
    assert_eq!(rejoined, content);
}

// ============================================================================
// S5: epoch range filters
// ============================================================================

#[tokio::test]
async fn epoch_filter_returns_exactly_the_recent_chunks() {
    let h = harness(test_config());
    let ctx = OpContext::new();
    let now = chrono::Utc::now();

    // Store three chunks, then backdate them to T-10d, T-3d, T-1d.
    let mut ids = Vec::new();
    for (content, days) in [
        ("Old fix for database pooling exhaustion", 10),
        ("Recent tuning of database pooling limits", 3),
        ("Latest database pooling dashboard notes", 1),
    ] {
        let stored = h.engine.store(input(content), &ctx).await.expect("store");
        let id = stored.chunk_ids[0];
        let mut chunk = h
            .metadata
            .get_chunk("acme/api", id)
            .await
            .expect("get")
            .expect("chunk");
        let backdated = now - chrono::Duration::days(days);
        chunk.created_at = backdated;
        chunk.created_at_epoch = backdated.timestamp();
        h.metadata.update_chunk(&chunk).await.expect("backdate");
        h.vectors
            .upsert(
                id,
                chunk.embedding.clone(),
                VectorMetadata {
                    project_id: chunk.project_id.clone(),
                    session_id: chunk.session_id.clone(),
                    chunk_type: chunk.chunk_type,
                    timestamp_epoch: chunk.created_at_epoch,
                    tags: chunk.tags.clone(),
                    visibility: chunk.visibility,
                },
            )
            .await
            .expect("reindex");
        ids.push(id);
    }

    let cutoff = (now - chrono::Duration::days(7)).timestamp();
    let result = h
        .engine
        .retrieve(
            RetrieveRequest {
                project_id: "acme/api".into(),
                query: "database pooling".into(),
                k: 10,
                epoch_gt: Some(cutoff),
                ..Default::default()
            },
            &ctx,
        )
        .await
        .expect("retrieve");

    let returned: std::collections::HashSet<Uuid> =
        result.items.iter().map(|r| r.chunk.id).collect();
    assert_eq!(returned.len(), 2);
    assert!(returned.contains(&ids[1]));
    assert!(returned.contains(&ids[2]));
    assert!(!returned.contains(&ids[0]));
}

// ============================================================================
// Invariant 6: ranking stability
// ============================================================================

#[tokio::test]
async fn identical_queries_return_identical_orderings() {
    let h = harness(test_config());
    let ctx = OpContext::new();
    for content in [
        "Use connection pooling for database",
        "Pool database connections with a semaphore",
        "Database pooling reduces tail latency",
        "Unrelated note about frontend routing",
    ] {
        h.engine.store(input(content), &ctx).await.expect("store");
    }

    let request = RetrieveRequest {
        project_id: "acme/api".into(),
        query: "database pooling".into(),
        k: 10,
        ..Default::default()
    };
    let first = h.engine.retrieve(request.clone(), &ctx).await.expect("a");
    let second = h.engine.retrieve(request, &ctx).await.expect("b");
    let order_a: Vec<Uuid> = first.items.iter().map(|r| r.chunk.id).collect();
    let order_b: Vec<Uuid> = second.items.iter().map(|r| r.chunk.id).collect();
    assert_eq!(order_a, order_b);
}

// ============================================================================
// S6: integrity recovery
// ============================================================================

#[tokio::test]
async fn integrity_check_rebuilds_a_corrupted_vector() {
    let h = harness(test_config());
    let ctx = OpContext::new();
    let stored = h
        .engine
        .store(input("Use connection pooling for database"), &ctx)
        .await
        .expect("store");
    let id = stored.chunk_ids[0];

    // Simulate index corruption: drop the vector behind the engine's back.
    assert!(h.vectors.delete(id).await.expect("corrupt"));

    let report = h
        .engine
        .validate_integrity("acme/api", true, &ctx)
        .await
        .expect("repair");
    assert!(!report.consistent);
    assert_eq!(report.rebuilt, 1);

    let result = h
        .engine
        .retrieve(
            RetrieveRequest {
                project_id: "acme/api".into(),
                query: "database pooling".into(),
                k: 5,
                ..Default::default()
            },
            &ctx,
        )
        .await
        .expect("retrieve");
    let hit = result
        .items
        .iter()
        .find(|r| r.chunk.id == id)
        .expect("recovered chunk");
    assert!(hit.similarity >= 0.7);
}

// ============================================================================
// Degraded retrieval via fallback embeddings
// ============================================================================

#[tokio::test]
async fn open_breaker_past_grace_degrades_retrieval_instead_of_failing() {
    let mut config = test_config();
    config.embedding.fallback_grace_secs = 0;
    let h = harness(config);
    let ctx = OpContext::new();

    h.engine
        .store(input("Use connection pooling for database"), &ctx)
        .await
        .expect("store");

    // Drive the embedding breaker open.
    h.provider.fail_next(20, ScriptedFailure::Transient);
    for i in 0..4 {
        let _ = h
            .engine
            .retrieve(
                RetrieveRequest {
                    project_id: "acme/api".into(),
                    query: format!("warmup query {i}"),
                    k: 3,
                    ..Default::default()
                },
                &ctx,
            )
            .await;
    }

    let result = h
        .engine
        .retrieve(
            RetrieveRequest {
                project_id: "acme/api".into(),
                query: "database pooling fallback".into(),
                k: 3,
                ..Default::default()
            },
            &ctx,
        )
        .await
        .expect("degraded retrieve");
    assert!(result.degraded);
    assert!(result.degraded_reason.is_some());
}

// ============================================================================
// Find similar
// ============================================================================

#[tokio::test]
async fn find_similar_excludes_the_reference_chunk() {
    let h = harness(test_config());
    let ctx = OpContext::new();
    let a = h
        .engine
        .store(input("Use connection pooling for database"), &ctx)
        .await
        .expect("store");
    h.engine
        .store(input("Pool database connections with a semaphore"), &ctx)
        .await
        .expect("store");

    let similar = h
        .engine
        .find_similar("acme/api", a.chunk_ids[0], 5, Some("s1".into()), &ctx)
        .await
        .expect("find similar");
    assert!(!similar.is_empty());
    assert!(similar.iter().all(|r| r.chunk.id != a.chunk_ids[0]));
}

// ============================================================================
// Deadline and cancellation
// ============================================================================

#[tokio::test]
async fn expired_deadline_fails_fast() {
    let h = harness(test_config());
    let ctx = OpContext::with_deadline(Duration::from_millis(0));
    tokio::time::sleep(Duration::from_millis(5)).await;

    let err = h
        .engine
        .store(input("Use connection pooling for database"), &ctx)
        .await
        .expect_err("deadline");
    assert_eq!(err.code(), "deadline");
}

#[tokio::test]
async fn cancellation_returns_cancelled() {
    let h = harness(test_config());
    let (cancel, ctx) = OpContext::cancellable();
    cancel.send(true).expect("cancel");

    let err = h
        .engine
        .retrieve(
            RetrieveRequest {
                project_id: "acme/api".into(),
                query: "anything".into(),
                k: 1,
                ..Default::default()
            },
            &ctx,
        )
        .await
        .expect_err("cancelled");
    assert_eq!(err.code(), "cancelled");
}

// ============================================================================
// Event replay idempotence (via intelligence)
// ============================================================================

#[tokio::test]
async fn replaying_created_events_does_not_duplicate_patterns() {
    let h = harness(test_config());
    let ctx = OpContext::new();
    let stored = h
        .engine
        .store(input("Use connection pooling for database"), &ctx)
        .await
        .expect("store");

    run_intelligence(&h, "acme/api", &stored.chunk_ids).await;
    let occurrences_after_first: Vec<u32> = h
        .intelligence
        .patterns("acme/api")
        .iter()
        .map(|p| p.occurrences)
        .collect();

    run_intelligence(&h, "acme/api", &stored.chunk_ids).await;
    let occurrences_after_replay: Vec<u32> = h
        .intelligence
        .patterns("acme/api")
        .iter()
        .map(|p| p.occurrences)
        .collect();
    assert_eq!(occurrences_after_first, occurrences_after_replay);
}

// ============================================================================
// Sweeper
// ============================================================================

#[tokio::test]
async fn sweeper_rolls_back_stale_pending_rows() {
    let h = harness(test_config());

    // Hand-craft an orphaned pending row, as a crashed two-step write
    // would leave behind.
    h.metadata
        .ensure_project("acme/api", 256, 30)
        .await
        .expect("project");
    let old = chrono::Utc::now() - chrono::Duration::hours(1);
    let orphan = Chunk {
        id: Uuid::new_v4(),
        project_id: "acme/api".into(),
        session_id: Some("s1".into()),
        chunk_type: ChunkType::Solution,
        content: "orphaned pending row".into(),
        summary: String::new(),
        tags: vec![],
        outcome: Outcome::InProgress,
        difficulty: Difficulty::Simple,
        created_at: old,
        created_at_epoch: old.timestamp(),
        embedding: vec![0.0; 256],
        provenance: Provenance::Primary,
        related_chunks: vec![],
        parent: None,
        supersedes: None,
        visibility: Visibility::Project,
        quality: 0.5,
        confidence: 0.5,
        last_refreshed: None,
        stale: false,
        state: ChunkState::Pending,
        deleted_at: None,
    };
    h.metadata.insert_chunk(&orphan).await.expect("insert");

    let report = h.engine.sweep_once().await.expect("sweep");
    assert_eq!(report.rolled_back, 1);
    assert!(
        h.metadata
            .get_chunk("acme/api", orphan.id)
            .await
            .expect("get")
            .is_none()
    );
}
