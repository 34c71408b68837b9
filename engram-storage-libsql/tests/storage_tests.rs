//! Round-trip tests for the libSQL metadata backend.

use chrono::Utc;
use engram_core::metadata::{MetadataFilter, MetadataStore};
use engram_core::types::{
    AuditEvent, Chunk, ChunkState, ChunkType, ConflictRecord, ConflictSeverity, Difficulty,
    Outcome, Pattern, PatternStatus, PatternType, Provenance, Session, SessionStatus, Visibility,
};
use engram_storage_libsql::{LibsqlConfig, LibsqlMetadataStore};
use uuid::Uuid;

async fn open_store(dir: &tempfile::TempDir) -> LibsqlMetadataStore {
    let path = dir.path().join("engram.db");
    let store = LibsqlMetadataStore::open(path.to_str().expect("utf8 path"), LibsqlConfig::default())
        .await
        .expect("open");
    store.initialize_schema().await.expect("schema");
    store
        .ensure_project("acme/api", 8, 30)
        .await
        .expect("project");
    store
}

fn chunk(state: ChunkState) -> Chunk {
    let now = Utc::now();
    Chunk {
        id: Uuid::new_v4(),
        project_id: "acme/api".into(),
        session_id: Some("s1".into()),
        chunk_type: ChunkType::Solution,
        content: "Use connection pooling for database".into(),
        summary: "Use connection pooling".into(),
        tags: vec!["db".into(), "perf".into()],
        outcome: Outcome::Success,
        difficulty: Difficulty::Moderate,
        created_at: now,
        created_at_epoch: now.timestamp(),
        embedding: vec![0.1; 8],
        provenance: Provenance::Primary,
        related_chunks: vec![],
        parent: None,
        supersedes: None,
        visibility: Visibility::Project,
        quality: 0.8,
        confidence: 0.9,
        last_refreshed: None,
        stale: false,
        state,
        deleted_at: None,
    }
}

#[tokio::test]
async fn chunk_round_trip_preserves_every_field() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;

    let original = chunk(ChunkState::Live);
    store.insert_chunk(&original).await.expect("insert");

    let loaded = store
        .get_chunk("acme/api", original.id)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(loaded, original);
}

#[tokio::test]
async fn duplicate_chunk_key_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;
    let c = chunk(ChunkState::Live);
    store.insert_chunk(&c).await.expect("insert");
    assert!(store.insert_chunk(&c).await.is_err());
}

#[tokio::test]
async fn pending_chunks_stay_invisible_until_promoted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;

    let c = chunk(ChunkState::Pending);
    store.insert_chunk(&c).await.expect("insert");
    assert_eq!(store.count_live_chunks("acme/api").await.expect("count"), 0);
    assert!(
        store
            .list_chunks("acme/api", &MetadataFilter::default())
            .await
            .expect("list")
            .is_empty()
    );

    store
        .mark_chunk_live("acme/api", c.id)
        .await
        .expect("promote");
    assert_eq!(store.count_live_chunks("acme/api").await.expect("count"), 1);

    let loaded = store
        .get_chunk("acme/api", c.id)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(loaded.state, ChunkState::Live);
}

#[tokio::test]
async fn pending_sweep_sees_only_old_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;

    let mut old = chunk(ChunkState::Pending);
    let backdated = Utc::now() - chrono::Duration::hours(2);
    old.created_at = backdated;
    old.created_at_epoch = backdated.timestamp();
    store.insert_chunk(&old).await.expect("insert old");
    store
        .insert_chunk(&chunk(ChunkState::Pending))
        .await
        .expect("insert fresh");

    let cutoff = Utc::now() - chrono::Duration::minutes(5);
    let pending = store.list_pending_before(cutoff).await.expect("pending");
    assert_eq!(pending, vec![("acme/api".to_string(), old.id)]);

    store.remove_chunk("acme/api", old.id).await.expect("remove");
    assert!(store.list_pending_before(cutoff).await.expect("pending").is_empty());
}

#[tokio::test]
async fn soft_delete_and_purge_lifecycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;

    let c = chunk(ChunkState::Live);
    store.insert_chunk(&c).await.expect("insert");

    assert!(
        store
            .soft_delete_chunk("acme/api", c.id, Utc::now() - chrono::Duration::days(31))
            .await
            .expect("delete")
    );
    assert!(
        !store
            .soft_delete_chunk("acme/api", c.id, Utc::now())
            .await
            .expect("idempotent")
    );
    assert_eq!(store.count_live_chunks("acme/api").await.expect("count"), 0);

    let purged = store.purge_expired(Utc::now()).await.expect("purge");
    assert_eq!(purged, 1);
    assert!(
        store
            .get_chunk("acme/api", c.id)
            .await
            .expect("get")
            .is_none()
    );
}

#[tokio::test]
async fn project_dimension_is_locked_at_creation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;
    let again = store
        .ensure_project("acme/api", 1536, 90)
        .await
        .expect("ensure");
    assert_eq!(again.dimension, 8);
    assert_eq!(again.retention_days, 30);
}

#[tokio::test]
async fn invalid_project_id_is_rejected_before_sql() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;
    assert!(store.ensure_project("has space", 8, 30).await.is_err());
    assert!(store.ensure_project("", 8, 30).await.is_err());
}

#[tokio::test]
async fn session_lifecycle_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;

    let mut session = Session::start("s1".into(), "acme/api".into(), vec!["ship".into()]);
    store.insert_session(&session).await.expect("insert");

    session.status = SessionStatus::Completed;
    session.ended_at = Some(Utc::now());
    session.productivity_score = Some(0.75);
    store.update_session(&session).await.expect("update");

    let loaded = store
        .get_session("acme/api", "s1")
        .await
        .expect("get")
        .expect("present");
    assert_eq!(loaded, session);
    assert_eq!(store.list_sessions("acme/api").await.expect("list").len(), 1);
}

#[tokio::test]
async fn pattern_and_conflict_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;

    let now = Utc::now();
    let mut pattern = Pattern {
        id: Uuid::new_v4(),
        project_id: "acme/api".into(),
        pattern_type: PatternType::TypeSequence,
        signature: "problem>solution".into(),
        occurrences: 3,
        positive: 3,
        negative: 0,
        parent: None,
        status: PatternStatus::Validated,
        first_seen: now,
        last_seen: now,
    };
    store.upsert_pattern(&pattern).await.expect("insert");
    pattern.occurrences = 4;
    store.upsert_pattern(&pattern).await.expect("upsert");
    let patterns = store.list_patterns("acme/api").await.expect("list");
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].occurrences, 4);

    let mut conflict = ConflictRecord {
        id: Uuid::new_v4(),
        project_id: "acme/api".into(),
        chunk_a: Uuid::new_v4(),
        chunk_b: Uuid::new_v4(),
        severity: ConflictSeverity::Manual,
        resolution: None,
        detected_at: now,
    };
    store.insert_conflict(&conflict).await.expect("insert");
    conflict.resolution = Some("superseded".into());
    store.update_conflict(&conflict).await.expect("update");
    let conflicts = store.list_conflicts("acme/api").await.expect("list");
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].resolution.as_deref(), Some("superseded"));
}

#[tokio::test]
async fn audit_events_filter_by_resource() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;

    for (action, resource) in [
        ("store_content", "c1"),
        ("update_existing_content", "c1"),
        ("store_content", "c2"),
    ] {
        store
            .append_audit(
                &AuditEvent::now("dispatcher", action, resource).with_project("acme/api"),
            )
            .await
            .expect("append");
    }

    let all = store
        .list_audit("acme/api", None, 10)
        .await
        .expect("list all");
    assert_eq!(all.len(), 3);

    let c1_only = store
        .list_audit("acme/api", Some("c1"), 10)
        .await
        .expect("list c1");
    assert_eq!(c1_only.len(), 2);
    assert!(c1_only.iter().all(|e| e.resource == "c1"));
}
