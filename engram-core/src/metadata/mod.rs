//! Durable record of chunks, sessions, projects, and derived entities.
//!
//! The trait models the two-step write protocol directly: chunks are
//! inserted `pending`, promoted to `live` once the vector write lands, and
//! removed on rollback. Readers ignore `pending` rows and tombstones.

mod memory;

pub use memory::MemoryMetadataStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{AuditEvent, Chunk, ChunkType, ConflictRecord, Pattern, Project, Session};
use crate::vector::SessionFilter;

/// Filter for metadata listings; the same predicate family as the vector
/// filter, minus similarity.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub session: SessionFilter,
    pub chunk_type: Option<ChunkType>,
    pub tags_any: Vec<String>,
    pub epoch_gt: Option<i64>,
    pub epoch_lt: Option<i64>,
    pub include_deleted: bool,
    pub only_stale: bool,
    pub limit: Option<usize>,
}

impl MetadataFilter {
    /// Apply the row-level predicate to one chunk.
    #[must_use]
    pub fn matches(&self, chunk: &Chunk) -> bool {
        use crate::types::{ChunkState, Visibility};

        if chunk.state != ChunkState::Live {
            return false;
        }
        if !self.include_deleted && chunk.deleted_at.is_some() {
            return false;
        }
        let visible = match (&self.session, chunk.visibility) {
            (SessionFilter::Any, _) | (_, Visibility::Project) => true,
            (SessionFilter::Public, Visibility::Session) => false,
            (SessionFilter::WithSession(session), Visibility::Session) => {
                chunk.session_id.as_deref() == Some(session.as_str())
            }
        };
        if !visible {
            return false;
        }
        if let Some(chunk_type) = self.chunk_type {
            if chunk.chunk_type != chunk_type {
                return false;
            }
        }
        if !self.tags_any.is_empty() && !self.tags_any.iter().any(|t| chunk.tags.contains(t)) {
            return false;
        }
        if let Some(gt) = self.epoch_gt {
            if chunk.created_at_epoch <= gt {
                return false;
            }
        }
        if let Some(lt) = self.epoch_lt {
            if chunk.created_at_epoch >= lt {
                return false;
            }
        }
        if self.only_stale && !chunk.stale {
            return false;
        }
        true
    }
}

/// Transactional store keyed by `(project_id, chunk_id)`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    // ========== Projects ==========

    /// Fetch a project, creating it lazily with the given dimension and
    /// retention window on first write. The dimension is locked once set.
    async fn ensure_project(
        &self,
        project_id: &str,
        dimension: usize,
        retention_days: u32,
    ) -> Result<Project>;

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>>;

    // ========== Chunks ==========

    /// Insert a chunk row in whatever state it carries.
    ///
    /// # Errors
    ///
    /// Fails on duplicate `(project_id, chunk_id)` or invalid project id.
    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()>;

    /// Promote a pending row to live.
    async fn mark_chunk_live(&self, project_id: &str, id: Uuid) -> Result<()>;

    /// Remove a row outright; the rollback half of the two-step protocol.
    async fn remove_chunk(&self, project_id: &str, id: Uuid) -> Result<()>;

    /// Fetch a chunk in any state, tombstoned or not.
    async fn get_chunk(&self, project_id: &str, id: Uuid) -> Result<Option<Chunk>>;

    /// Replace a chunk row wholesale.
    async fn update_chunk(&self, chunk: &Chunk) -> Result<()>;

    /// Tombstone a chunk. Returns false when it was already deleted or
    /// absent, so deletes stay idempotent.
    async fn soft_delete_chunk(&self, project_id: &str, id: Uuid, when: DateTime<Utc>)
    -> Result<bool>;

    /// List live chunks matching the filter, newest first.
    async fn list_chunks(&self, project_id: &str, filter: &MetadataFilter) -> Result<Vec<Chunk>>;

    /// Count of live, non-deleted chunks; compared against the vector
    /// index by the integrity check.
    async fn count_live_chunks(&self, project_id: &str) -> Result<usize>;

    /// Pending rows older than the cutoff, for the rollback sweeper.
    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<(String, Uuid)>>;

    /// Hard-purge tombstones older than each project's retention window.
    /// Returns the number of rows removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    // ========== Sessions ==========

    async fn insert_session(&self, session: &Session) -> Result<()>;
    async fn get_session(&self, project_id: &str, id: &str) -> Result<Option<Session>>;
    async fn update_session(&self, session: &Session) -> Result<()>;
    async fn list_sessions(&self, project_id: &str) -> Result<Vec<Session>>;

    // ========== Derived entities ==========

    async fn upsert_pattern(&self, pattern: &Pattern) -> Result<()>;
    async fn list_patterns(&self, project_id: &str) -> Result<Vec<Pattern>>;

    async fn insert_conflict(&self, conflict: &ConflictRecord) -> Result<()>;
    async fn update_conflict(&self, conflict: &ConflictRecord) -> Result<()>;
    async fn list_conflicts(&self, project_id: &str) -> Result<Vec<ConflictRecord>>;

    // ========== Audit ==========

    async fn append_audit(&self, event: &AuditEvent) -> Result<()>;

    /// Audit events for a project, optionally narrowed to one resource,
    /// newest first.
    async fn list_audit(
        &self,
        project_id: &str,
        resource: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditEvent>>;

    // ========== Health ==========

    /// Cheap reachability probe.
    async fn ping(&self) -> Result<()>;
}
