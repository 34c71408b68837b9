//! Memory engine: orchestrates chunk → embed → store and
//! query → retrieve → rank, owning chunks end to end.
//!
//! Writes follow the two-step protocol (metadata `pending` → vector write →
//! metadata `live`) so the relational store and the vector index never
//! disagree for longer than one in-flight operation; a sweeper rolls back
//! whatever a crash leaves behind.

mod fingerprint;
mod integrity;
pub mod ranking;
mod sweeper;

pub use fingerprint::FingerprintLocks;
pub use integrity::IntegrityReport;
pub use sweeper::{SweepReport, spawn_sweeper};

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::chunker::{ChunkDraft, Chunker};
use crate::config::EngramConfig;
use crate::embeddings::cache::content_hash;
use crate::embeddings::provider::validate_dimension;
use crate::embeddings::{Embedded, EmbeddingService};
use crate::error::{Error, Result};
use crate::events::{EventBus, MemoryEvent};
use crate::metadata::{MetadataFilter, MetadataStore};
use crate::reliability::ReliabilityManager;
use crate::types::{
    AuditEvent, Chunk, ChunkDelta, ChunkInput, ChunkState, ChunkType, MAX_RELATION_DEPTH,
    Visibility, validate_project_id,
};
use crate::vector::{Filter, SessionFilter, VectorStore};

/// Ambient cancellation signal plus per-operation deadline.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

impl OpContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: None,
        }
    }

    /// A context plus the sender that cancels it.
    #[must_use]
    pub fn cancellable() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self {
            deadline: None,
            cancel: Some(rx),
        })
    }

    /// Fail fast at suspension points: `Cancelled` beats `Deadline`.
    pub fn ensure_active(&self) -> Result<()> {
        if let Some(cancel) = &self.cancel {
            if *cancel.borrow() {
                return Err(Error::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::Deadline);
            }
        }
        Ok(())
    }
}

/// Outcome of a store: the created ids, or a deferral below the minimum
/// content length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreResult {
    pub chunk_ids: Vec<Uuid>,
    pub deferred: bool,
}

/// Retrieval request.
#[derive(Debug, Clone, Default)]
pub struct RetrieveRequest {
    pub project_id: String,
    pub session_id: Option<String>,
    pub query: String,
    pub k: usize,
    pub chunk_type: Option<ChunkType>,
    pub tags_any: Vec<String>,
    pub epoch_gt: Option<i64>,
    pub epoch_lt: Option<i64>,
    pub include_stale: bool,
}

/// A retrieved chunk with its scores.
#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub chunk: Chunk,
    /// Normalized vector similarity in [0, 1]
    pub similarity: f64,
    /// Final rank after decay, confidence and provenance penalty
    pub score: f64,
    /// The chunk is party to an unresolved conflict record
    pub conflicted: bool,
}

/// Retrieval response; `degraded` marks results computed from a fallback
/// query embedding.
#[derive(Debug, Clone, Default)]
pub struct RetrieveResult {
    pub items: Vec<RankedChunk>,
    pub degraded: bool,
    pub degraded_reason: Option<String>,
}

/// Default number of retrieval results.
pub const DEFAULT_RETRIEVE_K: usize = 10;
/// Hard cap on retrieval results.
pub const MAX_RETRIEVE_K: usize = 100;
/// Pending rows older than this are rolled back by the sweeper.
const PENDING_ROLLBACK_AFTER: Duration = Duration::from_secs(300);

/// The memory engine.
pub struct MemoryEngine {
    config: EngramConfig,
    chunker: Chunker,
    embeddings: Arc<EmbeddingService>,
    vectors: Arc<dyn VectorStore>,
    metadata: Arc<dyn MetadataStore>,
    events: EventBus,
    reliability: Arc<ReliabilityManager>,
    audit: AuditLogger,
    fingerprints: FingerprintLocks,
}

impl MemoryEngine {
    pub fn new(
        config: EngramConfig,
        embeddings: Arc<EmbeddingService>,
        vectors: Arc<dyn VectorStore>,
        metadata: Arc<dyn MetadataStore>,
        events: EventBus,
        reliability: Arc<ReliabilityManager>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            chunker: Chunker::new(config.chunking.clone()),
            config,
            embeddings,
            vectors,
            metadata,
            events,
            reliability,
            audit,
            fingerprints: FingerprintLocks::new(),
        }
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        Arc::clone(&self.metadata)
    }

    #[must_use]
    pub fn vectors(&self) -> Arc<dyn VectorStore> {
        Arc::clone(&self.vectors)
    }

    #[must_use]
    pub fn embeddings(&self) -> Arc<EmbeddingService> {
        Arc::clone(&self.embeddings)
    }

    #[must_use]
    pub fn config(&self) -> &EngramConfig {
        &self.config
    }

    #[must_use]
    pub fn reliability(&self) -> Arc<ReliabilityManager> {
        Arc::clone(&self.reliability)
    }

    #[must_use]
    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    // ========================================================================
    // Store
    // ========================================================================

    /// Store conversational content as one or more chunks.
    ///
    /// Requires a `session_id` (writes are session-scoped). Content below
    /// the minimum length is deferred; content above the maximum is split
    /// into sibling chunks sharing a parent back-reference. Concurrent
    /// stores of identical content collapse to one set of ids.
    pub async fn store(&self, input: ChunkInput, ctx: &OpContext) -> Result<StoreResult> {
        ctx.ensure_active()?;
        self.reliability.admit()?;
        input.validate()?;
        if input.session_id.is_none() {
            return Err(Error::InvalidScope("store".into()));
        }

        let project = self
            .metadata
            .ensure_project(
                &input.project_id,
                self.config.embedding.dimension,
                self.config.retention.soft_delete_window_days,
            )
            .await?;

        let emission = self.chunker.prepare(&input)?;
        if emission.drafts.is_empty() {
            debug!(project_id = %input.project_id, "store deferred below minimum length");
            return Ok(StoreResult {
                chunk_ids: Vec::new(),
                deferred: true,
            });
        }

        let fingerprint = content_hash(&input.content);
        let project_dimension = project.dimension;
        let chunk_ids = self
            .fingerprints
            .run(&input.project_id, fingerprint, || {
                self.persist_drafts(input.clone(), emission.drafts, project_dimension, ctx)
            })
            .await?;

        Ok(StoreResult {
            chunk_ids,
            deferred: false,
        })
    }

    async fn persist_drafts(
        &self,
        input: ChunkInput,
        drafts: Vec<ChunkDraft>,
        project_dimension: usize,
        ctx: &OpContext,
    ) -> Result<Vec<Uuid>> {
        let mut chunk_ids = Vec::with_capacity(drafts.len());
        let mut parent: Option<Uuid> = None;

        for draft in drafts {
            ctx.ensure_active()?;
            let embedded = self.embeddings.embed(&draft.content).await?;
            validate_dimension(&embedded.vector, project_dimension)?;

            let chunk = build_chunk(&input, &draft, &embedded, parent);
            self.two_step_write(&chunk).await?;

            self.events.publish(MemoryEvent::Created {
                project_id: chunk.project_id.clone(),
                chunk_id: chunk.id,
                chunk_type: chunk.chunk_type,
                session_id: chunk.session_id.clone(),
            });
            self.audit_trail("memory.store", &chunk.project_id, &chunk.id.to_string(), true)
                .await;

            if parent.is_none() {
                parent = Some(chunk.id);
            }
            chunk_ids.push(chunk.id);
        }

        info!(
            project_id = %input.project_id,
            chunks = chunk_ids.len(),
            "stored content"
        );
        Ok(chunk_ids)
    }

    /// Metadata `pending` → vector write → metadata `live`, rolling the
    /// metadata row back when the vector write fails.
    async fn two_step_write(&self, chunk: &Chunk) -> Result<()> {
        let mut pending = chunk.clone();
        pending.state = ChunkState::Pending;
        self.metadata.insert_chunk(&pending).await?;

        let vector_metadata = chunk_vector_metadata(chunk);
        match self
            .vectors
            .upsert(chunk.id, chunk.embedding.clone(), vector_metadata)
            .await
        {
            Ok(()) => self.metadata.mark_chunk_live(&chunk.project_id, chunk.id).await,
            Err(e) => {
                warn!(chunk_id = %chunk.id, error = %e, "vector write failed; rolling back");
                if let Err(rollback) = self.metadata.remove_chunk(&chunk.project_id, chunk.id).await
                {
                    // The sweeper retires the orphaned pending row later.
                    warn!(chunk_id = %chunk.id, error = %rollback, "rollback deferred to sweeper");
                }
                Err(e)
            }
        }
    }

    // ========================================================================
    // Retrieve
    // ========================================================================

    /// Semantic retrieval with project/session scoping and re-ranking.
    pub async fn retrieve(
        &self,
        request: RetrieveRequest,
        ctx: &OpContext,
    ) -> Result<RetrieveResult> {
        ctx.ensure_active()?;
        validate_project_id(&request.project_id)?;
        let k = match request.k {
            0 => DEFAULT_RETRIEVE_K,
            k => k.min(MAX_RETRIEVE_K),
        };

        let embedded = self.embeddings.embed(&request.query).await?;
        let degraded = embedded.provenance == crate::types::Provenance::Fallback;

        let filter = Filter::for_project(&request.project_id)
            .with_session(request.session_id.clone())
            .with_type(request.chunk_type)
            .with_tags_any(request.tags_any.clone())
            .with_epoch_range(request.epoch_gt, request.epoch_lt);

        ctx.ensure_active()?;
        // Overfetch: the metadata join drops pending/tombstoned hits.
        let hits = self.vectors.query(&embedded.vector, &filter, k * 3).await?;
        let mut items = self
            .join_and_rank(&request.project_id, hits, request.include_stale, ctx)
            .await?;
        items.truncate(k);

        Ok(RetrieveResult {
            items,
            degraded,
            degraded_reason: degraded.then(|| "query embedded by fallback provider".to_string()),
        })
    }

    /// Fetch one chunk by id, respecting visibility.
    pub async fn get_chunk(
        &self,
        project_id: &str,
        chunk_id: Uuid,
        session_id: Option<&str>,
    ) -> Result<Chunk> {
        validate_project_id(project_id)?;
        let chunk = self
            .metadata
            .get_chunk(project_id, chunk_id)
            .await?
            .filter(Chunk::is_live)
            .ok_or(Error::NotFound(chunk_id))?;
        if chunk.visibility == Visibility::Session
            && chunk.session_id.as_deref() != session_id
        {
            return Err(Error::AccessDenied {
                resource: chunk_id.to_string(),
                project_id: project_id.to_string(),
            });
        }
        Ok(chunk)
    }

    /// Nearest neighbours of a stored chunk, excluding the chunk itself.
    pub async fn find_similar(
        &self,
        project_id: &str,
        chunk_id: Uuid,
        k: usize,
        session_id: Option<String>,
        ctx: &OpContext,
    ) -> Result<Vec<RankedChunk>> {
        ctx.ensure_active()?;
        let chunk = self
            .get_chunk(project_id, chunk_id, session_id.as_deref())
            .await?;

        // Prefer the indexed vector; fall back to the stored copy in C.
        let vector = match self.vectors.fetch(chunk_id).await? {
            Some((vector, _)) => vector,
            None => chunk.embedding.clone(),
        };
        let filter = Filter::for_project(project_id)
            .with_session(session_id)
            .excluding(chunk_id);
        let k = if k == 0 { DEFAULT_RETRIEVE_K } else { k.min(MAX_RETRIEVE_K) };
        let hits = self.vectors.query(&vector, &filter, k * 3).await?;
        let mut items = self.join_and_rank(project_id, hits, false, ctx).await?;
        items.truncate(k);
        Ok(items)
    }

    async fn join_and_rank(
        &self,
        project_id: &str,
        hits: Vec<crate::vector::Hit>,
        include_stale: bool,
        ctx: &OpContext,
    ) -> Result<Vec<RankedChunk>> {
        let now = Utc::now();
        let conflicted = self.unresolved_conflict_parties(project_id).await?;

        let mut items = Vec::with_capacity(hits.len());
        for hit in hits {
            ctx.ensure_active()?;
            let Some(chunk) = self.metadata.get_chunk(project_id, hit.id).await? else {
                continue;
            };
            if !chunk.is_live() || (chunk.stale && !include_stale) {
                continue;
            }
            let score = ranking::final_score(
                hit.score,
                &chunk,
                now,
                &self.config.decay,
                self.config.embedding.fallback_penalty,
            );
            items.push(RankedChunk {
                similarity: ranking::normalize_similarity(hit.score),
                score,
                conflicted: conflicted.contains(&chunk.id),
                chunk,
            });
        }
        items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        Ok(items)
    }

    async fn unresolved_conflict_parties(
        &self,
        project_id: &str,
    ) -> Result<std::collections::HashSet<Uuid>> {
        let conflicts = self.metadata.list_conflicts(project_id).await?;
        Ok(conflicts
            .into_iter()
            .filter(|c| c.resolution.is_none())
            .flat_map(|c| [c.chunk_a, c.chunk_b])
            .collect())
    }

    // ========================================================================
    // Update / Delete
    // ========================================================================

    /// Mutate allowed fields; a content change re-embeds and updates the
    /// vector index, an empty delta is a no-op.
    pub async fn update(
        &self,
        project_id: &str,
        chunk_id: Uuid,
        delta: ChunkDelta,
        session_id: Option<&str>,
        ctx: &OpContext,
    ) -> Result<Chunk> {
        ctx.ensure_active()?;
        let mut chunk = self.get_chunk(project_id, chunk_id, session_id).await?;

        if delta.is_empty() {
            return Ok(chunk);
        }

        let content_changed = delta
            .content
            .as_ref()
            .is_some_and(|content| content != &chunk.content);

        if let Some(content) = delta.content {
            chunk.content = content;
        }
        if let Some(summary) = delta.summary {
            chunk.summary = summary;
        }
        if let Some(tags) = delta.tags {
            chunk.tags = tags;
        }
        if let Some(outcome) = delta.outcome {
            chunk.outcome = outcome;
        }
        if let Some(difficulty) = delta.difficulty {
            chunk.difficulty = difficulty;
        }

        if content_changed {
            ctx.ensure_active()?;
            let dimension = self
                .metadata
                .get_project(project_id)
                .await?
                .map_or(self.config.embedding.dimension, |p| p.dimension);
            let embedded = self.embeddings.embed(&chunk.content).await?;
            validate_dimension(&embedded.vector, dimension)?;
            chunk.embedding = embedded.vector.clone();
            chunk.provenance = embedded.provenance;
            self.vectors
                .upsert(chunk.id, chunk.embedding.clone(), chunk_vector_metadata(&chunk))
                .await?;
        }

        self.metadata.update_chunk(&chunk).await?;
        self.events.publish(MemoryEvent::Updated {
            project_id: project_id.to_string(),
            chunk_id,
            content_changed,
        });
        self.audit_trail("memory.update", project_id, &chunk_id.to_string(), true)
            .await;
        Ok(chunk)
    }

    /// Soft-delete a chunk; the vector removal happens asynchronously.
    /// Deleting an absent or already-deleted chunk succeeds with no side
    /// effects.
    pub async fn delete(&self, project_id: &str, chunk_id: Uuid, ctx: &OpContext) -> Result<bool> {
        ctx.ensure_active()?;
        validate_project_id(project_id)?;
        let newly_deleted = self
            .metadata
            .soft_delete_chunk(project_id, chunk_id, Utc::now())
            .await?;
        if !newly_deleted {
            return Ok(false);
        }

        let vectors = Arc::clone(&self.vectors);
        tokio::spawn(async move {
            if let Err(e) = vectors.delete(chunk_id).await {
                warn!(chunk_id = %chunk_id, error = %e, "deferred vector removal failed");
            }
        });

        self.events.publish(MemoryEvent::Deleted {
            project_id: project_id.to_string(),
            chunk_id,
        });
        self.audit_trail("memory.delete", project_id, &chunk_id.to_string(), true)
            .await;
        Ok(true)
    }

    /// Soft-delete every stale chunk in a project. Returns the expired ids.
    pub async fn expire_stale(&self, project_id: &str, ctx: &OpContext) -> Result<Vec<Uuid>> {
        let filter = MetadataFilter {
            session: SessionFilter::Any,
            only_stale: true,
            ..MetadataFilter::default()
        };
        let stale = self.metadata.list_chunks(project_id, &filter).await?;
        let mut expired = Vec::with_capacity(stale.len());
        for chunk in stale {
            if self.delete(project_id, chunk.id, ctx).await? {
                expired.push(chunk.id);
            }
        }
        Ok(expired)
    }

    /// Boost a chunk's freshness and clear its stale mark.
    pub async fn refresh(&self, project_id: &str, chunk_id: Uuid) -> Result<Chunk> {
        let mut chunk = self
            .metadata
            .get_chunk(project_id, chunk_id)
            .await?
            .filter(Chunk::is_live)
            .ok_or(Error::NotFound(chunk_id))?;
        chunk.last_refreshed = Some(Utc::now());
        chunk.stale = false;
        self.metadata.update_chunk(&chunk).await?;
        Ok(chunk)
    }

    // ========================================================================
    // Relationships & threads
    // ========================================================================

    /// Link two chunks by id, in both directions.
    pub async fn create_relationship(
        &self,
        project_id: &str,
        from: Uuid,
        to: Uuid,
    ) -> Result<()> {
        if from == to {
            return Err(Error::InvalidParams {
                path: "parameters.to_id".into(),
                message: "cannot relate a chunk to itself".into(),
            });
        }
        let mut a = self
            .metadata
            .get_chunk(project_id, from)
            .await?
            .filter(Chunk::is_live)
            .ok_or(Error::NotFound(from))?;
        let mut b = self
            .metadata
            .get_chunk(project_id, to)
            .await?
            .filter(Chunk::is_live)
            .ok_or(Error::NotFound(to))?;
        if !a.related_chunks.contains(&to) {
            a.related_chunks.push(to);
            self.metadata.update_chunk(&a).await?;
        }
        if !b.related_chunks.contains(&from) {
            b.related_chunks.push(from);
            self.metadata.update_chunk(&b).await?;
        }
        Ok(())
    }

    /// Resolve the related-chunk graph from a root, bounded by depth to
    /// keep cyclic graphs walkable.
    pub async fn related_chunks(
        &self,
        project_id: &str,
        root: Uuid,
        depth: usize,
    ) -> Result<Vec<Chunk>> {
        let depth = depth.clamp(1, MAX_RELATION_DEPTH);
        let mut seen = std::collections::HashSet::from([root]);
        let mut frontier = vec![root];
        let mut related = Vec::new();

        for _ in 0..depth {
            let mut next = Vec::new();
            for id in frontier.drain(..) {
                let Some(chunk) = self.metadata.get_chunk(project_id, id).await? else {
                    continue;
                };
                for linked in &chunk.related_chunks {
                    if seen.insert(*linked) {
                        if let Some(neighbour) = self
                            .metadata
                            .get_chunk(project_id, *linked)
                            .await?
                            .filter(Chunk::is_live)
                        {
                            next.push(*linked);
                            related.push(neighbour);
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        Ok(related)
    }

    /// Group existing chunks into a named thread.
    ///
    /// The first id becomes the thread root: every member gets a
    /// `thread:<name>` tag and a parent back-reference to the root.
    pub async fn create_thread(
        &self,
        project_id: &str,
        name: &str,
        chunk_ids: &[Uuid],
    ) -> Result<Uuid> {
        let Some((root, rest)) = chunk_ids.split_first() else {
            return Err(Error::InvalidParams {
                path: "parameters.chunk_ids".into(),
                message: "a thread needs at least one chunk".into(),
            });
        };
        let tag = format!("thread:{name}");

        let mut root_chunk = self
            .metadata
            .get_chunk(project_id, *root)
            .await?
            .filter(Chunk::is_live)
            .ok_or(Error::NotFound(*root))?;
        if !root_chunk.tags.contains(&tag) {
            root_chunk.tags.push(tag.clone());
        }
        self.metadata.update_chunk(&root_chunk).await?;

        for id in rest {
            let mut member = self
                .metadata
                .get_chunk(project_id, *id)
                .await?
                .filter(Chunk::is_live)
                .ok_or(Error::NotFound(*id))?;
            if !member.tags.contains(&tag) {
                member.tags.push(tag.clone());
            }
            member.parent = Some(*root);
            self.metadata.update_chunk(&member).await?;
        }
        Ok(*root)
    }

    /// All threads in a project: thread tag → member chunks, root first.
    pub async fn list_threads(
        &self,
        project_id: &str,
        session_id: Option<String>,
    ) -> Result<std::collections::BTreeMap<String, Vec<Chunk>>> {
        let filter = MetadataFilter {
            session: session_id
                .map_or(SessionFilter::Public, SessionFilter::WithSession),
            ..MetadataFilter::default()
        };
        let chunks = self.metadata.list_chunks(project_id, &filter).await?;
        let mut threads: std::collections::BTreeMap<String, Vec<Chunk>> =
            std::collections::BTreeMap::new();
        for chunk in chunks {
            for tag in &chunk.tags {
                if let Some(name) = tag.strip_prefix("thread:") {
                    threads
                        .entry(name.to_string())
                        .or_default()
                        .push(chunk.clone());
                }
            }
        }
        for members in threads.values_mut() {
            members.sort_by_key(|c| (c.parent.is_some(), c.created_at_epoch, c.id));
        }
        Ok(threads)
    }

    // ========================================================================
    // Export / import
    // ========================================================================

    /// Export a project's live chunks and sessions.
    pub async fn export_project(&self, project_id: &str) -> Result<ProjectExport> {
        validate_project_id(project_id)?;
        let chunks = self
            .metadata
            .list_chunks(project_id, &MetadataFilter {
                session: SessionFilter::Any,
                ..MetadataFilter::default()
            })
            .await?;
        let sessions = self.metadata.list_sessions(project_id).await?;
        Ok(ProjectExport {
            project_id: project_id.to_string(),
            chunks,
            sessions,
        })
    }

    /// Import previously exported data into a project, re-embedding
    /// nothing: stored vectors travel with their chunks.
    pub async fn import_project(
        &self,
        project_id: &str,
        export: ProjectExport,
        ctx: &OpContext,
    ) -> Result<usize> {
        validate_project_id(project_id)?;
        self.metadata
            .ensure_project(
                project_id,
                self.config.embedding.dimension,
                self.config.retention.soft_delete_window_days,
            )
            .await?;

        let mut imported = 0;
        for mut chunk in export.chunks {
            ctx.ensure_active()?;
            chunk.project_id = project_id.to_string();
            if self
                .metadata
                .get_chunk(project_id, chunk.id)
                .await?
                .is_some()
            {
                continue;
            }
            self.two_step_write(&chunk).await?;
            self.events.publish(MemoryEvent::Created {
                project_id: project_id.to_string(),
                chunk_id: chunk.id,
                chunk_type: chunk.chunk_type,
                session_id: chunk.session_id.clone(),
            });
            imported += 1;
        }
        for mut session in export.sessions {
            session.project_id = project_id.to_string();
            if self
                .metadata
                .get_session(project_id, &session.id)
                .await?
                .is_none()
            {
                self.metadata.insert_session(&session).await?;
            }
        }
        Ok(imported)
    }

    async fn audit_trail(&self, action: &str, project_id: &str, resource: &str, success: bool) {
        let event = AuditEvent::now("memory-engine", action, resource)
            .with_project(project_id)
            .with_success(success);
        self.audit.log(event.clone());
        if let Err(e) = self.metadata.append_audit(&event).await {
            warn!(error = %e, "failed to append audit event");
        }
    }
}

/// Exported project snapshot.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProjectExport {
    pub project_id: String,
    pub chunks: Vec<Chunk>,
    pub sessions: Vec<crate::types::Session>,
}

fn build_chunk(
    input: &ChunkInput,
    draft: &ChunkDraft,
    embedded: &Embedded,
    parent: Option<Uuid>,
) -> Chunk {
    let now = Utc::now();
    Chunk {
        id: Uuid::new_v4(),
        project_id: input.project_id.clone(),
        session_id: input.session_id.clone(),
        chunk_type: draft.chunk_type,
        content: draft.content.clone(),
        summary: input
            .summary
            .clone()
            .filter(|s| parent.is_none() && !s.is_empty())
            .unwrap_or_else(|| draft.summary.clone()),
        tags: draft.tags.clone(),
        outcome: draft.outcome,
        difficulty: draft.difficulty,
        created_at: now,
        created_at_epoch: now.timestamp(),
        embedding: embedded.vector.clone(),
        provenance: embedded.provenance,
        related_chunks: Vec::new(),
        parent,
        supersedes: if parent.is_none() { input.supersedes } else { None },
        visibility: input.visibility,
        quality: draft.quality,
        confidence: 0.8,
        last_refreshed: None,
        stale: false,
        state: ChunkState::Pending,
        deleted_at: None,
    }
}

fn chunk_vector_metadata(chunk: &Chunk) -> crate::vector::VectorMetadata {
    crate::vector::VectorMetadata {
        project_id: chunk.project_id.clone(),
        session_id: chunk.session_id.clone(),
        chunk_type: chunk.chunk_type,
        timestamp_epoch: chunk.created_at_epoch,
        tags: chunk.tags.clone(),
        visibility: chunk.visibility,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_context_deadline_expires() {
        let ctx = OpContext::with_deadline(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(ctx.ensure_active().expect_err("expired").code(), "deadline");
    }

    #[test]
    fn op_context_cancellation_wins() {
        let (tx, ctx) = OpContext::cancellable();
        assert!(ctx.ensure_active().is_ok());
        tx.send(true).expect("send");
        assert_eq!(
            ctx.ensure_active().expect_err("cancelled").code(),
            "cancelled"
        );
    }
}
