//! Intelligence layer: pattern mining, conflict detection, decay scoring,
//! and related-context suggestion, driven asynchronously by memory
//! lifecycle events.
//!
//! Event processing runs on a dedicated worker pool reading a bounded
//! queue, so analysis never blocks request handling. Every handler is
//! idempotent; at-least-once event delivery is expected.

pub mod conflicts;
pub mod decay;
pub mod patterns;
pub mod suggest;

pub use conflicts::ConflictDetector;
pub use decay::DecayReport;
pub use patterns::{PatternMiner, Signature};
pub use suggest::Suggestion;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{DecaySettings, IntelligenceSettings};
use crate::error::Result;
use crate::events::{EventBus, MemoryEvent};
use crate::metadata::{MetadataFilter, MetadataStore};
use crate::types::{Chunk, ChunkType, ConflictRecord, Pattern};
use crate::vector::{SessionFilter, VectorStore};

/// Queue depth between the event subscriber and the worker pool.
const WORKER_QUEUE_CAPACITY: usize = 256;

/// Aggregate quality statistics for a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_chunks: usize,
    pub average_quality: f64,
    pub average_confidence: f64,
    pub by_type: BTreeMap<String, usize>,
    pub by_outcome: BTreeMap<String, usize>,
    pub stale_chunks: usize,
}

/// High-level project insights.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightsReport {
    pub quality: QualityReport,
    pub validated_patterns: usize,
    pub candidate_patterns: usize,
    pub top_signatures: Vec<String>,
    pub open_conflicts: usize,
}

/// Shared intelligence state and its analysis entry points.
pub struct IntelligenceService {
    settings: IntelligenceSettings,
    decay: DecaySettings,
    metadata: Arc<dyn MetadataStore>,
    vectors: Arc<dyn VectorStore>,
    events: EventBus,
    miner: PatternMiner,
    detector: ConflictDetector,
}

impl IntelligenceService {
    pub fn new(
        settings: IntelligenceSettings,
        decay: DecaySettings,
        metadata: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorStore>,
        events: EventBus,
    ) -> Self {
        Self {
            miner: PatternMiner::new(settings.clone()),
            detector: ConflictDetector::new(settings.clone()),
            settings,
            decay,
            metadata,
            vectors,
            events,
        }
    }

    /// Start the event pipeline: one subscriber feeding a bounded queue,
    /// drained by the configured number of workers. Handles abort when the
    /// service drops; closing the bus drains and stops the pipeline.
    pub fn start(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let (tx, rx) = mpsc::channel::<MemoryEvent>(WORKER_QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::new();

        let mut subscriber = self.events.subscribe();
        handles.push(tokio::spawn(async move {
            while let Some(delivery) = subscriber.next().await {
                if delivery.lagged > 0 {
                    warn!(lagged = delivery.lagged, "intelligence missed events");
                }
                if tx.send(delivery.event).await.is_err() {
                    break;
                }
            }
        }));

        for worker in 0..self.settings.worker_count.max(1) {
            let service = Arc::clone(self);
            let rx = Arc::clone(&rx);
            handles.push(tokio::spawn(async move {
                loop {
                    let event = { rx.lock().await.recv().await };
                    let Some(event) = event else { break };
                    if let Err(e) = service.process_event(&event).await {
                        warn!(worker, error = %e, "intelligence event processing failed");
                    }
                }
            }));
        }
        handles
    }

    /// Handle one event. Public so tests and synchronous callers can run
    /// the pipeline deterministically; idempotent under replay.
    pub async fn process_event(&self, event: &MemoryEvent) -> Result<()> {
        match event {
            MemoryEvent::Created {
                project_id,
                chunk_id,
                ..
            } => self.on_chunk_created(project_id, *chunk_id).await,
            MemoryEvent::Updated {
                project_id,
                chunk_id,
                content_changed: true,
            } => self.on_chunk_content_changed(project_id, *chunk_id).await,
            MemoryEvent::SessionEnded {
                project_id,
                session_id,
            } => self.on_session_ended(project_id, session_id).await,
            _ => Ok(()),
        }
    }

    async fn on_chunk_created(&self, project_id: &str, chunk_id: Uuid) -> Result<()> {
        let Some(chunk) = self.metadata.get_chunk(project_id, chunk_id).await? else {
            debug!(chunk_id = %chunk_id, "created event for unknown chunk; skipping");
            return Ok(());
        };
        if !chunk.is_live() {
            return Ok(());
        }

        let session_types = self.session_type_history(project_id, &chunk).await?;
        let signatures = patterns::derive_signatures(&chunk, &session_types);
        self.record_observation(project_id, chunk.id, &signatures)
            .await?;

        self.detector
            .probe(&chunk, &self.metadata, &self.vectors, &self.events)
            .await?;
        Ok(())
    }

    async fn on_chunk_content_changed(&self, project_id: &str, chunk_id: Uuid) -> Result<()> {
        let Some(chunk) = self.metadata.get_chunk(project_id, chunk_id).await? else {
            return Ok(());
        };
        if chunk.is_live() {
            self.detector
                .probe(&chunk, &self.metadata, &self.vectors, &self.events)
                .await?;
        }
        Ok(())
    }

    async fn on_session_ended(&self, project_id: &str, session_id: &str) -> Result<()> {
        let chunks = self
            .metadata
            .list_chunks(project_id, &MetadataFilter {
                session: SessionFilter::Any,
                ..MetadataFilter::default()
            })
            .await?;
        let mut session_chunks: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| c.session_id.as_deref() == Some(session_id))
            .collect();
        session_chunks.sort_by_key(|c| (c.created_at_epoch, c.id));
        let types: Vec<ChunkType> = session_chunks.iter().map(|c| c.chunk_type).collect();

        if let Some(signature) = patterns::workflow_signature(&types) {
            // Keyed on the session's last chunk so replays stay no-ops.
            if let Some(last) = session_chunks.last() {
                self.record_observation(project_id, last.id, &[signature])
                    .await?;
            }
        }
        Ok(())
    }

    async fn record_observation(
        &self,
        project_id: &str,
        chunk_id: Uuid,
        signatures: &[Signature],
    ) -> Result<()> {
        for pattern in self.miner.observe(project_id, chunk_id, signatures) {
            self.metadata.upsert_pattern(&pattern).await?;
            self.events.publish(MemoryEvent::PatternDetected {
                project_id: project_id.to_string(),
                pattern_id: pattern.id,
                signature: pattern.signature.clone(),
            });
        }
        Ok(())
    }

    async fn session_type_history(
        &self,
        project_id: &str,
        chunk: &Chunk,
    ) -> Result<Vec<ChunkType>> {
        let Some(session_id) = &chunk.session_id else {
            return Ok(vec![chunk.chunk_type]);
        };
        let chunks = self
            .metadata
            .list_chunks(project_id, &MetadataFilter {
                session: SessionFilter::Any,
                ..MetadataFilter::default()
            })
            .await?;
        let mut session_chunks: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| c.session_id.as_deref() == Some(session_id.as_str()))
            .filter(|c| c.created_at_epoch <= chunk.created_at_epoch)
            .collect();
        session_chunks.sort_by_key(|c| (c.created_at_epoch, c.id));
        Ok(session_chunks.iter().map(|c| c.chunk_type).collect())
    }

    // ========================================================================
    // Analysis entry points
    // ========================================================================

    /// Copy-on-read pattern snapshot for a project.
    #[must_use]
    pub fn patterns(&self, project_id: &str) -> Vec<Pattern> {
        self.miner.snapshot(project_id)
    }

    /// Explicit pattern feedback.
    pub async fn pattern_feedback(
        &self,
        pattern_id: Uuid,
        positive: bool,
    ) -> Result<Option<Pattern>> {
        let updated = self.miner.feedback(pattern_id, positive);
        if let Some(pattern) = &updated {
            self.metadata.upsert_pattern(pattern).await?;
        }
        Ok(updated)
    }

    /// Stored conflict records for a project.
    pub async fn conflicts(&self, project_id: &str) -> Result<Vec<ConflictRecord>> {
        self.metadata.list_conflicts(project_id).await
    }

    /// Run the freshness sweep for one project.
    pub async fn decay_sweep(&self, project_id: &str) -> Result<DecayReport> {
        decay::sweep_project(project_id, &self.metadata, &self.decay, &self.settings).await
    }

    /// Related-context suggestions for a tag fingerprint.
    pub async fn suggest_related(
        &self,
        project_id: &str,
        query_tags: &[String],
        session_id: Option<String>,
        limit: usize,
    ) -> Result<Vec<Suggestion>> {
        let patterns = self.miner.snapshot(project_id);
        suggest::suggest_related(
            project_id,
            query_tags,
            session_id,
            limit,
            &self.metadata,
            &patterns,
        )
        .await
    }

    /// Aggregate quality statistics.
    pub async fn quality_report(&self, project_id: &str) -> Result<QualityReport> {
        let chunks = self
            .metadata
            .list_chunks(project_id, &MetadataFilter {
                session: SessionFilter::Any,
                ..MetadataFilter::default()
            })
            .await?;

        let mut report = QualityReport {
            total_chunks: chunks.len(),
            ..QualityReport::default()
        };
        if chunks.is_empty() {
            return Ok(report);
        }
        for chunk in &chunks {
            report.average_quality += f64::from(chunk.quality);
            report.average_confidence += f64::from(chunk.confidence);
            *report.by_type.entry(chunk.chunk_type.to_string()).or_default() += 1;
            *report.by_outcome.entry(chunk.outcome.to_string()).or_default() += 1;
            if chunk.stale {
                report.stale_chunks += 1;
            }
        }
        report.average_quality /= chunks.len() as f64;
        report.average_confidence /= chunks.len() as f64;
        Ok(report)
    }

    /// Combined insights: quality, patterns, and open conflicts.
    pub async fn insights(&self, project_id: &str) -> Result<InsightsReport> {
        let quality = self.quality_report(project_id).await?;
        let patterns = self.miner.snapshot(project_id);
        let conflicts = self.conflicts(project_id).await?;

        let validated = patterns
            .iter()
            .filter(|p| p.status == crate::types::PatternStatus::Validated)
            .count();
        Ok(InsightsReport {
            quality,
            validated_patterns: validated,
            candidate_patterns: patterns.len() - validated,
            top_signatures: patterns
                .iter()
                .take(5)
                .map(|p| p.signature.clone())
                .collect(),
            open_conflicts: conflicts.iter().filter(|c| c.resolution.is_none()).count(),
        })
    }

    /// Candidates still in the validation queue.
    #[must_use]
    pub fn validation_queue(&self, project_id: &str) -> Vec<Pattern> {
        self.miner.validation_queue(project_id)
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::types::{Difficulty, Outcome, Provenance, Visibility};
    use chrono::Utc;

    pub(crate) fn chunk(project: &str, chunk_type: ChunkType) -> Chunk {
        let now = Utc::now();
        Chunk {
            id: Uuid::new_v4(),
            project_id: project.into(),
            session_id: Some("s1".into()),
            chunk_type,
            content: "content".into(),
            summary: "content".into(),
            tags: vec![],
            outcome: Outcome::InProgress,
            difficulty: Difficulty::Moderate,
            created_at: now,
            created_at_epoch: now.timestamp(),
            embedding: vec![0.0; 8],
            provenance: Provenance::Primary,
            related_chunks: vec![],
            parent: None,
            supersedes: None,
            visibility: Visibility::Project,
            quality: 0.7,
            confidence: 0.8,
            last_refreshed: None,
            stale: false,
            state: crate::types::ChunkState::Live,
            deleted_at: None,
        }
    }
}
