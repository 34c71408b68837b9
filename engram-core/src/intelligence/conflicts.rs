//! Contradiction detection between chunks.
//!
//! New solutions and architecture decisions are probed against prior
//! chunks of the same type in the project. A pair above the similarity
//! threshold whose newer side carries supersession or negation markers is
//! a conflict: strictly-superseding pairs auto-resolve (the older chunk's
//! outcome flips to abandoned and the two are linked), everything else is
//! surfaced as a manual conflict record.

use chrono::Utc;
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::info;
use uuid::Uuid;

use crate::config::IntelligenceSettings;
use crate::engine::ranking::normalize_similarity;
use crate::error::Result;
use crate::events::{EventBus, MemoryEvent};
use crate::metadata::MetadataStore;
use crate::types::{Chunk, ChunkType, ConflictRecord, ConflictSeverity, Outcome};
use crate::vector::{Filter, SessionFilter, VectorStore};

/// How many similar prior chunks each probe considers.
const PROBE_CANDIDATES: usize = 5;

fn supersession_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(
            r"(?i)\b(supersedes?|superseded|replaces?|instead of|no longer|deprecates?|deprecated|rather than)\b",
        )
        .unwrap_or_else(|e| unreachable!("supersession regex failed to compile: {e}"))
    })
}

fn negation_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"(?i)\b(do not|don't|never|avoid|stop using|not use|won't)\b")
            .unwrap_or_else(|e| unreachable!("negation regex failed to compile: {e}"))
    })
}

/// True when the content explicitly supersedes something.
#[must_use]
pub fn has_supersession_marker(content: &str) -> bool {
    supersession_regex().is_match(content)
}

/// True when the content explicitly negates something.
#[must_use]
pub fn has_negation_marker(content: &str) -> bool {
    negation_regex().is_match(content)
}

fn tags_compatible(a: &Chunk, b: &Chunk) -> bool {
    a.tags.is_empty() || b.tags.is_empty() || a.tags.iter().any(|t| b.tags.contains(t))
}

/// Conflict probe over new chunks.
pub struct ConflictDetector {
    settings: IntelligenceSettings,
}

impl ConflictDetector {
    #[must_use]
    pub fn new(settings: IntelligenceSettings) -> Self {
        Self { settings }
    }

    /// Probe `chunk` against prior chunks of the same type. Returns the
    /// conflict records created by this pass.
    ///
    /// The rule is symmetric in detection and resolves by timestamp, so
    /// observation order never changes the outcome.
    pub async fn probe(
        &self,
        chunk: &Chunk,
        metadata: &Arc<dyn MetadataStore>,
        vectors: &Arc<dyn VectorStore>,
        events: &EventBus,
    ) -> Result<Vec<ConflictRecord>> {
        if !matches!(
            chunk.chunk_type,
            ChunkType::Solution | ChunkType::ArchitectureDecision
        ) {
            return Ok(Vec::new());
        }

        let filter = Filter {
            project_id: chunk.project_id.clone(),
            session: SessionFilter::Any,
            chunk_type: Some(chunk.chunk_type),
            tags_any: Vec::new(),
            epoch_gt: None,
            epoch_lt: None,
            exclude: Some(chunk.id),
        };
        let hits = vectors
            .query(&chunk.embedding, &filter, PROBE_CANDIDATES)
            .await?;

        let existing = metadata.list_conflicts(&chunk.project_id).await?;
        let mut records = Vec::new();

        for hit in hits {
            if normalize_similarity(hit.score) < self.settings.conflict_similarity_threshold {
                continue;
            }
            let Some(other) = metadata.get_chunk(&chunk.project_id, hit.id).await? else {
                continue;
            };
            if !other.is_live() {
                continue;
            }
            if already_recorded(&existing, chunk.id, other.id) {
                continue;
            }

            let explicit = chunk.supersedes == Some(other.id) || other.supersedes == Some(chunk.id);
            let marked = has_supersession_marker(&chunk.content)
                || has_supersession_marker(&other.content)
                || has_negation_marker(&chunk.content)
                || has_negation_marker(&other.content);
            if !explicit && !marked {
                continue;
            }

            let record = self
                .resolve_pair(chunk, &other, explicit, metadata)
                .await?;
            events.publish(MemoryEvent::ConflictDetected {
                project_id: chunk.project_id.clone(),
                conflict_id: record.id,
                severity: record.severity,
            });
            metadata.insert_conflict(&record).await?;
            records.push(record);
        }

        Ok(records)
    }

    /// Decide severity and apply auto-resolution when the newer chunk
    /// strictly supersedes the older one.
    async fn resolve_pair(
        &self,
        chunk: &Chunk,
        other: &Chunk,
        explicit: bool,
        metadata: &Arc<dyn MetadataStore>,
    ) -> Result<ConflictRecord> {
        let (newer, older) = if chunk.created_at_epoch >= other.created_at_epoch {
            (chunk, other)
        } else {
            (other, chunk)
        };

        let strict_supersession = explicit
            || (has_supersession_marker(&newer.content) && tags_compatible(newer, older));

        let mut record = ConflictRecord {
            id: Uuid::new_v4(),
            project_id: chunk.project_id.clone(),
            chunk_a: older.id,
            chunk_b: newer.id,
            severity: if strict_supersession {
                ConflictSeverity::AutoResolvable
            } else {
                ConflictSeverity::Manual
            },
            resolution: None,
            detected_at: Utc::now(),
        };

        if strict_supersession {
            let mut abandoned = older.clone();
            abandoned.outcome = Outcome::Abandoned;
            if !abandoned.related_chunks.contains(&newer.id) {
                abandoned.related_chunks.push(newer.id);
            }
            metadata.update_chunk(&abandoned).await?;

            let mut winner = newer.clone();
            if !winner.related_chunks.contains(&older.id) {
                winner.related_chunks.push(older.id);
                metadata.update_chunk(&winner).await?;
            }

            record.resolution = Some("superseded".to_string());
            info!(
                project_id = %chunk.project_id,
                older = %older.id,
                newer = %newer.id,
                "conflict auto-resolved by supersession"
            );
        }

        Ok(record)
    }
}

fn already_recorded(existing: &[ConflictRecord], a: Uuid, b: Uuid) -> bool {
    existing
        .iter()
        .any(|c| (c.chunk_a == a && c.chunk_b == b) || (c.chunk_a == b && c.chunk_b == a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_detection() {
        assert!(has_supersession_marker(
            "Use GraphQL for the public API, supersedes the REST choice"
        ));
        assert!(has_supersession_marker("This replaces the old approach"));
        assert!(has_negation_marker("Do not use string timestamps"));
        assert!(!has_supersession_marker("Use connection pooling"));
        assert!(!has_negation_marker("Use connection pooling"));
    }

    #[test]
    fn tag_compatibility() {
        let mut a = crate::intelligence::tests_support::chunk("p", ChunkType::Solution);
        let mut b = crate::intelligence::tests_support::chunk("p", ChunkType::Solution);
        assert!(tags_compatible(&a, &b));
        a.tags = vec!["api".into()];
        assert!(tags_compatible(&a, &b));
        b.tags = vec!["frontend".into()];
        assert!(!tags_compatible(&a, &b));
        b.tags = vec!["api".into(), "frontend".into()];
        assert!(tags_compatible(&a, &b));
    }
}
