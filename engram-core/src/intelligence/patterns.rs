//! Signature-based pattern mining.
//!
//! Signatures are derived from per-session chunk-type sequences and
//! recurring tag multisets. Confidence follows the Bayesian rule
//! `(positive + 1) / (positive + negative + 2)`; each observation counts
//! as implicit positive feedback, explicit feedback can push either way.
//! Candidates sit in a validation queue until they clear both the
//! occurrence and confidence thresholds.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::config::IntelligenceSettings;
use crate::types::{Chunk, ChunkType, Pattern, PatternStatus, PatternType};

/// A derived signature for one chunk observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub pattern_type: PatternType,
    pub value: String,
}

/// Derive signatures from a chunk in the context of its session's
/// type history (oldest first, including this chunk).
#[must_use]
pub fn derive_signatures(chunk: &Chunk, session_types: &[ChunkType]) -> Vec<Signature> {
    let mut signatures = Vec::new();

    if session_types.len() >= 2 {
        let window: Vec<String> = session_types
            .iter()
            .rev()
            .take(4)
            .rev()
            .map(ToString::to_string)
            .collect();
        signatures.push(Signature {
            pattern_type: PatternType::TypeSequence,
            value: window.join(">"),
        });
    }

    if chunk.tags.len() >= 2 {
        let mut tags: Vec<String> = chunk
            .tags
            .iter()
            .filter(|t| !t.starts_with("thread:"))
            .cloned()
            .collect();
        tags.sort();
        tags.dedup();
        if tags.len() >= 2 {
            signatures.push(Signature {
                pattern_type: PatternType::TagCluster,
                value: tags.join("+"),
            });
        }
    }

    signatures
}

/// Whole-session workflow signature, derived when a session ends.
#[must_use]
pub fn workflow_signature(session_types: &[ChunkType]) -> Option<Signature> {
    if session_types.len() < 2 {
        return None;
    }
    Some(Signature {
        pattern_type: PatternType::Workflow,
        value: session_types
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(">"),
    })
}

#[derive(Default)]
struct MinerState {
    /// `(project_id, signature)` → pattern
    patterns: HashMap<(String, String), Pattern>,
    /// Chunk ids already observed, for at-least-once event replay
    processed: HashSet<Uuid>,
}

/// In-memory pattern state with copy-on-read snapshots.
pub struct PatternMiner {
    settings: IntelligenceSettings,
    state: RwLock<MinerState>,
}

impl PatternMiner {
    #[must_use]
    pub fn new(settings: IntelligenceSettings) -> Self {
        Self {
            settings,
            state: RwLock::new(MinerState::default()),
        }
    }

    /// Observe one chunk's signatures. Replayed observations of the same
    /// chunk are no-ops. Returns patterns that just crossed into
    /// `Validated`, for persistence and event publication.
    pub fn observe(
        &self,
        project_id: &str,
        chunk_id: Uuid,
        signatures: &[Signature],
    ) -> Vec<Pattern> {
        let mut state = self.state.write();
        if !state.processed.insert(chunk_id) {
            return Vec::new();
        }

        let mut newly_validated = Vec::new();
        for signature in signatures {
            let key = (project_id.to_string(), signature.value.clone());
            let now = Utc::now();
            let pattern = state.patterns.entry(key).or_insert_with(|| Pattern {
                id: Uuid::new_v4(),
                project_id: project_id.to_string(),
                pattern_type: signature.pattern_type,
                signature: signature.value.clone(),
                occurrences: 0,
                positive: 0,
                negative: 0,
                parent: None,
                status: PatternStatus::Candidate,
                first_seen: now,
                last_seen: now,
            });
            pattern.occurrences += 1;
            pattern.positive += 1;
            pattern.last_seen = now;

            if pattern.status == PatternStatus::Candidate
                && pattern.occurrences >= self.settings.pattern_min_occurrences
                && pattern.confidence() >= self.settings.pattern_min_confidence
            {
                pattern.status = PatternStatus::Validated;
                newly_validated.push(pattern.clone());
            }
        }

        // A newly validated pattern that strictly extends an existing
        // validated one supersedes it: parent link forward, old marked
        // evolved.
        for validated in &mut newly_validated {
            let ancestor = state
                .patterns
                .values()
                .filter(|p| {
                    p.project_id == project_id
                        && p.status == PatternStatus::Validated
                        && p.id != validated.id
                        && p.pattern_type == validated.pattern_type
                        && validated.signature.starts_with(&p.signature)
                        && validated.signature.len() > p.signature.len()
                })
                .max_by_key(|p| p.signature.len())
                .map(|p| p.id);
            if let Some(parent_id) = ancestor {
                validated.parent = Some(parent_id);
                if let Some(stored) = state
                    .patterns
                    .values_mut()
                    .find(|p| p.id == validated.id)
                {
                    stored.parent = Some(parent_id);
                }
                if let Some(old) = state.patterns.values_mut().find(|p| p.id == parent_id) {
                    old.status = PatternStatus::Evolved;
                }
            }
        }

        newly_validated
    }

    /// Explicit feedback on a pattern's usefulness.
    pub fn feedback(&self, pattern_id: Uuid, positive: bool) -> Option<Pattern> {
        let mut state = self.state.write();
        let pattern = state.patterns.values_mut().find(|p| p.id == pattern_id)?;
        if positive {
            pattern.positive += 1;
        } else {
            pattern.negative += 1;
        }
        if pattern.status == PatternStatus::Validated
            && pattern.confidence() < self.settings.pattern_min_confidence
        {
            pattern.status = PatternStatus::Candidate;
        }
        Some(pattern.clone())
    }

    /// Copy-on-read snapshot of a project's patterns.
    #[must_use]
    pub fn snapshot(&self, project_id: &str) -> Vec<Pattern> {
        let state = self.state.read();
        let mut patterns: Vec<Pattern> = state
            .patterns
            .values()
            .filter(|p| p.project_id == project_id)
            .cloned()
            .collect();
        patterns.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| a.signature.cmp(&b.signature))
        });
        patterns
    }

    /// Candidates still waiting for validation.
    #[must_use]
    pub fn validation_queue(&self, project_id: &str) -> Vec<Pattern> {
        self.snapshot(project_id)
            .into_iter()
            .filter(|p| p.status == PatternStatus::Candidate)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> IntelligenceSettings {
        IntelligenceSettings {
            pattern_min_occurrences: 3,
            pattern_min_confidence: 0.6,
            ..IntelligenceSettings::default()
        }
    }

    fn sequence(value: &str) -> Vec<Signature> {
        vec![Signature {
            pattern_type: PatternType::TypeSequence,
            value: value.into(),
        }]
    }

    #[test]
    fn validation_needs_min_occurrences() {
        let miner = PatternMiner::new(settings());
        let sig = sequence("problem>solution");

        assert!(miner.observe("p", Uuid::new_v4(), &sig).is_empty());
        assert!(miner.observe("p", Uuid::new_v4(), &sig).is_empty());
        let validated = miner.observe("p", Uuid::new_v4(), &sig);
        assert_eq!(validated.len(), 1);
        assert_eq!(validated[0].status, PatternStatus::Validated);
        assert_eq!(validated[0].occurrences, 3);
    }

    #[test]
    fn replayed_observations_do_not_inflate_counts() {
        let miner = PatternMiner::new(settings());
        let chunk_id = Uuid::new_v4();
        let sig = sequence("problem>solution");

        miner.observe("p", chunk_id, &sig);
        miner.observe("p", chunk_id, &sig);
        miner.observe("p", chunk_id, &sig);

        let snapshot = miner.snapshot("p");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].occurrences, 1);
    }

    #[test]
    fn negative_feedback_can_demote() {
        let miner = PatternMiner::new(settings());
        let sig = sequence("problem>solution");
        let mut validated = Vec::new();
        for _ in 0..3 {
            validated = miner.observe("p", Uuid::new_v4(), &sig);
        }
        let pattern = validated.pop().expect("validated");

        // Confidence (3+1)/(3+0+2) = 0.8; drive it below 0.6.
        for _ in 0..3 {
            miner.feedback(pattern.id, false);
        }
        let demoted = miner.feedback(pattern.id, false).expect("pattern");
        assert!(demoted.confidence() < 0.6);
        assert_eq!(demoted.status, PatternStatus::Candidate);
    }

    #[test]
    fn more_specific_pattern_evolves_the_old_one() {
        let miner = PatternMiner::new(settings());
        let short = sequence("problem>solution");
        let long = sequence("problem>solution>code_change");

        for _ in 0..3 {
            miner.observe("p", Uuid::new_v4(), &short);
        }
        let mut validated = Vec::new();
        for _ in 0..3 {
            validated = miner.observe("p", Uuid::new_v4(), &long);
        }
        let new_pattern = validated.pop().expect("validated");
        assert!(new_pattern.parent.is_some());

        let snapshot = miner.snapshot("p");
        let old = snapshot
            .iter()
            .find(|p| p.signature == "problem>solution")
            .expect("old pattern");
        assert_eq!(old.status, PatternStatus::Evolved);
        assert_eq!(new_pattern.parent, Some(old.id));
    }

    #[test]
    fn signatures_from_session_history_and_tags() {
        let mut chunk = crate::intelligence::tests_support::chunk("p", ChunkType::Solution);
        chunk.tags = vec!["db".into(), "perf".into()];
        let signatures = derive_signatures(&chunk, &[ChunkType::Problem, ChunkType::Solution]);
        assert!(signatures.iter().any(|s| s.value == "problem>solution"));
        assert!(signatures.iter().any(|s| s.value == "db+perf"));
    }
}
