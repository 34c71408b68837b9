//! Chunk emission: deciding when accumulated conversation becomes a stored
//! unit, and shaping that unit's content, summary, and tags.
//!
//! The chunker is pure CPU and never suspends. It has two entry points:
//! [`Chunker::offer`], which watches an evolving [`FlowContext`] and fires on
//! one of the five emission triggers, and [`Chunker::prepare`], which applies
//! the same normalization and length policy to explicitly stored content.

mod split;

pub use split::split_content;

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::types::{ChunkInput, ChunkType, Difficulty, Outcome};

/// Tool-usage histograms more dissimilar than this count as a sharp shift.
const TOOL_SHIFT_SIMILARITY: f64 = 0.5;

/// Phase of the conversation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowPhase {
    #[default]
    Problem,
    Exploration,
    Implementation,
    Verification,
}

/// Evolving view of a conversation the chunker watches.
#[derive(Debug, Clone, Default)]
pub struct FlowContext {
    pub project_id: String,
    pub session_id: Option<String>,
    pub chunk_type: Option<ChunkType>,
    /// Accumulated content since the last emission
    pub content: String,
    pub tags: Vec<String>,
    pub outcome: Outcome,
    pub difficulty: Difficulty,
    pub phase: FlowPhase,
    /// Current working topic, used for sustained-work detection
    pub topic: String,
    /// Distinct files modified since the last emission
    pub files_modified: BTreeSet<String>,
    /// A todo/task item transitioned to completed since the last emission
    pub task_completed: bool,
    /// Project of the previous flow step, if any
    pub previous_project: Option<String>,
    /// Tool-usage histogram of the current window
    pub tool_counts: HashMap<String, u32>,
    /// Tool-usage histogram of the previous window
    pub prev_tool_counts: HashMap<String, u32>,
    pub problem_started_at: Option<DateTime<Utc>>,
    pub topic_started_at: Option<DateTime<Utc>>,
    pub last_emission_at: Option<DateTime<Utc>>,
}

/// Which rule fired an emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitTrigger {
    TaskCompleted,
    FileThreshold,
    VerificationReached,
    ContextSwitch,
    SustainedTopic,
}

/// A chunk shaped by the chunker, before ids and embeddings exist.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub chunk_type: ChunkType,
    pub content: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub outcome: Outcome,
    pub difficulty: Difficulty,
    pub quality: f32,
}

/// An emission: one or more drafts plus the trigger that fired.
#[derive(Debug, Clone)]
pub struct Emission {
    pub trigger: Option<EmitTrigger>,
    pub drafts: Vec<ChunkDraft>,
}

/// Stateless emission policy over flow contexts and explicit inputs.
#[derive(Debug, Clone)]
pub struct Chunker {
    settings: ChunkingSettings,
}

impl Chunker {
    #[must_use]
    pub fn new(settings: ChunkingSettings) -> Self {
        Self { settings }
    }

    /// Decide whether `ctx` should be frozen into chunks right now.
    ///
    /// Returns `Ok(None)` when no trigger fires or the accumulated content is
    /// still below the minimum length (deferred, not dropped).
    pub fn offer(&self, ctx: &FlowContext) -> Result<Option<Emission>> {
        self.offer_at(ctx, Utc::now())
    }

    /// [`Chunker::offer`] with an explicit clock, for tests.
    pub fn offer_at(&self, ctx: &FlowContext, now: DateTime<Utc>) -> Result<Option<Emission>> {
        let Some(trigger) = self.evaluate_triggers(ctx, now) else {
            return Ok(None);
        };

        let normalized = normalize(&ctx.content);
        if normalized.is_empty() {
            return Err(Error::InvalidContent(
                "content is empty after normalization".into(),
            ));
        }
        if normalized.len() < self.settings.min_content_length {
            tracing::debug!(
                len = normalized.len(),
                min = self.settings.min_content_length,
                "deferring emission below minimum content length"
            );
            return Ok(None);
        }

        let chunk_type = ctx.chunk_type.unwrap_or(ChunkType::Discussion);
        let drafts = self.shape(
            &normalized,
            chunk_type,
            &ctx.tags,
            ctx.outcome,
            ctx.difficulty,
        );
        Ok(Some(Emission {
            trigger: Some(trigger),
            drafts,
        }))
    }

    /// Apply normalization and length policy to explicitly stored content.
    ///
    /// Deferred content (below the minimum length) yields an emission with no
    /// drafts; over-long content yields multiple drafts whose concatenated
    /// content equals the normalized input.
    pub fn prepare(&self, input: &ChunkInput) -> Result<Emission> {
        let normalized = normalize(&input.content);
        if normalized.is_empty() {
            return Err(Error::InvalidContent(
                "content is empty after normalization".into(),
            ));
        }
        if normalized.len() < self.settings.min_content_length {
            return Ok(Emission {
                trigger: None,
                drafts: Vec::new(),
            });
        }
        let drafts = self.shape(
            &normalized,
            input.chunk_type,
            &input.tags,
            input.outcome,
            input.difficulty,
        );
        Ok(Emission {
            trigger: None,
            drafts,
        })
    }

    fn evaluate_triggers(&self, ctx: &FlowContext, now: DateTime<Utc>) -> Option<EmitTrigger> {
        if ctx.task_completed {
            return Some(EmitTrigger::TaskCompleted);
        }
        if ctx.files_modified.len() >= self.settings.file_change_threshold {
            return Some(EmitTrigger::FileThreshold);
        }
        if ctx.phase == FlowPhase::Verification {
            if let Some(problem_at) = ctx.problem_started_at {
                let elapsed = (now - problem_at).num_seconds().max(0) as u64;
                if elapsed >= self.settings.verification_min_secs {
                    return Some(EmitTrigger::VerificationReached);
                }
            }
        }
        if self.context_switched(ctx) {
            return Some(EmitTrigger::ContextSwitch);
        }
        if let Some(topic_at) = ctx.topic_started_at {
            let elapsed = (now - topic_at).num_seconds().max(0) as u64;
            let emitted_since = ctx
                .last_emission_at
                .is_some_and(|emitted| emitted >= topic_at);
            if elapsed >= self.settings.sustained_topic_secs && !emitted_since {
                return Some(EmitTrigger::SustainedTopic);
            }
        }
        None
    }

    fn context_switched(&self, ctx: &FlowContext) -> bool {
        if let Some(previous) = &ctx.previous_project {
            if previous != &ctx.project_id {
                return true;
            }
        }
        if ctx.tool_counts.is_empty() || ctx.prev_tool_counts.is_empty() {
            return false;
        }
        histogram_similarity(&ctx.tool_counts, &ctx.prev_tool_counts) < TOOL_SHIFT_SIMILARITY
    }

    fn shape(
        &self,
        content: &str,
        chunk_type: ChunkType,
        tags: &[String],
        outcome: Outcome,
        difficulty: Difficulty,
    ) -> Vec<ChunkDraft> {
        let pieces = split_content(
            content,
            self.settings.max_content_length,
            self.settings.strategy,
        );
        pieces
            .into_iter()
            .map(|piece| {
                let summary = summarize(&piece);
                let mut merged = tags.to_vec();
                for tag in derive_tags(&piece) {
                    if !merged.contains(&tag) {
                        merged.push(tag);
                    }
                }
                let quality = assess_quality(&piece);
                ChunkDraft {
                    chunk_type,
                    content: piece,
                    summary,
                    tags: merged,
                    outcome,
                    difficulty,
                    quality,
                }
            })
            .collect()
    }
}

/// Collapse line endings and trim surrounding whitespace.
fn normalize(content: &str) -> String {
    content.replace("\r\n", "\n").trim().to_string()
}

/// First sentence, capped at 160 characters.
fn summarize(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or_default();
    let sentence_end = first_line
        .char_indices()
        .find(|(i, c)| {
            matches!(c, '.' | '!' | '?')
                && first_line[i + c.len_utf8()..]
                    .chars()
                    .next()
                    .is_none_or(char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8());
    let head = sentence_end.map_or(first_line, |end| &first_line[..end]);
    if head.len() <= 160 {
        head.to_string()
    } else {
        let mut cut = 157;
        while cut > 0 && !head.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &head[..cut])
    }
}

const STOPWORDS: &[&str] = &[
    "about", "after", "because", "before", "could", "should", "their", "there", "these", "thing",
    "those", "using", "where", "which", "while", "would",
];

/// Frequent long words in the content, as fallback tags.
fn derive_tags(content: &str) -> Vec<String> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for word in content.split(|c: char| !c.is_alphanumeric()) {
        if word.len() < 5 {
            continue;
        }
        let lower = word.to_lowercase();
        if STOPWORDS.contains(&lower.as_str()) {
            continue;
        }
        *counts.entry(lower).or_default() += 1;
    }
    let mut repeated: Vec<(String, u32)> = counts.into_iter().filter(|(_, n)| *n >= 2).collect();
    repeated.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    repeated.into_iter().take(5).map(|(w, _)| w).collect()
}

/// Rough structural quality score in [0, 1].
fn assess_quality(content: &str) -> f32 {
    let mut score: f32 = 0.4;
    if content.len() >= 200 {
        score += 0.2;
    }
    if content.lines().count() > 1 {
        score += 0.1;
    }
    if content.contains("```") || content.contains("fn ") || content.contains("::") {
        score += 0.2;
    }
    if content.split_whitespace().count() >= 20 {
        score += 0.1;
    }
    score.min(1.0)
}

/// Cosine similarity between two sparse count histograms.
fn histogram_similarity(a: &HashMap<String, u32>, b: &HashMap<String, u32>) -> f64 {
    let mut dot = 0.0;
    for (key, &count_a) in a {
        if let Some(&count_b) = b.get(key) {
            dot += f64::from(count_a) * f64::from(count_b);
        }
    }
    let norm_a: f64 = a.values().map(|&v| f64::from(v).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|&v| f64::from(v).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn chunker() -> Chunker {
        Chunker::new(ChunkingSettings::default())
    }

    fn base_ctx() -> FlowContext {
        FlowContext {
            project_id: "acme/api".into(),
            session_id: Some("s1".into()),
            chunk_type: Some(ChunkType::Solution),
            content: "Connection pool exhaustion was fixed by bounding acquire with a deadline \
                      and surfacing pool metrics."
                .into(),
            ..Default::default()
        }
    }

    #[test]
    fn no_trigger_no_emission() {
        let emission = chunker().offer(&base_ctx()).expect("offer");
        assert!(emission.is_none());
    }

    #[test]
    fn task_completion_fires() {
        let mut ctx = base_ctx();
        ctx.task_completed = true;
        let emission = chunker().offer(&ctx).expect("offer").expect("emission");
        assert_eq!(emission.trigger, Some(EmitTrigger::TaskCompleted));
        assert_eq!(emission.drafts.len(), 1);
    }

    #[test]
    fn file_threshold_fires_at_default_three() {
        let mut ctx = base_ctx();
        ctx.files_modified.insert("a.rs".into());
        ctx.files_modified.insert("b.rs".into());
        assert!(chunker().offer(&ctx).expect("offer").is_none());
        ctx.files_modified.insert("c.rs".into());
        let emission = chunker().offer(&ctx).expect("offer").expect("emission");
        assert_eq!(emission.trigger, Some(EmitTrigger::FileThreshold));
    }

    #[test]
    fn verification_requires_five_minutes_since_problem() {
        let now = Utc::now();
        let mut ctx = base_ctx();
        ctx.phase = FlowPhase::Verification;
        ctx.problem_started_at = Some(now - Duration::seconds(299));
        assert!(chunker().offer_at(&ctx, now).expect("offer").is_none());
        ctx.problem_started_at = Some(now - Duration::seconds(300));
        let emission = chunker()
            .offer_at(&ctx, now)
            .expect("offer")
            .expect("emission");
        assert_eq!(emission.trigger, Some(EmitTrigger::VerificationReached));
    }

    #[test]
    fn project_change_is_a_context_switch() {
        let mut ctx = base_ctx();
        ctx.previous_project = Some("acme/web".into());
        let emission = chunker().offer(&ctx).expect("offer").expect("emission");
        assert_eq!(emission.trigger, Some(EmitTrigger::ContextSwitch));
    }

    #[test]
    fn sharp_tool_shift_is_a_context_switch() {
        let mut ctx = base_ctx();
        ctx.tool_counts = HashMap::from([("editor".into(), 9), ("test".into(), 1)]);
        ctx.prev_tool_counts = HashMap::from([("browser".into(), 8), ("search".into(), 4)]);
        let emission = chunker().offer(&ctx).expect("offer").expect("emission");
        assert_eq!(emission.trigger, Some(EmitTrigger::ContextSwitch));
    }

    #[test]
    fn sustained_topic_fires_after_ten_minutes() {
        let now = Utc::now();
        let mut ctx = base_ctx();
        ctx.topic_started_at = Some(now - Duration::seconds(600));
        let emission = chunker()
            .offer_at(&ctx, now)
            .expect("offer")
            .expect("emission");
        assert_eq!(emission.trigger, Some(EmitTrigger::SustainedTopic));

        // Already emitted for this topic: stay quiet.
        ctx.last_emission_at = Some(now - Duration::seconds(10));
        assert!(chunker().offer_at(&ctx, now).expect("offer").is_none());
    }

    #[test]
    fn empty_content_is_invalid() {
        let mut ctx = base_ctx();
        ctx.task_completed = true;
        ctx.content = "  \r\n \n ".into();
        let err = chunker().offer(&ctx).expect_err("invalid content");
        assert_eq!(err.code(), "invalid_content");
    }

    #[test]
    fn short_content_is_deferred_not_rejected() {
        let mut ctx = base_ctx();
        ctx.task_completed = true;
        ctx.content = "tiny note".into();
        assert!(chunker().offer(&ctx).expect("offer").is_none());
    }

    #[test]
    fn prepare_boundary_at_min_length() {
        let settings = ChunkingSettings::default();
        let min = settings.min_content_length;
        let chunker = Chunker::new(settings);

        let below = ChunkInput {
            project_id: "acme/api".into(),
            session_id: Some("s1".into()),
            chunk_type: ChunkType::Discussion,
            content: "x".repeat(min - 1),
            summary: None,
            tags: vec![],
            outcome: Outcome::InProgress,
            difficulty: Difficulty::Simple,
            supersedes: None,
            visibility: Default::default(),
        };
        assert!(chunker.prepare(&below).expect("prepare").drafts.is_empty());

        let at = ChunkInput {
            content: "x".repeat(min),
            ..below
        };
        assert_eq!(chunker.prepare(&at).expect("prepare").drafts.len(), 1);
    }

    #[test]
    fn overlong_content_splits_losslessly() {
        let settings = ChunkingSettings {
            max_content_length: 100,
            ..ChunkingSettings::default()
        };
        let chunker = Chunker::new(settings);
        let paragraph = "The retry budget was exhausted during the rollout. ";
        let content = paragraph.repeat(5);
        let input = ChunkInput {
            project_id: "acme/api".into(),
            session_id: Some("s1".into()),
            chunk_type: ChunkType::Problem,
            content: content.clone(),
            summary: None,
            tags: vec![],
            outcome: Outcome::InProgress,
            difficulty: Difficulty::Moderate,
            supersedes: None,
            visibility: Default::default(),
        };
        let emission = chunker.prepare(&input).expect("prepare");
        assert!(emission.drafts.len() >= 2);
        let rejoined: String = emission
            .drafts
            .iter()
            .map(|d| d.content.as_str())
            .collect();
        assert_eq!(rejoined, content.trim());
    }

    #[test]
    fn summaries_stop_at_first_sentence() {
        assert_eq!(
            summarize("Use pooling. It keeps latency flat."),
            "Use pooling."
        );
    }

    #[test]
    fn derived_tags_require_repetition() {
        let tags = derive_tags("pooling helps; pooling bounds latency under pressure");
        assert!(tags.contains(&"pooling".to_string()));
        assert!(!tags.contains(&"latency".to_string()));
    }
}
