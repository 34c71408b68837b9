use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// Validation Constants
// ============================================================================

/// Maximum length for a project identifier.
pub const MAX_PROJECT_ID_LEN: usize = 100;

/// Maximum length for raw chunk content (64KB).
///
/// Prevents unbounded input strings from exhausting memory during
/// embedding and storage; longer conversations are split by the chunker
/// before they reach this bound.
pub const MAX_CONTENT_LEN: usize = 65_536;

/// Maximum number of tags on a single chunk.
pub const MAX_TAG_COUNT: usize = 32;

/// Maximum length of a single tag.
pub const MAX_TAG_LEN: usize = 64;

/// Maximum traversal depth when resolving related-chunk graphs.
pub const MAX_RELATION_DEPTH: usize = 5;

fn project_id_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9._/:\-]+$").unwrap_or_else(|e| {
            // The pattern is a compile-time constant; this cannot fail.
            unreachable!("project id regex failed to compile: {e}")
        })
    })
}

/// Validate a project identifier against the tenant-boundary format:
/// 1–100 characters drawn from `[A-Za-z0-9._/:\-]`.
pub fn validate_project_id(project_id: &str) -> Result<()> {
    if project_id.is_empty() || project_id.len() > MAX_PROJECT_ID_LEN {
        return Err(Error::InvalidParams {
            path: "project_id".into(),
            message: format!(
                "must be 1-{MAX_PROJECT_ID_LEN} characters, got {}",
                project_id.len()
            ),
        });
    }
    if !project_id_regex().is_match(project_id) {
        return Err(Error::InvalidParams {
            path: "project_id".into(),
            message: "allowed characters are A-Z a-z 0-9 . _ / : -".into(),
        });
    }
    Ok(())
}

// ============================================================================
// Chunk Types
// ============================================================================

/// Classification of a stored memory chunk.
///
/// The type drives decay half-life selection and conflict detection:
/// decisions decay slowly and are probed for contradictions, discussions
/// fade within days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    /// A problem statement or bug report
    Problem,
    /// A working solution or fix
    Solution,
    /// A concrete code change description
    CodeChange,
    /// Free-form discussion
    Discussion,
    /// An architectural decision with long-lived consequences
    ArchitectureDecision,
}

impl ChunkType {
    /// All chunk types, for iteration in sweeps and config defaults.
    pub const ALL: [ChunkType; 5] = [
        ChunkType::Problem,
        ChunkType::Solution,
        ChunkType::CodeChange,
        ChunkType::Discussion,
        ChunkType::ArchitectureDecision,
    ];
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkType::Problem => write!(f, "problem"),
            ChunkType::Solution => write!(f, "solution"),
            ChunkType::CodeChange => write!(f, "code_change"),
            ChunkType::Discussion => write!(f, "discussion"),
            ChunkType::ArchitectureDecision => write!(f, "architecture_decision"),
        }
    }
}

impl std::str::FromStr for ChunkType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "problem" => Ok(ChunkType::Problem),
            "solution" => Ok(ChunkType::Solution),
            "code_change" => Ok(ChunkType::CodeChange),
            "discussion" => Ok(ChunkType::Discussion),
            "architecture_decision" => Ok(ChunkType::ArchitectureDecision),
            other => Err(Error::InvalidParams {
                path: "type".into(),
                message: format!("unknown chunk type '{other}'"),
            }),
        }
    }
}

/// Outcome recorded on a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The described work succeeded
    Success,
    /// Work is still ongoing
    #[default]
    InProgress,
    /// The described work failed
    Failed,
    /// Superseded or dropped; set by conflict auto-resolution
    Abandoned,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::InProgress => write!(f, "in_progress"),
            Outcome::Failed => write!(f, "failed"),
            Outcome::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Difficulty classification of the work a chunk describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Simple,
    #[default]
    Moderate,
    Complex,
}

/// Where the embedding of a chunk came from.
///
/// Fallback embeddings are produced by the deterministic hash embedder when
/// the primary provider is unavailable; retrieval deprioritizes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Primary,
    Fallback,
}

/// Who can read a chunk.
///
/// Writes always happen inside a session, but the resulting chunk is
/// project-visible by default; marking it session-visible keeps it private
/// to readers that supply the same `session_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Project,
    Session,
}

/// Two-step write state of a chunk row.
///
/// Rows are inserted `pending`, promoted to `live` once the vector write
/// lands, and rolled back otherwise. Readers ignore `pending` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    Pending,
    #[default]
    Live,
}

/// The atomic unit of memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Opaque, globally unique, immutable identifier
    pub id: Uuid,
    /// Tenant boundary; immutable after creation
    pub project_id: String,
    /// Present iff the chunk was written in a session-scoped operation
    pub session_id: Option<String>,
    /// Chunk classification
    pub chunk_type: ChunkType,
    /// Raw text
    pub content: String,
    /// Short abstract for quick scanning
    pub summary: String,
    /// Free-form tags
    pub tags: Vec<String>,
    /// Outcome of the described work
    pub outcome: Outcome,
    /// Difficulty of the described work
    pub difficulty: Difficulty,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Creation time as epoch seconds; the only field range filters may use
    pub created_at_epoch: i64,
    /// Embedding vector; length equals the project's configured dimension
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Which embedder produced the vector
    #[serde(default)]
    pub provenance: Provenance,
    /// Weak references to other chunks, by id only
    #[serde(default)]
    pub related_chunks: Vec<Uuid>,
    /// Back-reference to the first sibling when content was split
    #[serde(default)]
    pub parent: Option<Uuid>,
    /// Explicit supersession target, when the writer declared one
    #[serde(default)]
    pub supersedes: Option<Uuid>,
    /// Read visibility
    #[serde(default)]
    pub visibility: Visibility,
    /// Content quality score in [0, 1]
    pub quality: f32,
    /// Confidence score in [0, 1]; multiplies into the retrieval rank
    pub confidence: f32,
    /// Last explicit freshness boost
    #[serde(default)]
    pub last_refreshed: Option<DateTime<Utc>>,
    /// Set by the decay sweep when freshness falls below threshold
    #[serde(default)]
    pub stale: bool,
    /// Two-step write state
    #[serde(default)]
    pub state: ChunkState,
    /// Soft-delete tombstone; purged after the retention window
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Chunk {
    /// Whether this chunk is visible to readers.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state == ChunkState::Live && self.deleted_at.is_none()
    }

    /// Age in fractional days relative to `now`, floored at zero.
    #[must_use]
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        let reference = self.last_refreshed.unwrap_or(self.created_at);
        let secs = (now - reference).num_seconds().max(0) as f64;
        secs / 86_400.0
    }
}

/// Caller-supplied material for a store operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInput {
    pub project_id: String,
    pub session_id: Option<String>,
    pub chunk_type: ChunkType,
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Explicit supersession target for decisions; short-circuits the
    /// marker heuristic in conflict detection
    #[serde(default)]
    pub supersedes: Option<Uuid>,
    /// Read visibility; defaults to project-visible
    #[serde(default)]
    pub visibility: Visibility,
}

impl ChunkInput {
    /// Basic field validation before the chunker runs.
    pub fn validate(&self) -> Result<()> {
        validate_project_id(&self.project_id)?;
        if self.content.len() > MAX_CONTENT_LEN {
            return Err(Error::InvalidParams {
                path: "content".into(),
                message: format!("content exceeds {MAX_CONTENT_LEN} bytes"),
            });
        }
        if self.tags.len() > MAX_TAG_COUNT {
            return Err(Error::InvalidParams {
                path: "tags".into(),
                message: format!("at most {MAX_TAG_COUNT} tags allowed"),
            });
        }
        if let Some(tag) = self.tags.iter().find(|t| t.len() > MAX_TAG_LEN) {
            return Err(Error::InvalidParams {
                path: "tags".into(),
                message: format!("tag '{tag}' exceeds {MAX_TAG_LEN} characters"),
            });
        }
        Ok(())
    }
}

/// Mutation delta for an update operation.
///
/// Only the listed fields are mutable; `None` leaves a field untouched.
/// An all-`None` delta is a no-op and does not re-embed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    pub content: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub outcome: Option<Outcome>,
    pub difficulty: Option<Difficulty>,
}

impl ChunkDelta {
    /// True when the delta mutates nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.summary.is_none()
            && self.tags.is_none()
            && self.outcome.is_none()
            && self.difficulty.is_none()
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Paused,
    Completed,
    Abandoned,
    Interrupted,
}

/// Activity counters tracked over a session's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub tasks_touched: u32,
    pub files_changed: u32,
    pub ai_interactions: u32,
}

/// A bounded period of related activity within a project.
///
/// Mutable only while `Active`; ending a session computes a derived
/// productivity score and freezes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub summary: String,
    pub goals: Vec<String>,
    pub metrics: SessionMetrics,
    pub status: SessionStatus,
    /// Derived on `end`; None while the session is open
    pub productivity_score: Option<f64>,
}

impl Session {
    /// Start a new active session.
    #[must_use]
    pub fn start(id: String, project_id: String, goals: Vec<String>) -> Self {
        Self {
            id,
            project_id,
            started_at: Utc::now(),
            ended_at: None,
            summary: String::new(),
            goals,
            metrics: SessionMetrics::default(),
            status: SessionStatus::Active,
            productivity_score: None,
        }
    }

    /// Whether mutation is currently permitted.
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

// ============================================================================
// Project
// ============================================================================

/// A logical tenant, created lazily on first write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    /// Embedding dimension, locked at creation
    pub dimension: usize,
    /// Soft-delete retention window in days
    pub retention_days: u32,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Derived Entities (owned by the intelligence layer)
// ============================================================================

/// Kind of signature a pattern matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Ordered sequence of chunk types within a session
    TypeSequence,
    /// Recurring tag multiset
    TagCluster,
    /// Cross-session workflow signature
    Workflow,
}

/// Lifecycle status of a detected pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    /// Below the confidence threshold, held in the validation queue
    #[default]
    Candidate,
    /// Above threshold and persisted
    Validated,
    /// Superseded by a more specific descendant
    Evolved,
}

/// A recurring signature over chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: Uuid,
    pub project_id: String,
    pub pattern_type: PatternType,
    /// Canonical matching signature, e.g. `problem>solution>code_change`
    pub signature: String,
    pub occurrences: u32,
    pub positive: u32,
    pub negative: u32,
    pub parent: Option<Uuid>,
    pub status: PatternStatus,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Pattern {
    /// Bayesian confidence with a uniform prior:
    /// `(positive + 1) / (positive + negative + 2)`.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        f64::from(self.positive + 1) / f64::from(self.positive + self.negative + 2)
    }
}

/// Severity of a detected contradiction between two chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    /// The newer chunk strictly supersedes the older one
    AutoResolvable,
    /// Both chunks stay live; callers must resolve
    Manual,
}

/// A detected contradiction between two chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: Uuid,
    pub project_id: String,
    pub chunk_a: Uuid,
    pub chunk_b: Uuid,
    pub severity: ConflictSeverity,
    /// Strategy applied once resolved, e.g. `superseded`
    pub resolution: Option<String>,
    pub detected_at: DateTime<Utc>,
}

// ============================================================================
// Audit
// ============================================================================

/// Immutable append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    /// Who performed the action (client id, subsystem name)
    pub actor: String,
    /// What was done, e.g. `store_content`
    pub action: String,
    /// Identifier of the touched resource
    pub resource: String,
    pub project_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
}

impl AuditEvent {
    /// Convenience constructor stamped with the current time.
    #[must_use]
    pub fn now(actor: &str, action: &str, resource: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            actor: actor.to_string(),
            action: action.to_string(),
            resource: resource.to_string(),
            project_id: None,
            success: true,
            details: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_project(mut self, project_id: &str) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }

    #[must_use]
    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: &str, value: serde_json::Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

// ============================================================================
// Scope
// ============================================================================

/// Access scope of a dispatched operation.
///
/// Session scope requires both identifiers and is mandatory for writes;
/// project scope requires the project only; global scope requires neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Session,
    Project,
    Global,
}
