//! Database schema for the libSQL metadata store.
//!
//! Scalar columns exist for everything the store filters or sweeps on;
//! the full record travels in a JSON `payload` column so the Rust types
//! stay the single source of truth for shape.

/// SQL to create the projects table
pub const CREATE_PROJECTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS projects (
    project_id TEXT PRIMARY KEY NOT NULL
        CHECK (length(project_id) BETWEEN 1 AND 100),
    dimension INTEGER NOT NULL,
    retention_days INTEGER NOT NULL,
    payload TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
)
";

/// SQL to create the chunks table
pub const CREATE_CHUNKS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS chunks (
    project_id TEXT NOT NULL
        CHECK (length(project_id) BETWEEN 1 AND 100)
        REFERENCES projects(project_id),
    chunk_id TEXT NOT NULL,
    session_id TEXT,
    chunk_type TEXT NOT NULL,
    created_at_epoch INTEGER NOT NULL,
    state TEXT NOT NULL,
    stale INTEGER NOT NULL DEFAULT 0,
    deleted_at_epoch INTEGER,
    payload TEXT NOT NULL,
    PRIMARY KEY (project_id, chunk_id)
)
";

/// SQL to create the sessions table
pub const CREATE_SESSIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    project_id TEXT NOT NULL
        CHECK (length(project_id) BETWEEN 1 AND 100),
    session_id TEXT NOT NULL,
    started_at_epoch INTEGER NOT NULL,
    status TEXT NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (project_id, session_id)
)
";

/// SQL to create the patterns table
pub const CREATE_PATTERNS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS patterns (
    pattern_id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL
        CHECK (length(project_id) BETWEEN 1 AND 100),
    signature TEXT NOT NULL,
    payload TEXT NOT NULL
)
";

/// SQL to create the conflicts table
pub const CREATE_CONFLICTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS conflicts (
    conflict_id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL
        CHECK (length(project_id) BETWEEN 1 AND 100),
    detected_at_epoch INTEGER NOT NULL,
    payload TEXT NOT NULL
)
";

/// SQL to create the audit_events table
pub const CREATE_AUDIT_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS audit_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp_epoch INTEGER NOT NULL,
    actor TEXT NOT NULL,
    action TEXT NOT NULL,
    resource TEXT NOT NULL,
    project_id TEXT,
    success INTEGER NOT NULL,
    payload TEXT NOT NULL
)
";

/// Index on chunks for chronological range filters
pub const CREATE_CHUNKS_EPOCH_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_chunks_project_epoch
ON chunks(project_id, created_at_epoch DESC)
";

/// Index on chunks for the pending-rollback sweeper
pub const CREATE_CHUNKS_STATE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_chunks_state
ON chunks(state, created_at_epoch)
";

/// Index on audit events for project history queries
pub const CREATE_AUDIT_PROJECT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_audit_project
ON audit_events(project_id, timestamp_epoch DESC)
";

/// All statements needed to bring a database up to the current schema.
pub const ALL_STATEMENTS: &[&str] = &[
    CREATE_PROJECTS_TABLE,
    CREATE_CHUNKS_TABLE,
    CREATE_SESSIONS_TABLE,
    CREATE_PATTERNS_TABLE,
    CREATE_CONFLICTS_TABLE,
    CREATE_AUDIT_TABLE,
    CREATE_CHUNKS_EPOCH_INDEX,
    CREATE_CHUNKS_STATE_INDEX,
    CREATE_AUDIT_PROJECT_INDEX,
];
