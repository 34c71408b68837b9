use uuid::Uuid;

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the memory service.
///
/// Every variant carries a stable machine code (see [`Error::code`]) and a
/// human message; messages for caller mistakes include a remediation hint.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameters at {path}: {message}")]
    InvalidParams {
        /// JSON path into the offending field, e.g. `parameters.end_time`
        path: String,
        message: String,
    },

    #[error("invalid scope: {0}; write operations require a session_id — supplying one expands access rather than restricting it")]
    InvalidScope(String),

    #[error("invalid content: {0}")]
    InvalidContent(String),

    #[error("not found: {0}")]
    NotFound(Uuid),

    #[error("access denied to {resource} in project {project_id}")]
    AccessDenied { resource: String, project_id: String },

    #[error("conflict with existing state: {0}; resolve the surfaced conflict record before retrying")]
    Conflict(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    Deadline,

    #[error("connection pool exhausted for {0}")]
    PoolExhausted(String),

    #[error("{dependency} unavailable: {reason}")]
    Unavailable { dependency: String, reason: String },

    #[error("integrity check failed: {0}")]
    Corrupted(String),

    #[error("internal error [{correlation_id}]: {message}")]
    Internal {
        correlation_id: Uuid,
        message: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("embedding provider error: {message}")]
    Provider { message: String, transient: bool },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an internal logic failure with a fresh correlation id.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            correlation_id: Uuid::new_v4(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for wire protocols and logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidParams { .. } => "invalid_params",
            Error::InvalidScope(_) => "invalid_scope",
            Error::InvalidContent(_) => "invalid_content",
            Error::NotFound(_) => "not_found",
            Error::AccessDenied { .. } => "access_denied",
            Error::Conflict(_) => "conflict",
            Error::Cancelled => "cancelled",
            Error::Deadline => "deadline",
            Error::PoolExhausted(_) => "pool_exhausted",
            Error::Unavailable { .. } => "unavailable",
            Error::Corrupted(_) => "corrupted",
            Error::Internal { .. } => "internal",
            Error::Storage(_) => "storage",
            Error::Provider { .. } => "provider",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
        }
    }

    /// Check if this error is recoverable (can retry with backoff).
    ///
    /// Transient dependency failures retry; caller mistakes and terminal
    /// states do not.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::InvalidParams { .. } => false,
            Error::InvalidScope(_) => false,
            Error::InvalidContent(_) => false,
            Error::NotFound(_) => false,
            Error::AccessDenied { .. } => false,
            Error::Conflict(_) => false,
            Error::Cancelled => false,
            Error::Deadline => false,
            Error::PoolExhausted(_) => true,
            Error::Unavailable { .. } => false,
            Error::Corrupted(_) => false,
            Error::Internal { .. } => false,
            Error::Storage(_) => true,
            Error::Provider { transient, .. } => *transient,
            Error::Serialization(_) => false,
            Error::Io(_) => true,
        }
    }
}
