use thiserror::Error;

/// Unified error type for the entire portfolio-sync-core library.
/// Every public function returns `Result<T, CoreError>`.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Storage ─────────────────────────────────────────────────────
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage quota exceeded while writing '{key}'")]
    QuotaExceeded { key: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("File I/O error: {0}")]
    FileIO(String),

    // ── API / Network ───────────────────────────────────────────────
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by {endpoint}")]
    RateLimited { endpoint: String },

    #[error("API error ({endpoint}, HTTP {status}): {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    // ── Business Logic ──────────────────────────────────────────────
    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid ticker: {0}")]
    InvalidTicker(String),

    #[error("Position not found at index {0}")]
    PositionNotFound(usize),

    #[error("Position limit reached: at most {0} positions per portfolio")]
    PositionLimitReached(usize),

    // ── Mutations / Lifecycle ───────────────────────────────────────
    #[error("Failed to persist portfolio: {0}")]
    PersistenceFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// HTTP 429 after retries; degraded, never fatal.
    RateLimited,
    /// Connection/timeout failures.
    NetworkTransient,
    /// Bad input surfaced to the caller without retry.
    Validation,
    /// Local storage or backend save failures.
    Persistence,
    /// A single ticker failed inside a batch.
    PartialFetch,
    Other,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::RateLimited { .. } => ErrorKind::RateLimited,
            CoreError::Network(_) => ErrorKind::NetworkTransient,
            CoreError::ValidationError(_)
            | CoreError::InvalidTicker(_)
            | CoreError::PositionNotFound(_)
            | CoreError::PositionLimitReached(_) => ErrorKind::Validation,
            CoreError::Storage(_)
            | CoreError::QuotaExceeded { .. }
            | CoreError::FileIO(_)
            | CoreError::PersistenceFailed(_) => ErrorKind::Persistence,
            CoreError::Api { .. } => ErrorKind::PartialFetch,
            CoreError::Serialization(_)
            | CoreError::Deserialization(_)
            | CoreError::Cancelled
            | CoreError::Config(_) => ErrorKind::Other,
        }
    }

    /// Whether the retrying transport may re-issue the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Network(_))
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::FileIO(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // Strip query parameters from URLs so tokens never reach logs.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}
