use thiserror::Error;

use crate::job::JobState;

/// How the external Data API rejected a call.
///
/// The raw API reports failures as an HTTP status plus a `reason` string in
/// the error body; this enum is the classified form the rest of the engine
/// works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Per-key daily quota spent (403/429 with a quota reason).
    QuotaExceeded,
    /// Key rejected outright (revoked, malformed, referrer-restricted).
    InvalidCredential,
    /// Server-side failure (5xx).
    ServerError,
    /// Connection-level failure (DNS, reset, TLS).
    NetworkError,
    /// Anything the classifier could not place.
    Unknown,
}

/// Structured error details from the external Data API.
#[derive(Debug, Clone)]
pub struct ApiErrorDetails {
    pub kind: ApiErrorKind,
    /// Human-readable message from the API error body.
    pub message: String,
    pub status_code: u16,
}

impl ApiErrorDetails {
    pub fn new(kind: ApiErrorKind, message: String, status_code: u16) -> Self {
        Self {
            kind,
            message,
            status_code,
        }
    }
}

impl std::fmt::Display for ApiErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Data API error (HTTP {}): {}",
            self.status_code, self.message
        )
    }
}

/// Application-wide error type.
///
/// Uses `thiserror` for ergonomic propagation; `sqlx` and `serde_json`
/// errors convert automatically via `#[from]`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed (connection, query, constraint).
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// External Data API call failed with classified details.
    #[error("API error: {0}")]
    ApiError(ApiErrorDetails),

    /// HTTP client failure that carries no structured API body.
    #[error("Client error: {0}")]
    ClientError(String),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A response decoded, but its shape did not match what the API
    /// contract promises. Permanent for the call that produced it.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Connection-level network failure.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request exceeded its bounded timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Every credential in the pool is exhausted or invalid. Fatal for the
    /// current run: no further external calls are possible.
    #[error("Credential pool exhausted: no active credential with remaining quota")]
    CredentialsExhausted,

    /// A sync job is already running or paused.
    #[error("A sync job is already active (state: {0})")]
    AlreadyRunning(JobState),

    /// The requested control-plane transition is not legal from the
    /// current state. Reported to the caller, never a crash.
    #[error("Cannot {requested} from state {current}")]
    InvalidTransition {
        requested: &'static str,
        current: JobState,
    },

    /// Slug uniqueness probe ran out of attempts.
    #[error("Could not find a free slug for '{0}' within the probe bound")]
    SlugExhausted(String),

    /// Configuration file error (credentials.toml, settings).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Catch-all; prefer a specific variant.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// True if retrying the same operation may succeed.
    ///
    /// Quota errors are retryable *on a different credential*; the client
    /// handles that rotation before the error ever propagates here, so at
    /// this level they count as non-retryable for the same call.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::ClientError(_) => true,
            AppError::ApiError(details) => matches!(
                details.kind,
                ApiErrorKind::ServerError | ApiErrorKind::NetworkError
            ),
            _ => false,
        }
    }

    /// True if this error signals a spent or rejected credential that the
    /// pool should be told about.
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            AppError::ApiError(ApiErrorDetails {
                kind: ApiErrorKind::QuotaExceeded | ApiErrorKind::InvalidCredential,
                ..
            })
        )
    }

    /// True if the whole run must stop: no amount of per-item isolation
    /// helps when no external call can succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::CredentialsExhausted)
    }

    /// True if the failure is scoped to a single item and should be
    /// recorded against that item rather than aborting siblings.
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            AppError::MalformedResponse(_) | AppError::SlugExhausted(_)
        )
    }
}
