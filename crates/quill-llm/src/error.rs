//! Errors returned by the chat completion client.
//!
//! Every failure reaches the caller as an [`ApiError`]; the client never
//! retries. HTTP failures carry the endpoint's own error message when the
//! body has the usual `{"error": {"message": ...}}` shape.

use thiserror::Error;

/// Errors from building, sending or decoding a chat completion call.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No key was supplied and the environment variable is unset or empty.
    #[error("no API key: set {env_var} or pass one explicitly")]
    MissingApiKey {
        /// Variable that was consulted.
        env_var: String,
    },

    /// The endpoint rejected the credentials (HTTP 401/403).
    #[error("authentication rejected (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// HTTP 429 for a transient rate limit.
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Server-suggested wait, in milliseconds.
        retry_after_ms: u64,
    },

    /// HTTP 429 caused by exhausted credits. Waiting does not help.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    /// HTTP 404, almost always an unknown model name.
    #[error("model '{model}' not found: {message}")]
    ModelNotFound { model: String, message: String },

    /// Any other non-success status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// A success status whose body is not a chat completion.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The SSE body broke off before completing.
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// The HTTP status behind this error, if the endpoint answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { status, .. } | ApiError::Status { status, .. } => {
                Some(*status)
            }
            ApiError::RateLimited { .. } | ApiError::QuotaExhausted(_) => Some(429),
            ApiError::ModelNotFound { .. } => Some(404),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Transport(err)
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ApiError>;
