//! Error taxonomy for the receiver.
//!
//! Every failure kind is a closed enum variant rather than a sentinel string,
//! and webhook rejections carry an exhaustive kind-to-status mapping in
//! [`WebhookError::status`].

use axum::http::StatusCode;
use thiserror::Error;

/// Rejection kinds produced by the webhook ingress.
///
/// Each variant maps 1:1 to a distinct HTTP status; the platform retries
/// delivery on any non-2xx response, so the handler never retries internally.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The token bucket had no token for this request.
    #[error("rate limit exceeded")]
    RateLimited,
    /// The Host header did not match the configured domain.
    #[error("forbidden")]
    HostMismatch,
    /// The secret token header did not match the configured secret.
    #[error("unauthorized")]
    SecretMismatch,
    /// Request used a method other than POST.
    #[error("method not allowed")]
    MethodNotAllowed,
    /// Request body exceeded the configured maximum size.
    #[error("request body too large")]
    BodyTooLarge,
    /// Reading the request body failed mid-stream.
    #[error("failed to read request body: {0}")]
    BodyRead(String),
    /// The body was not a valid Update document.
    #[error("invalid JSON payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    /// The update channel is full; the platform will redeliver.
    #[error("updates channel blocked")]
    ChannelBlocked,
    /// The circuit breaker is open; the request was rejected without I/O.
    #[error("temporarily unavailable")]
    BreakerOpen,
}

impl WebhookError {
    /// The HTTP status this rejection is reported as.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::HostMismatch => StatusCode::FORBIDDEN,
            Self::SecretMismatch => StatusCode::UNAUTHORIZED,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BodyRead(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::ChannelBlocked => StatusCode::SERVICE_UNAVAILABLE,
            Self::BreakerOpen => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors from outbound Bot API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level failure (connect, timeout, TLS, …).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The API answered with a non-success HTTP status.
    #[error("unexpected status code: {0}")]
    Status(u16),
    /// The API answered `ok: false` with a structured error.
    #[error("telegram API error {code}: {description}")]
    Telegram {
        /// Numeric error code from the platform.
        code: i64,
        /// Human-readable description from the platform.
        description: String,
    },
    /// The response body could not be decoded.
    #[error("failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Whether retrying the call later may succeed.
    ///
    /// Transport failures, HTTP 429 and 5xx, and the equivalent structured
    /// error codes are retryable; decode failures and client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::Telegram { code, .. } => *code == 429 || *code >= 500,
            Self::Decode(_) => false,
        }
    }
}

/// Errors observed by the poll loop for a single iteration.
#[derive(Debug, Error)]
pub enum PollError {
    /// The circuit breaker rejected the call without touching the network.
    #[error("circuit breaker is open")]
    BreakerOpen,
    /// The getUpdates call itself failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors surfaced synchronously at construction or start time.
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// Configuration failed validation; reported before anything runs.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// `start` was called while the polling client was already running.
    #[error("long polling client is already running")]
    AlreadyRunning,
    /// Deleting the existing webhook before polling failed; start aborted.
    #[error("failed to delete webhook: {0}")]
    DeleteWebhook(#[source] ApiError),
    /// Registering the webhook with Telegram failed; server not started.
    #[error("failed to register webhook: {0}")]
    SetWebhook(#[source] ApiError),
    /// The webhook HTTP server failed to bind or serve.
    #[error("webhook server error: {0}")]
    Server(#[source] std::io::Error),
}
