//! Typed transport errors (§6): the vocabulary every adapter normalizes to,
//! so the orchestrator and concurrency gate can match on kind instead of
//! parsing provider-specific messages.

use thiserror::Error;

/// Errors surfaced by an [`crate::LlmProvider`]. Transient kinds
/// (`NetworkError`, `Timeout`, `RateLimit`) are retried by the adapter
/// itself with bounded exponential backoff; `Aborted` is never retried.
#[derive(Debug, Error)]
pub enum LlmError {
    /// `API_NETWORK_ERROR` — connection failure, DNS, reset, etc.
    #[error("network error: {0}")]
    NetworkError(String),

    /// `API_TIMEOUT` — the request exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// `API_ABORTED` — cancelled via the caller's abort token, or drained
    /// from the concurrency gate's queue on shutdown. Never retried.
    #[error("request aborted")]
    Aborted,

    /// `API_RATE_LIMIT` — HTTP 429 or an equivalent provider signal.
    /// `quota` distinguishes a hard quota exhaustion (never retried) from
    /// a transient concurrency-limit 429 (retried with backoff).
    #[error("rate limited (quota exhausted: {quota})")]
    RateLimit {
        /// True when the limit is a quota/billing ceiling, not concurrency.
        quota: bool,
    },

    /// `API_AUTH_FAILED` — missing or rejected credentials.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// `API_EMPTY_RESPONSE` — the provider returned no body at all.
    #[error("empty response from provider")]
    EmptyResponse,

    /// `API_BLANK_CONTENT` — a well-formed response with no usable text.
    #[error("response contained no content")]
    BlankContent,

    /// The response body didn't match the shape this adapter expects.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    /// Whether the transport adapter should retry this error locally
    /// (spec.md §5: network/5xx/429-concurrency, bounded, exponential
    /// backoff; 429-quota and cancellation are never retried).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::NetworkError(_) | LlmError::Timeout(_) | LlmError::RateLimit { quota: false }
        )
    }
}

/// Result type for LLM transport operations.
pub type LlmResult<T> = Result<T, LlmError>;
