//! The abstract streaming LLM transport contract (§4.D, §6).
//!
//! Concrete adapters live in [`crate::openai_compat`] and
//! [`crate::enterprise`]. Everything above this trait — the concurrency
//! gate, the orchestrator, the functional subagents — depends only on
//! [`LlmProvider`], never on a specific provider's wire format.

use async_trait::async_trait;
use ggcode_core::LegacyMessage;
use tokio_util::sync::CancellationToken;

use crate::error::LlmResult;

/// Sampling and transport knobs for one request (§6's `options` bag).
/// Fields mirror the `/setting` surface in spec.md §6.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Sampling temperature, `[0, 2]`.
    pub temperature: Option<f64>,
    /// Nucleus sampling mass, `[0, 1]`.
    pub top_p: Option<f64>,
    /// Top-k sampling cutoff, `[-1, 100]`.
    pub top_k: Option<i32>,
    /// Repetition penalty, `[1, 2]`.
    pub repetition_penalty: Option<f64>,
    /// Whether to stream partial chunks via `on_chunk`.
    pub stream: bool,
    /// Request deadline. `None` falls back to the adapter's default.
    pub timeout: Option<std::time::Duration>,
    /// Cooperative cancellation (§5): checked before dispatch, during
    /// streaming receive, and between retry attempts.
    pub abort: Option<CancellationToken>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: None,
            top_p: None,
            top_k: None,
            repetition_penalty: None,
            stream: true,
            timeout: None,
            abort: None,
        }
    }
}

/// Callback invoked with each partial text chunk as it arrives, when
/// `ChatOptions::stream` is set. Takes `&mut dyn FnMut` rather than a
/// generic so [`LlmProvider`] stays object-safe.
pub type OnChunk<'a> = &'a mut (dyn FnMut(&str) + Send);

/// The streaming LLM transport contract (§4.D, §6): one method, legacy
/// messages in, plain text out, optionally streamed.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name, for logging and `/models`.
    fn name(&self) -> &str;

    /// Model identifier currently in use.
    fn model(&self) -> &str;

    /// The model's context window, in tokens. Used by the context
    /// manager to size the budget it clips to.
    fn max_context_tokens(&self) -> usize;

    /// Issue a chat request. `system` is sent as the system prompt when
    /// non-empty. Returns the full response text once generation ends;
    /// when `options.stream` is set, `on_chunk` also receives partial
    /// text as it arrives.
    ///
    /// # Errors
    ///
    /// Returns a typed [`crate::LlmError`]; transient kinds have already
    /// been retried internally per spec.md §5 before this returns.
    async fn chat(
        &self,
        system: &str,
        messages: &[LegacyMessage],
        options: &ChatOptions,
        on_chunk: Option<OnChunk<'_>>,
    ) -> LlmResult<String>;
}
