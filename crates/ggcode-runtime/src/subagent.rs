//! Functional subagents (§4.K): thin, template-driven LLM calls producing
//! a title, a summary, or a compaction digest. All three share the same
//! shape — filter the transcript, prepend a fixed system prompt, dispatch
//! through the concurrency gate at `Priority::Low`, bound by a timeout,
//! with a benign fallback on failure.

use std::sync::Arc;
use std::time::Duration;

use ggcode_core::{EnhancedMessage, LegacyMessage, Role};
use ggcode_llm::{ChatOptions, LlmProvider};

use crate::gate::{ConcurrencyGate, Priority};
use crate::templates::{self, subagent_fallback};

/// The three functional subagent kinds (spec.md §4.K).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubagentKind {
    /// Summarizes the conversation so far, for context compaction.
    Compaction,
    /// Produces a one/two sentence summary of what happened.
    Summary,
    /// Produces a short (≤5 word) session title from the opening message.
    Title,
}

impl SubagentKind {
    fn system_prompt(self) -> &'static str {
        match self {
            Self::Compaction => templates::COMPACTION_PROMPT,
            Self::Summary => templates::SUMMARY_PROMPT,
            Self::Title => templates::TITLE_PROMPT,
        }
    }

    fn fallback_key(self) -> &'static str {
        match self {
            Self::Compaction => "compaction",
            Self::Summary => "summary",
            Self::Title => "title",
        }
    }

    /// Filter the transcript this subagent kind operates on (spec.md
    /// §4.K): compaction gets user+assistant only, summary gets the last
    /// 10 messages, title gets just the first user message.
    fn filter(self, messages: &[EnhancedMessage]) -> Vec<LegacyMessage> {
        match self {
            Self::Compaction => messages
                .iter()
                .filter(|m| m.role == Role::User || m.role == Role::Assistant)
                .filter_map(EnhancedMessage::flatten)
                .collect(),
            Self::Summary => messages.iter().rev().take(10).rev().filter_map(EnhancedMessage::flatten).collect(),
            Self::Title => messages
                .iter()
                .find(|m| m.role == Role::User)
                .and_then(EnhancedMessage::flatten)
                .into_iter()
                .collect(),
        }
    }

    /// Bound on how long this subagent may run (spec.md §5: 30s for
    /// functional subagents).
    fn timeout(self) -> Duration {
        Duration::from_secs(30)
    }
}

/// Run a functional subagent over `messages` through `provider`, gated at
/// `Priority::Low`. Returns the model's plain-text reply, or the kind's
/// benign fallback string on any failure or timeout (spec.md §4.K).
pub async fn run_subagent(
    kind: SubagentKind,
    provider: Arc<dyn LlmProvider>,
    gate: &ConcurrencyGate,
    messages: &[EnhancedMessage],
) -> String {
    let filtered = kind.filter(messages);
    if filtered.is_empty() {
        return subagent_fallback(kind.fallback_key());
    }
    let system = kind.system_prompt().to_string();
    let timeout = kind.timeout();

    let job: crate::gate::GateJob = Box::pin(async move {
        let options = ChatOptions { stream: false, ..ChatOptions::default() };
        provider.chat(&system, &filtered, &options, None).await
    });

    let result = tokio::time::timeout(timeout, gate.submit(Priority::Low, job)).await;
    match result {
        Ok(Ok(text)) if !text.trim().is_empty() => text,
        _ => subagent_fallback(kind.fallback_key()),
    }
}
