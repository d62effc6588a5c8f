//! Session record and compaction configuration (§3).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-session accumulated code-change statistics plus the AI-generated
/// title, produced by the `summary` and `title` functional subagents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Lines added across this session's tool-driven edits.
    pub additions: u64,
    /// Lines removed across this session's tool-driven edits.
    pub deletions: u64,
    /// Files touched at least once, union-merged across turns.
    pub modified_files: BTreeSet<String>,
    /// Short AI-generated title, once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// When this summary was last updated.
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl SessionSummary {
    /// Atomically fold a batch of changes into the running totals.
    pub fn apply(&mut self, additions: u64, deletions: u64, files: impl IntoIterator<Item = String>) {
        self.additions += additions;
        self.deletions += deletions;
        for f in files {
            self.modified_files.insert(f);
        }
        self.generated_at = chrono::Utc::now();
    }
}

/// Running counters for a session, surfaced by `/tokens` and end-of-turn
/// bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    /// Number of user-authored messages.
    pub user_messages: u64,
    /// Number of assistant-authored messages.
    pub assistant_messages: u64,
    /// Number of tool calls executed across the session's lifetime.
    pub tool_calls: u64,
}

/// A persisted, resumable unit of conversation (§3, §4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// 128-bit hex identifier.
    pub id: String,
    /// Human-readable title, initially derived from the first user message
    /// and later replaced by the `title` subagent.
    pub title: String,
    /// Which agent mode this session runs under (`build`, `explore`, …).
    pub agent_type: String,
    /// Fork parent, if this session was created via `fork`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Creation timestamp.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last time this record was written.
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Last time this session was the current session.
    pub last_active_at: chrono::DateTime<chrono::Utc>,
    /// File name of the history JSON (relative to the sessions directory).
    pub history_file: String,
    /// File name of the persisted context JSON, when distinct from history.
    pub context_file: String,
    /// Number of messages currently in history.
    pub message_count: usize,
    /// Turn/tool-call counters.
    pub stats: SessionStats,
    /// Accumulated code-change summary, once generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SessionSummary>,
}

impl Session {
    /// Build a fresh session record. `id` is expected to be a 128-bit hex
    /// string minted by the caller (the session store owns id generation).
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, agent_type: impl Into<String>, parent_id: Option<String>) -> Self {
        let id = id.into();
        let now = chrono::Utc::now();
        Self {
            history_file: format!("{id}-history.json"),
            context_file: format!("{id}-history.json"),
            id,
            title: title.into(),
            agent_type: agent_type.into(),
            parent_id,
            created_at: now,
            updated_at: now,
            last_active_at: now,
            message_count: 0,
            stats: SessionStats::default(),
            summary: None,
        }
    }

    /// Touch `last_active_at` and `updated_at`.
    pub fn touch(&mut self) {
        let now = chrono::Utc::now();
        self.updated_at = now;
        self.last_active_at = now;
    }
}

/// Tuning knobs for the compactor (§3, §4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Master on/off switch.
    pub enabled: bool,
    /// Target ceiling for the context buffer.
    pub max_tokens: usize,
    /// Headroom reserved below `max_tokens` for the next model reply.
    pub reserve_tokens: usize,
    /// Messages scoring below this are marked for removal.
    pub min_importance_score: f64,
    /// Average-Jaccard threshold above which two messages are treated as
    /// duplicates.
    pub similarity_threshold: f64,
    /// Messages older than this many turns are eligible for summarization.
    pub summarize_older_than: usize,
    /// Cap, in tokens, on a single generated summary.
    pub summary_max_tokens: usize,
    /// Whether the deduplication pass runs.
    pub enable_deduplication: bool,
    /// Whether the summarization pass runs.
    pub enable_summarization: bool,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tokens: 100_000,
            reserve_tokens: 10_000,
            min_importance_score: 0.3,
            similarity_threshold: 0.8,
            summarize_older_than: 20,
            summary_max_tokens: 500,
            enable_deduplication: true,
            enable_summarization: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_derives_history_file_from_id() {
        let s = Session::new("deadbeef", "untitled", "build", None);
        assert_eq!(s.history_file, "deadbeef-history.json");
        assert_eq!(s.parent_id, None);
    }

    #[test]
    fn summary_apply_unions_files_and_sums_counts() {
        let mut summary = SessionSummary::default();
        summary.apply(10, 2, vec!["a.rs".to_string()]);
        summary.apply(5, 1, vec!["a.rs".to_string(), "b.rs".to_string()]);
        assert_eq!(summary.additions, 15);
        assert_eq!(summary.deletions, 3);
        assert_eq!(summary.modified_files.len(), 2);
    }
}
