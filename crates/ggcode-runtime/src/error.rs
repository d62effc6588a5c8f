//! Runtime error kinds (§7): the vocabulary the orchestrator, gate, parser,
//! compactor and session store normalize to.

use thiserror::Error;

/// Errors surfaced by the runtime crate.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// `orchestrator-max-iterations` — a turn exhausted its iteration
    /// budget without reaching a final answer.
    #[error("turn exceeded its iteration budget")]
    MaxIterations,

    /// `orchestrator-interrupted` — the turn's abort token fired.
    #[error("turn was interrupted")]
    Interrupted,

    /// A malformed-call correction loop exhausted its retry budget
    /// (capped at 2 per turn, per spec.md §4.J).
    #[error("agent execution failed after exhausting correction attempts")]
    ExecutionFailed,

    /// `malformed-response` — the model's reply could not be parsed into
    /// tool calls or a plain answer.
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    /// `tool-not-found` / `tool-validation` / `tool-runtime` bubbled up
    /// from the tool registry without being captured into a `ToolResult`
    /// (should not normally escape `ToolRegistry::execute`).
    #[error("tool error: {0}")]
    ToolError(String),

    /// `permission-denied` — a non-safe tool call was denied by the
    /// approval callback.
    #[error("tool call denied: {0}")]
    PermissionDenied(String),

    /// `session-not-found` — an operation referenced a session id that
    /// does not exist in the store.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A session already exists under the id a caller supplied.
    #[error("session already exists: {0}")]
    SessionExists(String),

    /// `session-persist` — writing a session or history file failed.
    /// Logged, not fatal: the in-memory state remains authoritative
    /// (spec.md §7).
    #[error("failed to persist session {session_id}: {source}")]
    SessionPersist {
        /// The session that failed to persist.
        session_id: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Session data on disk didn't parse.
    #[error("corrupt session data at {path}: {source}")]
    SessionCorrupt {
        /// Path to the offending file.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// An LLM transport call failed. Transient kinds are already retried
    /// by the adapter (§5); anything reaching here is terminal for the
    /// calling operation.
    #[error("llm transport error: {0}")]
    Llm(#[from] ggcode_llm::LlmError),

    /// `config-missing` / `config-schema` surfaced at runtime (e.g. a
    /// `/setting` command rejected by validation).
    #[error("configuration error: {0}")]
    Config(#[from] ggcode_config::ConfigError),

    /// Not a recognized slash command; the command manager hands the
    /// line back so the caller can route it to the orchestrator instead.
    #[error("not a command: {0}")]
    NotACommand(String),

    /// A recognized command was used incorrectly (bad subcommand, wrong
    /// argument count).
    #[error("command error: {0}")]
    CommandError(String),

    /// I/O failure not already classified above.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A foundational error surfaced by `ggcode-core` (home-directory
    /// resolution, etc).
    #[error("core error: {0}")]
    Core(#[from] ggcode_core::error::CoreError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
