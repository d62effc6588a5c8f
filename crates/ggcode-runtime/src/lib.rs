//! Agent orchestration runtime for ggcode (§2, §4).
//!
//! This crate ties together the tool registry ([`ggcode_tools`]), the LLM
//! transport ([`ggcode_llm`]), and the data model ([`ggcode_core`]) into
//! the think→act→observe loop: the tool-call parser, the API concurrency
//! gate, the context manager and compactor, the session store, the slash
//! command manager, and the three functional subagents.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod commands;
pub mod compactor;
pub mod context;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod parser;
pub mod store;
pub mod subagent;
pub mod templates;

pub use commands::{CommandManager, CommandOutcome};
pub use compactor::{compact_rule_based, CompactionReport};
pub use context::ContextManager;
pub use error::{RuntimeError, RuntimeResult};
pub use gate::{ConcurrencyGate, GateJob, Priority};
pub use orchestrator::{
    AbortToken, ApprovalCallback, ApprovalDecision, Orchestrator, OrchestratorConfig,
    StatusCallback, StatusEvent, TurnOutcome,
};
pub use parser::parse_tool_calls;
pub use store::SessionStore;
pub use subagent::{run_subagent, SubagentKind};
