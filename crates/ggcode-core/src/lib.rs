//! Foundation types shared by the agent orchestration crates: the message
//! data model, tool call/result/definition shapes, the token estimator,
//! the session record, and the on-disk home directory layout.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod dirs;
pub mod error;
pub mod message;
pub mod session;
pub mod token;
pub mod tool;

pub use dirs::GgcodeHome;
pub use error::{CoreError, CoreResult};
pub use message::{EnhancedMessage, LegacyMessage, Part, PartKind, PartMeta, Role};
pub use session::{CompactionConfig, Session, SessionStats, SessionSummary};
pub use token::estimate_tokens;
pub use tool::{ParamSchema, Permission, ToolCall, ToolCategory, ToolResult, ToolResultMeta};
