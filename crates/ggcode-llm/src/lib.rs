//! Streaming LLM transport adapters (§4.D, §6).
//!
//! [`LlmProvider`] is the single abstract contract everything above this
//! crate depends on. [`openai_compat::OpenAiCompatProvider`] and
//! [`enterprise::EnterpriseProvider`] are the two concrete wire formats
//! this contract must support.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod enterprise;
pub mod error;
pub mod openai_compat;
pub mod provider;

pub use enterprise::EnterpriseProvider;
pub use error::{LlmError, LlmResult};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{ChatOptions, LlmProvider, OnChunk};
