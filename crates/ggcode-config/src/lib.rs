//! Configuration file loading, saving, and validation (§6).
//!
//! A single JSON document at `${HOME}/.ggcode/config.json`, with sections
//! `api`, `agent`, `sessions`, and `model_config` as named by spec.md §6.
//! No layered merge, no TOML — the on-disk shape is exactly the JSON
//! document an operator edits by hand or via `config set`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod error;
mod loader;
mod types;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{init, load, load_file, save};
pub use types::{AgentConfig, ApiConfig, ApiMode, Config, ModelConfig, SessionsConfig};
pub use validate::{apply_setting, validate};
