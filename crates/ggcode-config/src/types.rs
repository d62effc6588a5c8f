//! Configuration struct definitions (§6).
//!
//! Every section defaults to a working production value so a config file
//! that omits a section entirely still loads. Only `api.api_key` has no
//! sane default — it must come from the file or an environment variable.

use serde::{Deserialize, Serialize};

/// Which wire shape the configured LLM endpoint speaks (§6's transport
/// contract: an OpenAI-compatible shape, or the double-wrapped enterprise
/// envelope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiMode {
    /// `/chat/completions`-shaped requests and responses.
    OpenaiCompat,
    /// Outer envelope with `C-API-Status == "00"` and business code
    /// `20000`, inner JSON payload carried as a string.
    Enterprise,
}

impl Default for ApiMode {
    fn default() -> Self {
        Self::OpenaiCompat
    }
}

/// `api` section: which provider shape to speak and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Wire shape.
    pub mode: ApiMode,
    /// Base URL of the endpoint.
    pub base_url: String,
    /// API key, read directly from the file. Prefer `api_key_env` in
    /// committed configs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Name of an environment variable to read the API key from at load
    /// time, taking precedence over `api_key` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Model identifier to request.
    pub model: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            mode: ApiMode::default(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            api_key_env: Some("GGCODE_API_KEY".to_string()),
            model: "gpt-4o".to_string(),
        }
    }
}

impl ApiConfig {
    /// Resolve the effective API key: `api_key_env` (if set and present in
    /// the environment) takes precedence over the literal `api_key`.
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(var) = &self.api_key_env {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
        self.api_key.clone()
    }
}

/// `agent` section: orchestrator and compaction tuning (§4.J, §4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Context window budget handed to the context manager.
    pub max_context_tokens: usize,
    /// Maximum number of messages retained before compaction considers them.
    pub max_history: usize,
    /// Per-turn iteration cap (§4.J).
    pub max_iterations: u32,
    /// When true, non-safe tool calls execute without an approval prompt.
    pub auto_approve: bool,
    /// When true, the orchestrator compacts automatically on overflow.
    pub auto_compress: bool,
    /// Fraction of `max_context_tokens` that triggers compaction, `[0, 1]`.
    pub compress_threshold: f64,
    /// Headroom reserved below the threshold for the next reply.
    pub compress_reserve: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 100_000,
            max_history: 200,
            max_iterations: 25,
            auto_approve: false,
            auto_compress: true,
            compress_threshold: 0.8,
            compress_reserve: 10_000,
        }
    }
}

/// `sessions` section: session store retention policy (§4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Maximum number of sessions retained; oldest-inactive are evicted
    /// past this limit.
    pub max_sessions: usize,
    /// Sessions inactive longer than this are eligible for cleanup.
    pub max_inactive_days: u64,
    /// Whether the background cleanup timer runs.
    pub auto_cleanup: bool,
    /// How often the background cleanup timer fires.
    pub cleanup_interval_hours: u64,
    /// Number of most-recently-active sessions exempt from cleanup and
    /// from the `max_sessions` eviction.
    pub preserve_recent_sessions: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            max_inactive_days: 30,
            auto_cleanup: true,
            cleanup_interval_hours: 24,
            preserve_recent_sessions: 5,
        }
    }
}

/// `model_config` section: sampling parameters exposed via `/setting`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Sampling temperature, `[0, 2]`.
    pub temperature: f64,
    /// Nucleus sampling mass, `[0, 1]`.
    pub top_p: f64,
    /// Top-k sampling cutoff, `[-1, 100]`.
    pub top_k: i32,
    /// Repetition penalty, `[1, 2]`.
    pub repetition_penalty: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 1.0,
            top_k: -1,
            repetition_penalty: 1.0,
        }
    }
}

/// Root configuration object, matching `${HOME}/.ggcode/config.json` (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transport endpoint configuration.
    pub api: ApiConfig,
    /// Orchestrator tuning.
    pub agent: AgentConfig,
    /// Session retention policy.
    pub sessions: SessionsConfig,
    /// Sampling defaults.
    pub model_config: ModelConfig,
}
