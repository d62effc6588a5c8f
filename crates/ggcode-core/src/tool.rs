//! Tool call/result/definition types shared by the parser, registry, and
//! orchestrator (§3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured tool invocation extracted from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Lowercase, canonicalized tool name.
    pub tool: String,
    /// String-keyed parameter bag.
    pub parameters: HashMap<String, Value>,
    /// Opaque unique identifier, either supplied by the model or minted by
    /// the parser.
    pub id: String,
}

impl ToolCall {
    /// A stable key for deduplicating byte-identical calls within one
    /// response: the tool name plus its parameters serialized
    /// canonically (`serde_json` sorts map keys by default only via
    /// `BTreeMap`; we sort explicitly for determinism).
    #[must_use]
    pub fn dedup_key(&self) -> String {
        let mut keys: Vec<&String> = self.parameters.keys().collect();
        keys.sort();
        let mut parts = Vec::with_capacity(keys.len());
        for k in keys {
            parts.push(format!("{k}={}", self.parameters[k]));
        }
        format!("{}:{}", self.tool, parts.join(","))
    }
}

/// Execution metadata recorded alongside a [`ToolResult`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResultMeta {
    /// Unix millis when the handler started.
    pub start_time: i64,
    /// Unix millis when the handler finished.
    pub end_time: i64,
    /// `end_time - start_time`, in milliseconds.
    pub duration_ms: i64,
    /// Set when the output was truncated to a head+tail window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
    /// Path to the spool file holding the untruncated output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation_file: Option<String>,
    /// Process exit code, for shell executions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Terminating signal name, for shell executions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
}

/// The outcome of executing a [`ToolCall`]. Handlers never throw across
/// the registry boundary — uncaught failures are normalized into
/// `success: false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the handler completed without error.
    pub success: bool,
    /// Output text, present on success (and sometimes alongside failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Human-readable error, present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Execution metadata.
    pub metadata: ToolResultMeta,
}

impl ToolResult {
    /// Build a successful result with the given output.
    #[must_use]
    pub fn ok(output: impl Into<String>, metadata: ToolResultMeta) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
            metadata,
        }
    }

    /// Build a failed result with the given error message.
    #[must_use]
    pub fn err(error: impl Into<String>, metadata: ToolResultMeta) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            metadata,
        }
    }
}

/// Broad grouping of a tool's purpose, used for listing and UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCategory {
    /// Reads or writes files.
    File,
    /// Finds things (glob, grep).
    Search,
    /// Runs a subprocess.
    Command,
    /// Everything else (directory creation, etc).
    System,
}

/// The approval tier a tool requires before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    /// No side effects; never gated.
    Safe,
    /// Modifies local state but stays inside the workspace.
    LocalModify,
    /// Reaches outside the local machine.
    Network,
    /// Broad or irreversible local effects (arbitrary shell, etc).
    Dangerous,
}

/// A declarative description of one parameter a tool accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSchema {
    /// JSON Schema type name (`string`, `number`, `boolean`, `array`, …).
    pub type_name: String,
    /// Whether the caller must supply this parameter.
    pub required: bool,
    /// Value substituted when the parameter is absent and not required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Restricts the value to one of these, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParamSchema {
    /// A required parameter of the given JSON type.
    #[must_use]
    pub fn required(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    /// An optional parameter with a default value.
    #[must_use]
    pub fn optional(type_name: impl Into<String>, default: Value) -> Self {
        Self {
            type_name: type_name.into(),
            required: false,
            default: Some(default),
            enum_values: None,
        }
    }

    /// Validate a supplied value against this descriptor's type.
    #[must_use]
    pub fn matches_type(&self, value: &Value) -> bool {
        match self.type_name.as_str() {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        }
    }
}
