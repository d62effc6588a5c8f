//! The tool registry and executor (§4.B).
//!
//! A [`ToolDefinition`] pairs a declarative parameter schema with a
//! handler. [`ToolRegistry::execute`] is the full dispatch pipeline:
//! lookup, validate, invoke, time, truncate, return — handlers never
//! escape this boundary with a panic or an unhandled error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use ggcode_core::tool::{ParamSchema, Permission, ToolCall, ToolCategory, ToolResult, ToolResultMeta};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::truncate::truncate_at_char_boundary;

/// Byte threshold above which a handler's output is spooled to disk and
/// replaced with a head+tail preview.
pub const TRUNCATE_BYTES: usize = 20_000;
/// Lines kept at the head and tail of a truncated output window.
pub const TRUNCATE_WINDOW_LINES: usize = 100;

/// Everything a handler needs to do its I/O.
pub struct ExecutionContext {
    /// The directory tool paths are resolved relative to.
    pub working_directory: PathBuf,
    /// Shared, mutable "current directory" for handlers like `bash` that
    /// maintain state across calls within a turn.
    pub cwd: Arc<tokio::sync::RwLock<PathBuf>>,
    /// Cooperative cancellation, checked by long-running handlers (shell).
    pub abort: CancellationToken,
    /// Directory truncated output is spooled to. Created on first use.
    pub spool_dir: PathBuf,
}

impl ExecutionContext {
    /// Build a context rooted at `working_directory`, with its own cwd cell.
    #[must_use]
    pub fn new(working_directory: PathBuf, spool_dir: PathBuf) -> Self {
        let cwd = Arc::new(tokio::sync::RwLock::new(working_directory.clone()));
        Self {
            working_directory,
            cwd,
            abort: CancellationToken::new(),
            spool_dir,
        }
    }
}

/// A tool's handler. Implementations should return `Err` rather than
/// panic; the registry treats a panic as a bug, not a tool failure.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool against validated parameters.
    async fn run(
        &self,
        params: &HashMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<String, String>;
}

/// A declarative tool description: schema, permission tier, and handler.
pub struct ToolDefinition {
    /// Canonical (lowercase) name.
    pub name: &'static str,
    /// Shown to the model in its tool listing.
    pub description: &'static str,
    /// Broad grouping, for `list_by_category`.
    pub category: ToolCategory,
    /// Approval tier required before execution.
    pub permission: Permission,
    /// Declared parameters, in the order they should be documented.
    pub params: Vec<(&'static str, ParamSchema)>,
    /// The handler invoked once parameters validate.
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    /// Validate a raw parameter bag against this tool's schema, applying
    /// declared defaults for missing optional fields.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason on the first missing required
    /// field or type mismatch encountered.
    pub fn validate(
        &self,
        raw: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, String> {
        let mut out = HashMap::with_capacity(self.params.len());
        for (key, schema) in &self.params {
            match raw.get(*key) {
                Some(value) => {
                    if !schema.matches_type(value) {
                        return Err(format!(
                            "parameter \"{key}\" must be of type {}",
                            schema.type_name
                        ));
                    }
                    if let Some(allowed) = &schema.enum_values {
                        if !allowed.contains(value) {
                            return Err(format!("parameter \"{key}\" is not one of the allowed values"));
                        }
                    }
                    out.insert((*key).to_string(), value.clone());
                },
                None => {
                    if schema.required {
                        return Err(format!("missing required parameter \"{key}\""));
                    }
                    if let Some(default) = &schema.default {
                        out.insert((*key).to_string(), default.clone());
                    }
                },
            }
        }
        Ok(out)
    }
}

/// Registry of tool definitions, keyed by lowercased name (§4.B, §3).
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a tool definition, case-insensitively.
    pub fn register(&mut self, def: ToolDefinition) {
        self.tools.insert(def.name.to_lowercase(), def);
    }

    /// Look up a tool by name, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(&name.to_lowercase())
    }

    /// All tools in a given category.
    #[must_use]
    pub fn list_by_category(&self, category: ToolCategory) -> Vec<&ToolDefinition> {
        self.tools.values().filter(|t| t.category == category).collect()
    }

    /// Every registered tool.
    #[must_use]
    pub fn list_all(&self) -> Vec<&ToolDefinition> {
        self.tools.values().collect()
    }

    /// Run the full dispatch pipeline for `call` (§4.B):
    /// lookup → validate → invoke → time → truncate → result.
    pub async fn execute(&self, call: &ToolCall, ctx: &ExecutionContext) -> ToolResult {
        let start = chrono::Utc::now();
        let Some(def) = self.get(&call.tool) else {
            return ToolResult::err(
                format!("TOOL_NOT_FOUND: no tool named \"{}\"", call.tool),
                meta(start),
            );
        };

        let params = match def.validate(&call.parameters) {
            Ok(p) => p,
            Err(reason) => {
                return ToolResult::err(format!("TOOL_VALIDATION_FAILED: {reason}"), meta(start));
            },
        };

        let outcome = def.handler.run(&params, ctx).await;
        let mut result_meta = meta(start);

        match outcome {
            Ok(output) => {
                if output.len() > TRUNCATE_BYTES {
                    result_meta.truncated = Some(true);
                    if let Ok(path) = spool_full_output(ctx, &call.id, &output).await {
                        result_meta.truncation_file = Some(path);
                    }
                    ToolResult::ok(truncate_window(&output), result_meta)
                } else {
                    ToolResult::ok(output, result_meta)
                }
            },
            Err(error) => ToolResult::err(error, result_meta),
        }
    }
}

fn meta(start: chrono::DateTime<chrono::Utc>) -> ToolResultMeta {
    let end = chrono::Utc::now();
    ToolResultMeta {
        start_time: start.timestamp_millis(),
        end_time: end.timestamp_millis(),
        duration_ms: (end - start).num_milliseconds().max(0),
        truncated: None,
        truncation_file: None,
        exit_code: None,
        signal: None,
    }
}

/// Head+tail windowing used when spooling to disk isn't available.
fn truncate_window(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    if lines.len() <= TRUNCATE_WINDOW_LINES * 2 {
        return truncate_at_char_boundary(output, TRUNCATE_BYTES);
    }
    let head = lines[..TRUNCATE_WINDOW_LINES].join("\n");
    let tail = lines[lines.len() - TRUNCATE_WINDOW_LINES..].join("\n");
    format!(
        "{head}\n\n... ({} lines omitted) ...\n\n{tail}",
        lines.len() - TRUNCATE_WINDOW_LINES * 2
    )
}

/// Spool the untruncated output to a file under `ctx.spool_dir`, returning
/// its path. Used by [`ToolRegistry::execute`] when truncation fires.
///
/// # Errors
///
/// Returns an error if the spool directory can't be created or written.
pub async fn spool_full_output(ctx: &ExecutionContext, call_id: &str, output: &str) -> std::io::Result<String> {
    tokio::fs::create_dir_all(&ctx.spool_dir).await?;
    let path = ctx.spool_dir.join(format!("{call_id}.txt"));
    tokio::fs::write(&path, output).await?;
    Ok(path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ggcode_core::tool::ParamSchema;

    struct Echo;
    #[async_trait]
    impl ToolHandler for Echo {
        async fn run(&self, params: &HashMap<String, Value>, _ctx: &ExecutionContext) -> Result<String, String> {
            Ok(params.get("text").and_then(Value::as_str).unwrap_or_default().to_string())
        }
    }

    fn echo_def() -> ToolDefinition {
        ToolDefinition {
            name: "echo",
            description: "echoes text",
            category: ToolCategory::System,
            permission: Permission::Safe,
            params: vec![("text", ParamSchema::required("string"))],
            handler: Arc::new(Echo),
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(std::env::temp_dir(), std::env::temp_dir().join("ggcode-test-spool"))
    }

    #[tokio::test]
    async fn unknown_tool_fails_not_found() {
        let registry = ToolRegistry::new();
        let call = ToolCall { tool: "nope".into(), parameters: HashMap::new(), id: "1".into() };
        let result = registry.execute(&call, &ctx()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("TOOL_NOT_FOUND"));
    }

    #[tokio::test]
    async fn missing_required_param_fails_validation() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_def());
        let call = ToolCall { tool: "echo".into(), parameters: HashMap::new(), id: "1".into() };
        let result = registry.execute(&call, &ctx()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("TOOL_VALIDATION_FAILED"));
    }

    #[tokio::test]
    async fn valid_call_dispatches_to_handler() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_def());
        let mut params = HashMap::new();
        params.insert("text".to_string(), Value::String("hi".into()));
        let call = ToolCall { tool: "ECHO".into(), parameters: params, id: "1".into() };
        let result = registry.execute(&call, &ctx()).await;
        assert!(result.success);
        assert_eq!(result.output.unwrap(), "hi");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_def());
        assert!(registry.get("Echo").is_some());
        assert!(registry.get("ECHO").is_some());
    }
}
