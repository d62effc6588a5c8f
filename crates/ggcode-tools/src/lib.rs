//! Built-in tool handlers and the tool registry/executor for ggcode (§4.B).
//!
//! [`registry::ToolRegistry`] is the single source of truth for what a
//! session can invoke: [`default_registry`] wires up every built-in
//! handler with its declarative parameter schema and permission tier.

mod bash;
mod edit_file;
mod glob;
mod grep;
/// Project instructions loader (`AGENTS.md`/`CLAUDE.md`).
pub mod instructions;
mod mkdir;
mod read_file;
/// The tool registry and executor (§4.B).
pub mod registry;
/// System prompt assembly (§4.L).
pub mod system_prompt;
/// UTF-8-safe truncation helper shared by handlers and the registry.
pub mod truncate;
mod write_file;

use std::sync::Arc;

use ggcode_core::tool::{ParamSchema, Permission, ToolCategory};

pub use instructions::load_project_instructions;
pub use registry::{ExecutionContext, ToolDefinition, ToolHandler, ToolRegistry};
pub use system_prompt::build_system_prompt;
pub use truncate::truncate_at_char_boundary;

use bash::BashHandler;
use edit_file::EditFileHandler;
use glob::GlobHandler;
use grep::GrepHandler;
use mkdir::MkdirHandler;
use read_file::ReadFileHandler;
use write_file::WriteFileHandler;

/// Build a registry with every built-in handler named in spec.md §4.B
/// registered: read, write, edit, glob, grep, bash, mkdir.
#[must_use]
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(ToolDefinition {
        name: "read_file",
        description: "Reads a file and returns its content, line-numbered (cat -n style). \
                      Supports an offset/limit window for large files.",
        category: ToolCategory::File,
        permission: Permission::Safe,
        params: vec![
            ("file_path", ParamSchema::required("string")),
            ("offset", ParamSchema::optional("number", serde_json::json!(1))),
            ("limit", ParamSchema::optional("number", serde_json::json!(2000))),
        ],
        handler: Arc::new(ReadFileHandler),
    });

    registry.register(ToolDefinition {
        name: "write_file",
        description: "Writes content to a file, replacing it atomically and keeping a \
                      .backup sidecar of any file it overwrites.",
        category: ToolCategory::File,
        permission: Permission::LocalModify,
        params: vec![
            ("file_path", ParamSchema::required("string")),
            ("content", ParamSchema::required("string")),
        ],
        handler: Arc::new(WriteFileHandler),
    });

    registry.register(ToolDefinition {
        name: "edit_file",
        description: "Performs an exact-string replacement in a file. old_string must be \
                      unique in the file unless replace_all is set.",
        category: ToolCategory::File,
        permission: Permission::LocalModify,
        params: vec![
            ("file_path", ParamSchema::required("string")),
            ("old_string", ParamSchema::required("string")),
            ("new_string", ParamSchema::required("string")),
            ("replace_all", ParamSchema::optional("boolean", serde_json::json!(false))),
        ],
        handler: Arc::new(EditFileHandler),
    });

    registry.register(ToolDefinition {
        name: "glob",
        description: "Finds files matching a glob pattern (e.g. \"**/*.rs\"), sorted by \
                      modification time, most recent first.",
        category: ToolCategory::Search,
        permission: Permission::Safe,
        params: vec![
            ("pattern", ParamSchema::required("string")),
            ("path", ParamSchema::optional("string", serde_json::Value::Null)),
        ],
        handler: Arc::new(GlobHandler),
    });

    registry.register(ToolDefinition {
        name: "grep",
        description: "Recursively searches file contents with a regular expression, \
                      honoring .gitignore. Optionally filtered by a glob pattern.",
        category: ToolCategory::Search,
        permission: Permission::Safe,
        params: vec![
            ("pattern", ParamSchema::required("string")),
            ("path", ParamSchema::optional("string", serde_json::Value::Null)),
            ("glob", ParamSchema::optional("string", serde_json::Value::Null)),
        ],
        handler: Arc::new(GrepHandler),
    });

    registry.register(ToolDefinition {
        name: "bash",
        description: "Executes a bash command. The working directory persists between \
                      invocations. Optional timeout in milliseconds (default 120000, max 600000).",
        category: ToolCategory::Command,
        permission: Permission::Dangerous,
        params: vec![
            ("command", ParamSchema::required("string")),
            ("timeout", ParamSchema::optional("number", serde_json::json!(120_000))),
        ],
        handler: Arc::new(BashHandler),
    });

    registry.register(ToolDefinition {
        name: "mkdir",
        description: "Creates a directory and any missing parents. Idempotent.",
        category: ToolCategory::System,
        permission: Permission::LocalModify,
        params: vec![("path", ParamSchema::required("string"))],
        handler: Arc::new(MkdirHandler),
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_builtins() {
        let registry = default_registry();
        for name in ["read_file", "write_file", "edit_file", "glob", "grep", "bash", "mkdir"] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn dangerous_tool_is_bash_only() {
        let registry = default_registry();
        let dangerous: Vec<_> = registry
            .list_all()
            .into_iter()
            .filter(|t| t.permission == Permission::Dangerous)
            .map(|t| t.name)
            .collect();
        assert_eq!(dangerous, vec!["bash"]);
    }
}
