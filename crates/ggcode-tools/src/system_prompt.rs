//! System prompt assembly (§4.L): identity preamble + workspace/platform
//! context + tool-usage guidance + project instructions.

use std::path::Path;

use crate::instructions::load_project_instructions;

/// Build the complete system prompt for an agent session: identity,
/// workspace context, tool guidelines, and project instructions loaded
/// from `AGENTS.md`/`CLAUDE.md`.
#[must_use]
pub fn build_system_prompt(workspace_root: &Path) -> String {
    let project_name = workspace_root
        .file_name()
        .map_or_else(|| "project".to_string(), |n| n.to_string_lossy().to_string());
    let instructions = load_project_instructions(workspace_root);
    let os = std::env::consts::OS;

    let mut prompt = format!(
        "You are an AI coding assistant working in the project \"{project_name}\".\n\n\
         # Environment\n\
         - Current working directory: {workspace}\n\
         - Platform: {os}\n\n",
        workspace = workspace_root.display()
    );

    prompt.push_str(TOOL_GUIDELINES);

    if !instructions.is_empty() {
        prompt.push_str("\n\n# Project Instructions\n\n");
        prompt.push_str(&instructions);
    }

    prompt
}

/// Tool usage guidelines for the LLM.
const TOOL_GUIDELINES: &str = "\
# Tool Usage Guidelines

## File Operations
- Always read a file before editing it — understand existing code before modifying.
- Prefer `edit_file` over `write_file` for existing files — edits are safer and more precise.
- Use `read_file` with offset/limit for large files instead of reading the entire file.

## Search
- Use `glob` to find files by name pattern before using `grep` to search contents.
- Use `grep` with a glob filter to narrow searches to relevant file types.

## Execution
- Use `bash` for git, build tools, package managers, and other terminal operations.
- Do NOT use `bash` for file operations — use the dedicated file tools instead.
- The bash working directory persists between calls.

## General
- Read before writing. Understand before changing.
- Make minimal, focused changes. Don't add unnecessary modifications.";

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn basic_prompt_includes_identity_and_guidelines() {
        let dir = TempDir::new().unwrap();
        let prompt = build_system_prompt(dir.path());
        assert!(prompt.contains("AI coding assistant"));
        assert!(prompt.contains("Tool Usage Guidelines"));
        assert!(prompt.contains("File Operations"));
    }

    #[test]
    fn includes_project_instructions_when_present() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "# Custom Rules\nDo X not Y.").unwrap();
        let prompt = build_system_prompt(dir.path());
        assert!(prompt.contains("Project Instructions"));
        assert!(prompt.contains("Custom Rules"));
    }

    #[test]
    fn includes_workspace_path() {
        let dir = TempDir::new().unwrap();
        let prompt = build_system_prompt(dir.path());
        assert!(prompt.contains(&dir.path().display().to_string()));
    }
}
