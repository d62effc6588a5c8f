//! Project instructions loader (§4.L): loads `AGENTS.md` files, falling
//! back to `CLAUDE.md` for compatibility with existing projects.
//!
//! Loading order:
//! 1. `~/.ggcode/instructions.md` (global user instructions)
//! 2. `AGENTS.md` in workspace root (takes priority)
//! 3. `.ggcode/AGENTS.md` in workspace root (additive, loaded alongside root file)
//! 4. Fallback: `CLAUDE.md` in workspace root (only if no `AGENTS.md`)
//! 5. `.claude/CLAUDE.md` in workspace root (additive, loaded alongside fallback)

use std::path::Path;

/// Load project instructions from the workspace and global config.
///
/// Returns the concatenated instructions text, or an empty string if none found.
#[must_use]
pub fn load_project_instructions(workspace_root: &Path) -> String {
    let mut sections = Vec::new();

    if let Some(home) = std::env::var("HOME").ok().map(std::path::PathBuf::from) {
        let global_path = home.join(".ggcode").join("instructions.md");
        if let Ok(content) = std::fs::read_to_string(&global_path) {
            if !content.trim().is_empty() {
                sections.push(content);
            }
        }
    }

    let agents_md = workspace_root.join("AGENTS.md");
    if let Ok(content) = std::fs::read_to_string(&agents_md) {
        if !content.trim().is_empty() {
            sections.push(content);

            let dot_agents_md = workspace_root.join(".ggcode").join("AGENTS.md");
            if let Ok(content) = std::fs::read_to_string(&dot_agents_md) {
                if !content.trim().is_empty() {
                    sections.push(content);
                }
            }
            return sections.join("\n\n---\n\n");
        }
    }

    let dot_agents_md = workspace_root.join(".ggcode").join("AGENTS.md");
    if let Ok(content) = std::fs::read_to_string(&dot_agents_md) {
        if !content.trim().is_empty() {
            sections.push(content);
            return sections.join("\n\n---\n\n");
        }
    }

    let claude_md = workspace_root.join("CLAUDE.md");
    if let Ok(content) = std::fs::read_to_string(&claude_md) {
        if !content.trim().is_empty() {
            sections.push(content);
        }
    }
    let claude_dir_md = workspace_root.join(".claude").join("CLAUDE.md");
    if let Ok(content) = std::fs::read_to_string(&claude_dir_md) {
        if !content.trim().is_empty() {
            sections.push(content);
        }
    }

    sections.join("\n\n---\n\n")
}
