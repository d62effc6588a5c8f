//! Grep handler (§4.B): recursive regex search over files.

use std::collections::HashMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::registry::{ExecutionContext, ToolHandler};

const MAX_MATCHES: usize = 500;

/// Handler for `grep`: walks a directory (honoring `.gitignore` via the
/// `ignore` crate) and reports `path:line:text` for every regex match.
pub struct GrepHandler;

#[async_trait]
impl ToolHandler for GrepHandler {
    async fn run(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext) -> Result<String, String> {
        let pattern = params.get("pattern").and_then(Value::as_str).ok_or("pattern is required")?;
        let search_dir = params
            .get("path")
            .and_then(Value::as_str)
            .map_or_else(|| ctx.working_directory.clone(), std::path::PathBuf::from);
        let glob_filter = params.get("glob").and_then(Value::as_str);

        let regex = Regex::new(pattern).map_err(|e| format!("invalid regex: {e}"))?;
        let glob_matcher = glob_filter
            .map(|g| globset::Glob::new(g).map(|gl| gl.compile_matcher()))
            .transpose()
            .map_err(|e| format!("invalid glob filter: {e}"))?;

        let mut output = String::new();
        let mut count = 0usize;
        let mut walker = ignore::WalkBuilder::new(&search_dir);
        walker.hidden(true).git_ignore(true);

        for entry in walker.build() {
            if count >= MAX_MATCHES {
                break;
            }
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if let Some(matcher) = &glob_matcher {
                if !matcher.is_match(entry.path()) {
                    continue;
                }
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else { continue };
            for (idx, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    let _ = writeln!(output, "{}:{}:{}", entry.path().display(), idx + 1, line.trim());
                    count += 1;
                    if count >= MAX_MATCHES {
                        break;
                    }
                }
            }
        }

        if count == 0 {
            return Ok(format!("No matches for \"{pattern}\""));
        }
        if count >= MAX_MATCHES {
            let _ = writeln!(output, "... ({MAX_MATCHES}+ matches, truncated)");
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx(root: &std::path::Path) -> ExecutionContext {
        ExecutionContext::new(root.to_path_buf(), root.join("spool"))
    }

    #[tokio::test]
    async fn finds_matching_lines() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main() {}\nfn helper() {}\n").unwrap();
        let mut p = HashMap::new();
        p.insert("pattern".to_string(), Value::String(r"fn \w+\(\)".into()));
        let out = GrepHandler.run(&p, &ctx(dir.path())).await.unwrap();
        assert!(out.contains("main"));
        assert!(out.contains("helper"));
    }

    #[tokio::test]
    async fn glob_filter_narrows_search() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "needle").unwrap();
        std::fs::write(dir.path().join("b.txt"), "needle").unwrap();
        let mut p = HashMap::new();
        p.insert("pattern".to_string(), Value::String("needle".into()));
        p.insert("glob".to_string(), Value::String("*.rs".into()));
        let out = GrepHandler.run(&p, &ctx(dir.path())).await.unwrap();
        assert!(out.contains("a.rs"));
        assert!(!out.contains("b.txt"));
    }

    #[tokio::test]
    async fn no_matches_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "hello").unwrap();
        let mut p = HashMap::new();
        p.insert("pattern".to_string(), Value::String("zzz_absent".into()));
        let out = GrepHandler.run(&p, &ctx(dir.path())).await.unwrap();
        assert!(out.contains("No matches"));
    }

    #[tokio::test]
    async fn invalid_regex_errors() {
        let dir = TempDir::new().unwrap();
        let mut p = HashMap::new();
        p.insert("pattern".to_string(), Value::String("(unclosed".into()));
        assert!(GrepHandler.run(&p, &ctx(dir.path())).await.is_err());
    }
}
