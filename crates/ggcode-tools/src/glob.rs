//! Glob handler (§4.B): finds files matching a glob pattern.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::Value;
use walkdir::WalkDir;

use crate::registry::{ExecutionContext, ToolHandler};

/// Handler for `glob`: walks a directory matching file paths against a
/// glob pattern, returning results sorted by modification time (most
/// recent first).
pub struct GlobHandler;

#[async_trait]
impl ToolHandler for GlobHandler {
    async fn run(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext) -> Result<String, String> {
        let pattern = params.get("pattern").and_then(Value::as_str).ok_or("pattern is required")?;
        let search_dir = params
            .get("path")
            .and_then(Value::as_str)
            .map_or_else(|| ctx.working_directory.clone(), PathBuf::from);

        if !search_dir.exists() {
            return Err(format!("path not found: {}", search_dir.display()));
        }
        let search_dir = search_dir.canonicalize().map_err(|e| e.to_string())?;

        let glob = globset::GlobBuilder::new(pattern)
            .literal_separator(false)
            .build()
            .map_err(|e| format!("invalid glob pattern: {e}"))?
            .compile_matcher();

        let mut matches: Vec<(PathBuf, SystemTime)> = Vec::new();
        for entry in WalkDir::new(&search_dir).follow_links(false).into_iter().filter_entry(|e| {
            e.depth() == 0 || e.file_name().to_str().is_none_or(|s| !s.starts_with('.'))
        }) {
            let Ok(entry) = entry else { continue };
            if entry.file_type().is_dir() {
                continue;
            }
            let rel_path = entry.path().strip_prefix(&search_dir).unwrap_or(entry.path());
            if glob.is_match(rel_path) {
                let mtime = entry.metadata().ok().and_then(|m| m.modified().ok()).unwrap_or(SystemTime::UNIX_EPOCH);
                matches.push((entry.path().to_path_buf(), mtime));
            }
        }
        matches.sort_by(|a, b| b.1.cmp(&a.1));

        if matches.is_empty() {
            return Ok(format!("No files matching \"{pattern}\" found"));
        }
        let mut output = String::new();
        for (path, _) in &matches {
            output.push_str(&path.display().to_string());
            output.push('\n');
        }
        let _ = write!(output, "\n({} files matched)", matches.len());
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
    async fn matches_by_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "").unwrap();
        std::fs::write(dir.path().join("b.rs"), "").unwrap();
        std::fs::write(dir.path().join("c.txt"), "").unwrap();
        let mut p = HashMap::new();
        p.insert("pattern".to_string(), Value::String("*.rs".into()));
        let out = GlobHandler.run(&p, &ctx(dir.path())).await.unwrap();
        assert!(out.contains("a.rs"));
        assert!(out.contains("b.rs"));
        assert!(!out.contains("c.txt"));
        assert!(out.contains("2 files matched"));
    }

    #[tokio::test]
    async fn recursive_pattern_descends_subdirs() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/sub")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/sub/lib.rs"), "").unwrap();
        let mut p = HashMap::new();
        p.insert("pattern".to_string(), Value::String("**/*.rs".into()));
        let out = GlobHandler.run(&p, &ctx(dir.path())).await.unwrap();
        assert!(out.contains("main.rs"));
        assert!(out.contains("lib.rs"));
    }

    #[tokio::test]
    async fn skips_hidden_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config"), "").unwrap();
        std::fs::write(dir.path().join("visible.rs"), "").unwrap();
        let mut p = HashMap::new();
        p.insert("pattern".to_string(), Value::String("**/*".into()));
        let out = GlobHandler.run(&p, &ctx(dir.path())).await.unwrap();
        assert!(out.contains("visible.rs"));
        assert!(!out.contains(".git"));
    }

    #[tokio::test]
    async fn no_matches_reports_clearly() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let mut p = HashMap::new();
        p.insert("pattern".to_string(), Value::String("*.rs".into()));
        let out = GlobHandler.run(&p, &ctx(dir.path())).await.unwrap();
        assert!(out.contains("No files matching"));
    }

    #[tokio::test]
    async fn invalid_pattern_errors() {
        let dir = TempDir::new().unwrap();
        let mut p = HashMap::new();
        p.insert("pattern".to_string(), Value::String("[invalid".into()));
        assert!(GlobHandler.run(&p, &ctx(dir.path())).await.is_err());
    }
}
