//! Edit-file handler (§4.B): exact-string replace, first-match or global.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::registry::{ExecutionContext, ToolHandler};

/// Handler for `edit_file`: replaces `old_string` with `new_string`.
/// Fails unless `old_string` is unique in the file, unless `replace_all`
/// is set.
pub struct EditFileHandler;

#[async_trait]
impl ToolHandler for EditFileHandler {
    async fn run(&self, params: &HashMap<String, Value>, _ctx: &ExecutionContext) -> Result<String, String> {
        let file_path = params.get("file_path").and_then(Value::as_str).ok_or("file_path is required")?;
        let old_string = params.get("old_string").and_then(Value::as_str).ok_or("old_string is required")?;
        let new_string = params.get("new_string").and_then(Value::as_str).ok_or("new_string is required")?;
        let replace_all = params.get("replace_all").and_then(Value::as_bool).unwrap_or(false);

        let path = std::path::Path::new(file_path);
        if !path.exists() {
            return Err(format!("file not found: {file_path}"));
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| e.to_string())?;
        let count = content.matches(old_string).count();
        if count == 0 {
            return Err(format!("old_string not found in {file_path}"));
        }
        if count > 1 && !replace_all {
            return Err(format!(
                "old_string found {count} times in {file_path} — use replace_all or provide more context to make it unique"
            ));
        }

        let new_content = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };
        tokio::fs::write(path, &new_content).await.map_err(|e| e.to_string())?;

        if replace_all && count > 1 {
            Ok(format!("Replaced {count} occurrences in {file_path}"))
        } else {
            Ok(format!("Edited {file_path}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(std::env::temp_dir(), std::env::temp_dir().join("ggcode-test-spool"))
    }

    #[tokio::test]
    async fn single_occurrence_replaced() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "hello world").unwrap();
        let mut p = HashMap::new();
        p.insert("file_path".to_string(), Value::String(f.path().to_str().unwrap().into()));
        p.insert("old_string".to_string(), Value::String("hello".into()));
        p.insert("new_string".to_string(), Value::String("goodbye".into()));
        let out = EditFileHandler.run(&p, &ctx()).await.unwrap();
        assert!(out.contains("Edited"));
        assert_eq!(std::fs::read_to_string(f.path()).unwrap(), "goodbye world");
    }

    #[tokio::test]
    async fn missing_file_errors() {
        let mut p = HashMap::new();
        p.insert("file_path".to_string(), Value::String("/tmp/ggcode_nonexistent_12345.txt".into()));
        p.insert("old_string".to_string(), Value::String("a".into()));
        p.insert("new_string".to_string(), Value::String("b".into()));
        assert!(EditFileHandler.run(&p, &ctx()).await.is_err());
    }

    #[tokio::test]
    async fn ambiguous_match_requires_replace_all() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "a a a").unwrap();
        let mut p = HashMap::new();
        p.insert("file_path".to_string(), Value::String(f.path().to_str().unwrap().into()));
        p.insert("old_string".to_string(), Value::String("a".into()));
        p.insert("new_string".to_string(), Value::String("b".into()));
        let err = EditFileHandler.run(&p, &ctx()).await.unwrap_err();
        assert!(err.contains("3 times"));
    }

    #[tokio::test]
    async fn replace_all_replaces_every_occurrence() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "a a a").unwrap();
        let mut p = HashMap::new();
        p.insert("file_path".to_string(), Value::String(f.path().to_str().unwrap().into()));
        p.insert("old_string".to_string(), Value::String("a".into()));
        p.insert("new_string".to_string(), Value::String("b".into()));
        p.insert("replace_all".to_string(), Value::Bool(true));
        let out = EditFileHandler.run(&p, &ctx()).await.unwrap();
        assert!(out.contains("Replaced 3"));
        assert_eq!(std::fs::read_to_string(f.path()).unwrap(), "b b b");
    }
}
