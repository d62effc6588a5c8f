//! Mkdir handler (§4.B): recursive, idempotent directory creation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::registry::{ExecutionContext, ToolHandler};

/// Handler for `mkdir`: creates a directory and any missing parents.
/// Succeeds without effect if the directory already exists.
pub struct MkdirHandler;

#[async_trait]
impl ToolHandler for MkdirHandler {
    async fn run(&self, params: &HashMap<String, Value>, _ctx: &ExecutionContext) -> Result<String, String> {
        let path = params.get("path").and_then(Value::as_str).ok_or("path is required")?;
        tokio::fs::create_dir_all(path).await.map_err(|e| e.to_string())?;
        Ok(format!("Created {path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(std::env::temp_dir(), std::env::temp_dir().join("ggcode-test-spool"))
    }

    #[tokio::test]
    async fn creates_nested_directories() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a/b/c");
        let mut p = HashMap::new();
        p.insert("path".to_string(), Value::String(target.to_str().unwrap().into()));
        MkdirHandler.run(&p, &ctx()).await.unwrap();
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn idempotent_on_existing_directory() {
        let dir = TempDir::new().unwrap();
        let mut p = HashMap::new();
        p.insert("path".to_string(), Value::String(dir.path().to_str().unwrap().into()));
        assert!(MkdirHandler.run(&p, &ctx()).await.is_ok());
        assert!(MkdirHandler.run(&p, &ctx()).await.is_ok());
    }
}
