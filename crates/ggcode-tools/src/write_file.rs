//! Write-file handler (§4.B): atomic replace with a `.backup` sidecar.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::registry::{ExecutionContext, ToolHandler};

/// Handler for `write_file`: writes via temp-file-then-rename, keeping a
/// `.backup` copy of any file it overwrites.
pub struct WriteFileHandler;

#[async_trait]
impl ToolHandler for WriteFileHandler {
    async fn run(&self, params: &HashMap<String, Value>, _ctx: &ExecutionContext) -> Result<String, String> {
        let file_path = params.get("file_path").and_then(Value::as_str).ok_or("file_path is required")?;
        let content = params.get("content").and_then(Value::as_str).ok_or("content is required")?;

        let path = std::path::Path::new(file_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| e.to_string())?;
        }

        if path.exists() {
            let mut backup = path.as_os_str().to_os_string();
            backup.push(".backup");
            tokio::fs::copy(path, &backup).await.map_err(|e| e.to_string())?;
        }

        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(format!(".tmp-{}", uuid::Uuid::new_v4().simple()));
        let tmp = std::path::PathBuf::from(tmp);
        tokio::fs::write(&tmp, content).await.map_err(|e| e.to_string())?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| e.to_string())?;

        Ok(format!("Wrote {} bytes to {file_path}", content.len()))
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
    async fn writes_and_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b.txt");
        let mut p = HashMap::new();
        p.insert("file_path".to_string(), Value::String(path.to_str().unwrap().to_string()));
        p.insert("content".to_string(), Value::String("hi".into()));
        WriteFileHandler.run(&p, &ctx()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hi");
    }

    #[tokio::test]
    async fn overwrite_leaves_backup_sidecar() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "old").unwrap();
        let mut p = HashMap::new();
        p.insert("file_path".to_string(), Value::String(path.to_str().unwrap().to_string()));
        p.insert("content".to_string(), Value::String("new".into()));
        WriteFileHandler.run(&p, &ctx()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        let backup = path.with_extension("txt.backup");
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "old");
    }
}
