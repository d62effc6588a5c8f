//! Read-file handler (§4.B): line-range, line-numbered output.

use std::collections::HashMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use serde_json::Value;

use crate::registry::ExecutionContext;
use crate::registry::ToolHandler;

const DEFAULT_LINE_LIMIT: usize = 2000;
const MAX_LINE_LENGTH: usize = 2000;

/// Handler for `read_file`: reads a file and returns it `cat -n` style.
pub struct ReadFileHandler;

#[async_trait]
impl ToolHandler for ReadFileHandler {
    async fn run(&self, params: &HashMap<String, Value>, _ctx: &ExecutionContext) -> Result<String, String> {
        let file_path = params
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or("file_path is required")?;
        let offset = params.get("offset").and_then(Value::as_u64).map(|v| v as usize);
        let limit = params
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_LINE_LIMIT, |v| v as usize);

        let path = std::path::Path::new(file_path);
        if !path.exists() {
            return Err(format!("file not found: {file_path}"));
        }

        let raw = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
        let check_len = raw.len().min(8192);
        if raw[..check_len].contains(&0) {
            return Err(format!("{file_path} appears to be a binary file"));
        }
        let content = String::from_utf8(raw).map_err(|_| format!("{file_path} is not valid UTF-8"))?;

        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();
        let start = offset.map_or(0, |o| o.saturating_sub(1));
        let end = start.saturating_add(limit).min(total_lines);

        if start >= total_lines {
            return Ok(format!("(file has {total_lines} lines, offset {start} is past end)"));
        }

        let mut output = String::new();
        for (idx, &line) in lines[start..end].iter().enumerate() {
            let line_num = start + idx + 1;
            let display_line = if line.len() > MAX_LINE_LENGTH { &line[..MAX_LINE_LENGTH] } else { line };
            let _ = writeln!(output, "{line_num:>6}\t{display_line}");
        }
        if end < total_lines {
            let _ = write!(output, "\n(showing lines {}-{end} of {total_lines}; use offset/limit for more)", start + 1);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as IoWrite;
    use tempfile::NamedTempFile;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(std::env::temp_dir(), std::env::temp_dir().join("ggcode-test-spool"))
    }

    #[tokio::test]
    async fn reads_lines_numbered() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "a").unwrap();
        writeln!(f, "b").unwrap();
        let mut p = HashMap::new();
        p.insert("file_path".to_string(), Value::String(f.path().to_str().unwrap().to_string()));
        let out = ReadFileHandler.run(&p, &ctx()).await.unwrap();
        assert!(out.contains("     1\ta"));
        assert!(out.contains("     2\tb"));
    }

    #[tokio::test]
    async fn missing_file_errors() {
        let mut p = HashMap::new();
        p.insert("file_path".to_string(), Value::String("/tmp/ggcode-nonexistent-xyz.txt".into()));
        let err = ReadFileHandler.run(&p, &ctx()).await.unwrap_err();
        assert!(err.contains("not found"));
    }

    #[tokio::test]
    async fn offset_and_limit_window_output() {
        let mut f = NamedTempFile::new().unwrap();
        for i in 1..=20 {
            writeln!(f, "line {i}").unwrap();
        }
        let mut p = HashMap::new();
        p.insert("file_path".to_string(), Value::String(f.path().to_str().unwrap().to_string()));
        p.insert("offset".to_string(), Value::from(5));
        p.insert("limit".to_string(), Value::from(3));
        let out = ReadFileHandler.run(&p, &ctx()).await.unwrap();
        assert!(out.contains("line 5"));
        assert!(out.contains("line 7"));
        assert!(!out.contains("line 8"));
    }
}
