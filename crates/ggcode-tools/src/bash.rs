//! Bash handler (§4.B, §5): shell execution with timeout and byte cap, and
//! a persistent working directory across invocations within a turn.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::registry::{ExecutionContext, ToolHandler};

/// Default timeout, per spec.md §5 (shell tool: 120s).
const DEFAULT_TIMEOUT_MS: u64 = 120_000;
/// Hard ceiling on a caller-supplied timeout.
const MAX_TIMEOUT_MS: u64 = 600_000;
/// Output byte cap before the registry's own truncation window applies;
/// kept generous so small overflows still show full context.
const MAX_OUTPUT_BYTES: usize = 200_000;
/// Sentinel marking the boundary between command output and the
/// post-command working directory in the wrapped script's stdout.
const CWD_SENTINEL: &str = "__GGCODE_CWD__";

/// Handler for `bash`: runs a command via `bash -c`, tracking `cwd` across
/// calls so `cd` persists for the rest of the turn.
pub struct BashHandler;

#[async_trait]
impl ToolHandler for BashHandler {
    async fn run(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext) -> Result<String, String> {
        let command = params.get("command").and_then(Value::as_str).ok_or("command is required")?;
        let timeout_ms = params
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
            .min(MAX_TIMEOUT_MS);

        let cwd = ctx.cwd.read().await.clone();
        let wrapped = format!("{command}\n__GGCODE_EXIT__=$?\necho \"{CWD_SENTINEL}\"\npwd\nexit $__GGCODE_EXIT__");

        let outcome = tokio::select! {
            result = tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), run_bash(&wrapped, &cwd)) => result,
            () = ctx.abort.cancelled() => return Err("cancelled".to_string()),
        };

        match outcome {
            Ok(Ok((stdout, stderr, exit_code))) => {
                let (output, new_cwd) = parse_sentinel_output(&stdout);
                if let Some(new_cwd) = new_cwd {
                    *ctx.cwd.write().await = new_cwd;
                }

                let mut text = String::new();
                if !output.is_empty() {
                    text.push_str(&output);
                }
                if !stderr.is_empty() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str("STDERR:\n");
                    text.push_str(&stderr);
                }
                if exit_code != 0 {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&format!("(exit code: {exit_code})"));
                }
                if text.is_empty() {
                    text.push_str("(no output)");
                }
                if text.len() > MAX_OUTPUT_BYTES {
                    text.truncate(MAX_OUTPUT_BYTES);
                    text.push_str("\n... (output exceeded byte cap)");
                }
                Ok(text)
            },
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timeout after {timeout_ms}ms")),
        }
    }
}

async fn run_bash(command: &str, cwd: &std::path::Path) -> std::io::Result<(String, String, i32)> {
    let output = Command::new("bash").arg("-c").arg(command).current_dir(cwd).output().await?;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);
    Ok((stdout, stderr, exit_code))
}

fn parse_sentinel_output(stdout: &str) -> (String, Option<PathBuf>) {
    if let Some(sentinel_pos) = stdout.find(CWD_SENTINEL) {
        let output = stdout[..sentinel_pos].trim_end().to_string();
        let after = &stdout[sentinel_pos.saturating_add(CWD_SENTINEL.len())..];
        let new_cwd = after.lines().find(|l| !l.is_empty()).map(|l| PathBuf::from(l.trim()));
        (output, new_cwd)
    } else {
        (stdout.to_string(), None)
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
    async fn echoes_stdout() {
        let dir = TempDir::new().unwrap();
        let mut p = HashMap::new();
        p.insert("command".to_string(), Value::String("echo hello".into()));
        let out = BashHandler.run(&p, &ctx(dir.path())).await.unwrap();
        assert!(out.contains("hello"));
    }

    #[tokio::test]
    async fn nonzero_exit_reported() {
        let dir = TempDir::new().unwrap();
        let mut p = HashMap::new();
        p.insert("command".to_string(), Value::String("exit 42".into()));
        let out = BashHandler.run(&p, &ctx(dir.path())).await.unwrap();
        assert!(out.contains("exit code: 42"));
    }

    #[tokio::test]
    async fn stderr_labeled() {
        let dir = TempDir::new().unwrap();
        let mut p = HashMap::new();
        p.insert("command".to_string(), Value::String("echo oops >&2".into()));
        let out = BashHandler.run(&p, &ctx(dir.path())).await.unwrap();
        assert!(out.contains("STDERR"));
        assert!(out.contains("oops"));
    }

    #[tokio::test]
    async fn cwd_persists_across_calls() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        let c = ctx(dir.path());
        let mut p = HashMap::new();
        p.insert("command".to_string(), Value::String("cd subdir".into()));
        BashHandler.run(&p, &c).await.unwrap();
        assert!(c.cwd.read().await.ends_with("subdir"));

        let mut p2 = HashMap::new();
        p2.insert("command".to_string(), Value::String("pwd".into()));
        let out = BashHandler.run(&p2, &c).await.unwrap();
        assert!(out.contains("subdir"));
    }

    #[tokio::test]
    async fn timeout_triggers_on_long_command() {
        let dir = TempDir::new().unwrap();
        let mut p = HashMap::new();
        p.insert("command".to_string(), Value::String("sleep 5".into()));
        p.insert("timeout".to_string(), Value::from(50));
        let err = BashHandler.run(&p, &ctx(dir.path())).await.unwrap_err();
        assert!(err.contains("timeout"));
    }
}
