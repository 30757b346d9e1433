//! `Bash` leaf tool. Ported from the teacher's `webui/tools/bash.rs`.
//! Foreground execution only; the worktree and background subsystems run
//! their own shell commands under the longer 300s/50000-byte caps.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use super::sandbox;

const DEFAULT_TIMEOUT_MS: u64 = 120_000;
const MAX_TIMEOUT_MS: u64 = 600_000;
const OUTPUT_LIMIT: usize = 30_000;

pub async fn execute(input: &serde_json::Value, cwd: &Path) -> Result<String> {
    let command = input
        .get("command")
        .and_then(|v| v.as_str())
        .context("Missing required parameter: command")?;
    sandbox::check_dangerous_command(command)?;

    let timeout_ms = input
        .get("timeout")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_TIMEOUT_MS)
        .min(MAX_TIMEOUT_MS);

    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .output();

    let output = match tokio::time::timeout(Duration::from_millis(timeout_ms), child).await {
        Ok(result) => result.context("Failed to spawn command")?,
        Err(_) => return Ok(format!("Error: Timeout ({}ms)", timeout_ms)),
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut merged = String::new();
    merged.push_str(&stdout);
    if !stderr.is_empty() {
        if !merged.is_empty() {
            merged.push('\n');
        }
        merged.push_str(&stderr);
    }

    if merged.len() > OUTPUT_LIMIT {
        merged.truncate(OUTPUT_LIMIT);
        merged.push_str("\n... (output truncated)");
    }

    if !output.status.success() {
        merged.push_str(&format!("\n(exit code: {})", output.status.code().unwrap_or(-1)));
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_command_and_captures_stdout() {
        let out = execute(&serde_json::json!({"command": "echo hello"}), Path::new("."))
            .await
            .unwrap();
        assert!(out.contains("hello"));
    }

    #[tokio::test]
    async fn rejects_dangerous_commands() {
        let err = execute(&serde_json::json!({"command": "rm -rf /"}), Path::new("."))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Blocked"));
    }

    #[tokio::test]
    async fn times_out_long_running_commands() {
        let out = execute(
            &serde_json::json!({"command": "sleep 5", "timeout": 100}),
            Path::new("."),
        )
        .await
        .unwrap();
        assert!(out.starts_with("Error: Timeout"));
    }
}
