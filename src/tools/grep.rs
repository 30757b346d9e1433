//! `Grep` leaf tool. Ported from the teacher's `webui/tools/grep.rs`; shells
//! out to `rg` rather than re-implementing a regex search engine.

use std::path::Path;

use anyhow::{Context, Result};

pub async fn execute(input: &serde_json::Value, cwd: &Path) -> Result<String> {
    let pattern = input
        .get("pattern")
        .and_then(|v| v.as_str())
        .context("Missing required parameter: pattern")?;
    let search_path = input.get("path").and_then(|v| v.as_str()).unwrap_or(".");
    let output_mode = input
        .get("output_mode")
        .and_then(|v| v.as_str())
        .unwrap_or("files_with_matches");

    let mut args: Vec<String> = Vec::new();
    match output_mode {
        "content" => {
            args.push("--line-number".to_string());
        }
        "count" => {
            args.push("--count".to_string());
        }
        _ => {
            args.push("--files-with-matches".to_string());
        }
    }

    if input
        .get("-i")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        args.push("--ignore-case".to_string());
    }
    if let Some(glob) = input.get("glob").and_then(|v| v.as_str()) {
        args.push("--glob".to_string());
        args.push(glob.to_string());
    }
    if let Some(ty) = input.get("type").and_then(|v| v.as_str()) {
        args.push("--type".to_string());
        args.push(ty.to_string());
    }

    args.push(pattern.to_string());
    args.push(search_path.to_string());

    let output = tokio::process::Command::new("rg")
        .args(&args)
        .current_dir(cwd)
        .output()
        .await
        .context("Failed to spawn rg; is ripgrep installed?")?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if stdout.trim().is_empty() {
        if output.status.code() == Some(1) {
            return Ok("No matches found".to_string());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            anyhow::bail!("rg failed: {stderr}");
        }
    }

    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn finds_files_containing_pattern() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("a.txt"), "hello world").await.unwrap();
        let out = execute(&serde_json::json!({"pattern": "hello"}), tmp.path())
            .await
            .unwrap();
        assert!(out.contains("a.txt"));
    }

    #[tokio::test]
    async fn reports_no_matches_found() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("a.txt"), "hello world").await.unwrap();
        let out = execute(&serde_json::json!({"pattern": "zzzzz"}), tmp.path())
            .await
            .unwrap();
        assert_eq!(out, "No matches found");
    }
}
