//! `Write` leaf tool. Ported from the teacher's `webui/tools/write.rs`.

use std::path::Path;

use anyhow::{Context, Result};

use super::sandbox;

pub async fn execute(input: &serde_json::Value, cwd: &Path) -> Result<String> {
    let file_path = input
        .get("file_path")
        .and_then(|v| v.as_str())
        .context("Missing required parameter: file_path")?;
    let content = input
        .get("content")
        .and_then(|v| v.as_str())
        .context("Missing required parameter: content")?;

    let resolved = sandbox::validate_path(file_path, cwd)?;
    if let Some(parent) = resolved.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Cannot create directory '{}'", parent.display()))?;
    }
    tokio::fs::write(&resolved, content)
        .await
        .with_context(|| format!("Cannot write file '{}'", resolved.display()))?;

    let line_count = content.lines().count();
    Ok(format!("Wrote {} lines to {}", line_count, resolved.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn creates_parent_dirs_and_writes_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/file.txt");
        let out = execute(
            &serde_json::json!({"file_path": path, "content": "a\nb\n"}),
            tmp.path(),
        )
        .await
        .unwrap();
        assert!(out.starts_with("Wrote 2 lines"));
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "a\nb\n");
    }
}
