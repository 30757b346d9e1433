//! `Edit` leaf tool. Ported from the teacher's `webui/tools/edit.rs`.

use std::path::Path;

use anyhow::{bail, Context, Result};

use super::sandbox;

pub async fn execute(input: &serde_json::Value, cwd: &Path) -> Result<String> {
    let file_path = input
        .get("file_path")
        .and_then(|v| v.as_str())
        .context("Missing required parameter: file_path")?;
    let old_string = input
        .get("old_string")
        .and_then(|v| v.as_str())
        .context("Missing required parameter: old_string")?;
    let new_string = input
        .get("new_string")
        .and_then(|v| v.as_str())
        .context("Missing required parameter: new_string")?;
    let replace_all = input
        .get("replace_all")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if old_string == new_string {
        bail!("old_string and new_string are identical");
    }

    let resolved = sandbox::validate_path(file_path, cwd)?;
    let content = tokio::fs::read_to_string(&resolved)
        .await
        .with_context(|| format!("Cannot read file '{}'", resolved.display()))?;

    let match_count = content.matches(old_string).count();
    if match_count == 0 {
        bail!("old_string not found in {}", resolved.display());
    }
    if match_count > 1 && !replace_all {
        bail!(
            "old_string matched {match_count} times in {}; pass replace_all or give more context",
            resolved.display()
        );
    }

    let updated = if replace_all {
        content.replace(old_string, new_string)
    } else {
        content.replacen(old_string, new_string, 1)
    };

    tokio::fs::write(&resolved, &updated)
        .await
        .with_context(|| format!("Cannot write file '{}'", resolved.display()))?;

    Ok(format!(
        "Replaced {} occurrence(s) in {}",
        if replace_all { match_count } else { 1 },
        resolved.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn replaces_single_occurrence_by_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        tokio::fs::write(&path, "foo bar foo").await.unwrap();
        let err = execute(
            &serde_json::json!({"file_path": path, "old_string": "foo", "new_string": "baz"}),
            tmp.path(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("matched 2 times"));
    }

    #[tokio::test]
    async fn replace_all_rewrites_every_occurrence() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        tokio::fs::write(&path, "foo bar foo").await.unwrap();
        execute(
            &serde_json::json!({
                "file_path": path, "old_string": "foo", "new_string": "baz", "replace_all": true
            }),
            tmp.path(),
        )
        .await
        .unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "baz bar baz");
    }

    #[tokio::test]
    async fn missing_old_string_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        tokio::fs::write(&path, "hello").await.unwrap();
        let err = execute(
            &serde_json::json!({"file_path": path, "old_string": "nope", "new_string": "x"}),
            tmp.path(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
