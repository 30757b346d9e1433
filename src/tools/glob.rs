//! `Glob` leaf tool. Ported from the teacher's `webui/tools/glob.rs`.

use std::path::Path;

use anyhow::{Context, Result};

pub async fn execute(input: &serde_json::Value, cwd: &Path) -> Result<String> {
    let pattern = input
        .get("pattern")
        .and_then(|v| v.as_str())
        .context("Missing required parameter: pattern")?
        .to_string();
    let search_dir = input
        .get("path")
        .and_then(|v| v.as_str())
        .map(|p| cwd.join(p))
        .unwrap_or_else(|| cwd.to_path_buf());

    let full_pattern = search_dir.join(&pattern).to_string_lossy().to_string();

    let matches = tokio::task::spawn_blocking(move || -> Result<Vec<(std::path::PathBuf, std::time::SystemTime)>> {
        let mut entries = Vec::new();
        for entry in glob::glob(&full_pattern).context("Invalid glob pattern")? {
            if let Ok(path) = entry {
                let mtime = std::fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                entries.push((path, mtime));
            }
        }
        Ok(entries)
    })
    .await
    .context("glob task panicked")??;

    let mut matches = matches;
    matches.sort_by(|a, b| b.1.cmp(&a.1));

    if matches.is_empty() {
        return Ok("No files found".to_string());
    }

    Ok(matches
        .into_iter()
        .map(|(path, _)| path.display().to_string())
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn finds_matching_files_sorted_by_mtime() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("a.rs"), "").await.unwrap();
        tokio::fs::write(tmp.path().join("b.rs"), "").await.unwrap();
        let out = execute(&serde_json::json!({"pattern": "*.rs"}), tmp.path())
            .await
            .unwrap();
        assert!(out.contains("a.rs"));
        assert!(out.contains("b.rs"));
    }

    #[tokio::test]
    async fn reports_no_files_found() {
        let tmp = TempDir::new().unwrap();
        let out = execute(&serde_json::json!({"pattern": "*.nonexistent"}), tmp.path())
            .await
            .unwrap();
        assert_eq!(out, "No files found");
    }
}
