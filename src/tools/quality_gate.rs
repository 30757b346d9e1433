//! Quality gate: runs a language-appropriate verification command before a
//! lane's work is considered done. [SUPPLEMENT] grounded on the teacher's
//! `backend/native_team/quality_gate.rs`; the teacher's own command string
//! comes from a `prompts::build_verification_commands` helper this crate
//! doesn't carry forward, so the language-to-command mapping here is the
//! teacher's own fallback branch, used directly rather than through that
//! helper.

use std::path::{Path, PathBuf};
use std::time::Duration;

const FAILURE_OUTPUT_LIMIT: usize = 2000;

pub struct QualityGateConfig {
    pub command: String,
    pub timeout: Duration,
    pub cwd: PathBuf,
}

pub enum GateResult {
    Passed,
    Failed { output: String },
    Timeout,
}

pub async fn run_quality_gate(config: &QualityGateConfig) -> GateResult {
    match tokio::time::timeout(config.timeout, run_command(config)).await {
        Ok(Ok(output)) if output.success => GateResult::Passed,
        Ok(Ok(output)) => GateResult::Failed {
            output: truncate(&output.combined, FAILURE_OUTPUT_LIMIT),
        },
        Ok(Err(e)) => GateResult::Failed {
            output: format!("Failed to run quality gate: {e}"),
        },
        Err(_) => GateResult::Timeout,
    }
}

/// Detect project languages from marker files in `cwd`, the way the
/// teacher's `commands/start/hooks.rs::detect_project_languages` does
/// before a drone ever starts (package.json maps to "javascript" here,
/// not "node", to line up with `build_gate_config`'s match arms below).
pub fn detect_project_languages(cwd: &Path) -> Vec<String> {
    const MARKERS: &[(&[&str], &str)] = &[
        (&["Cargo.toml"], "rust"),
        (&["package.json"], "javascript"),
        (&["go.mod"], "go"),
        (&["pyproject.toml", "requirements.txt"], "python"),
    ];

    MARKERS
        .iter()
        .filter(|(files, _)| files.iter().any(|f| cwd.join(f).exists()))
        .map(|(_, lang)| lang.to_string())
        .collect()
}

/// Pick a verification command from the lane's detected languages.
/// Returns `None` if no language is recognised.
pub fn build_gate_config(project_languages: &[String], cwd: &Path) -> Option<QualityGateConfig> {
    let command = project_languages.iter().find_map(|lang| {
        match lang.to_lowercase().as_str() {
            "rust" => Some("cargo check".to_string()),
            "typescript" | "javascript" => Some("npx tsc --noEmit".to_string()),
            "python" => Some("python -m py_compile".to_string()),
            "go" => Some("go build ./...".to_string()),
            _ => None,
        }
    })?;

    Some(QualityGateConfig {
        command,
        timeout: Duration::from_secs(120),
        cwd: cwd.to_path_buf(),
    })
}

struct CommandOutput {
    success: bool,
    combined: String,
}

async fn run_command(config: &QualityGateConfig) -> anyhow::Result<CommandOutput> {
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&config.command)
        .current_dir(&config.cwd)
        .output()
        .await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    Ok(CommandOutput {
        success: output.status.success(),
        combined: format!("{stdout}{stderr}"),
    })
}

/// Keep the tail of `s` within `max_len` bytes, cut on a char boundary
/// rather than a raw byte offset (command output is not guaranteed ASCII).
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let cut = s.len() - max_len;
    let boundary = (cut..=s.len()).find(|&i| s.is_char_boundary(i)).unwrap_or(s.len());
    format!("...{}", &s[boundary..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_when_command_succeeds() {
        let config = QualityGateConfig {
            command: "true".to_string(),
            timeout: Duration::from_secs(5),
            cwd: std::env::temp_dir(),
        };
        assert!(matches!(run_quality_gate(&config).await, GateResult::Passed));
    }

    #[tokio::test]
    async fn fails_with_captured_output() {
        let config = QualityGateConfig {
            command: "echo 'error: bad' && false".to_string(),
            timeout: Duration::from_secs(5),
            cwd: std::env::temp_dir(),
        };
        assert!(matches!(
            run_quality_gate(&config).await,
            GateResult::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn times_out() {
        let config = QualityGateConfig {
            command: "sleep 10".to_string(),
            timeout: Duration::from_millis(100),
            cwd: std::env::temp_dir(),
        };
        assert!(matches!(run_quality_gate(&config).await, GateResult::Timeout));
    }

    #[test]
    fn picks_cargo_check_for_rust() {
        let config = build_gate_config(&["rust".to_string()], Path::new("/tmp")).unwrap();
        assert!(config.command.contains("cargo"));
    }

    #[test]
    fn returns_none_for_unknown_languages() {
        assert!(build_gate_config(&[], Path::new("/tmp")).is_none());
    }

    #[test]
    fn detects_rust_marker_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("Cargo.toml"), "").unwrap();
        assert_eq!(detect_project_languages(tmp.path()), vec!["rust".to_string()]);
    }

    #[test]
    fn truncate_does_not_panic_on_multibyte_boundary() {
        let s = "é".repeat(100);
        let out = truncate(&s, 5);
        assert!(out.starts_with("..."));
    }

    #[test]
    fn truncate_is_noop_under_limit() {
        assert_eq!(truncate("hi", 10), "hi");
    }
}
