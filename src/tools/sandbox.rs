//! Path and command guards shared by the filesystem and shell leaf tools.
//! Ported from the teacher's `webui/tools/sandbox.rs` unchanged in
//! substance.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

/// Resolve a file path relative to the session cwd, canonicalising where
/// possible so `..` and symlinks can't escape in surprising ways.
pub fn validate_path(path: &str, cwd: &Path) -> Result<PathBuf> {
    let resolved = if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        cwd.join(path)
    };

    let canonical = if resolved.exists() {
        resolved.canonicalize().unwrap_or_else(|_| resolved.clone())
    } else if let Some(parent) = resolved.parent() {
        if parent.exists() {
            let canonical_parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
            let file_name = resolved.file_name().unwrap_or_default();
            canonical_parent.join(file_name)
        } else {
            resolved
        }
    } else {
        resolved
    };

    Ok(canonical)
}

/// Block a short denylist of catastrophic shell command patterns.
pub fn check_dangerous_command(command: &str) -> Result<()> {
    let dangerous_patterns = [
        "rm -rf /",
        "rm -rf /*",
        "mkfs.",
        "dd if=/dev/zero",
        ":(){ :|:& };:",
        "> /dev/sda",
    ];

    let lower = command.to_lowercase();
    for pattern in &dangerous_patterns {
        if lower.contains(pattern) {
            bail!("Blocked dangerous command pattern: {pattern}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn validate_path_resolves_relative_against_cwd() {
        let tmp = TempDir::new().unwrap();
        let resolved = validate_path("foo.txt", tmp.path()).unwrap();
        assert!(resolved.starts_with(tmp.path()));
    }

    #[test]
    fn check_dangerous_command_blocks_known_patterns() {
        assert!(check_dangerous_command("rm -rf /").is_err());
        assert!(check_dangerous_command("echo hi").is_ok());
    }
}
