//! Worker notes: an append-only per-lane log of completed-task summaries,
//! so a task that depends on another can read what its dependency did
//! without replaying that history through the LLM. [SUPPLEMENT] grounded
//! on the teacher's `backend/native_team/worker_notes.rs`, adapted to
//! this crate's `u64` task ids and worktree-lane directory layout.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

const MAX_NOTES_IN_PROMPT: usize = 5;
const MAX_SUMMARY_LEN: usize = 500;
const NOTES_FILE: &str = "worker-notes.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerNote {
    pub task_id: u64,
    pub task_title: String,
    pub files_changed: Vec<String>,
    pub summary: String,
}

/// Append a note to the lane's worker-notes.json file.
pub fn append_note(lane_dir: &Path, note: &WorkerNote) -> Result<()> {
    let path = lane_dir.join(NOTES_FILE);
    let mut notes = read_all_notes(lane_dir);
    notes.push(note.clone());
    std::fs::create_dir_all(lane_dir)?;
    std::fs::write(&path, serde_json::to_string_pretty(&notes)?)?;
    Ok(())
}

fn read_all_notes(lane_dir: &Path) -> Vec<WorkerNote> {
    let path = lane_dir.join(NOTES_FILE);
    match std::fs::read_to_string(&path) {
        Ok(c) => serde_json::from_str(&c).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

/// Notes for tasks that `depends_on` names, capped at 5 for prompt use.
pub fn read_dependency_notes(lane_dir: &Path, depends_on: &[u64]) -> Vec<WorkerNote> {
    if depends_on.is_empty() {
        return Vec::new();
    }
    read_all_notes(lane_dir)
        .into_iter()
        .filter(|note| depends_on.contains(&note.task_id))
        .take(MAX_NOTES_IN_PROMPT)
        .collect()
}

/// Detect files changed in `cwd` relative to HEAD, via git.
pub async fn detect_files_changed(cwd: &Path) -> Vec<String> {
    let output = tokio::process::Command::new("git")
        .args(["diff", "--name-only", "HEAD"])
        .current_dir(cwd)
        .output()
        .await;

    match output {
        Ok(o) if o.status.success() => String::from_utf8_lossy(&o.stdout)
            .lines()
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

/// Render notes for inclusion in a system prompt.
pub fn format_notes_for_prompt(notes: &[WorkerNote]) -> String {
    if notes.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n## Notes from Completed Dependencies\n");
    for note in notes.iter().take(MAX_NOTES_IN_PROMPT) {
        out.push_str(&format!("\n**Task {}: {}**\n", note.task_id, note.task_title));
        if !note.files_changed.is_empty() {
            out.push_str(&format!("Files changed: {}\n", note.files_changed.join(", ")));
        }
        let summary = truncate_head(&note.summary, MAX_SUMMARY_LEN);
        if !summary.is_empty() {
            out.push_str(&format!("Summary: {summary}\n"));
        }
    }
    out
}

/// Keep the head of `s` within `max_len` bytes, cut on a char boundary
/// rather than a raw byte offset (summaries may contain non-ASCII text).
fn truncate_head(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let boundary = (0..=max_len).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0);
    &s[..boundary]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn appends_and_reads_notes() {
        let tmp = TempDir::new().unwrap();
        let note = WorkerNote {
            task_id: 1,
            task_title: "Add auth".to_string(),
            files_changed: vec!["src/auth.rs".to_string()],
            summary: "Added JWT middleware".to_string(),
        };
        append_note(tmp.path(), &note).unwrap();
        let notes = read_all_notes(tmp.path());
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].task_id, 1);
    }

    #[test]
    fn dependency_notes_filter_and_cap() {
        let tmp = TempDir::new().unwrap();
        for i in 1..=3u64 {
            append_note(
                tmp.path(),
                &WorkerNote {
                    task_id: i,
                    task_title: format!("Task {i}"),
                    files_changed: vec![],
                    summary: format!("Did task {i}"),
                },
            )
            .unwrap();
        }
        let deps = read_dependency_notes(tmp.path(), &[1, 3]);
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].task_id, 1);
        assert_eq!(deps[1].task_id, 3);
    }

    #[test]
    fn format_notes_empty_is_empty_string() {
        assert!(format_notes_for_prompt(&[]).is_empty());
    }

    #[test]
    fn format_notes_includes_files_and_summary() {
        let notes = vec![WorkerNote {
            task_id: 1,
            task_title: "Add auth".to_string(),
            files_changed: vec!["src/auth.rs".to_string()],
            summary: "Added JWT".to_string(),
        }];
        let out = format_notes_for_prompt(&notes);
        assert!(out.contains("Task 1: Add auth"));
        assert!(out.contains("src/auth.rs"));
        assert!(out.contains("Added JWT"));
    }

    #[test]
    fn format_notes_does_not_panic_on_multibyte_summary() {
        let notes = vec![WorkerNote {
            task_id: 1,
            task_title: "i18n".to_string(),
            files_changed: vec![],
            summary: "é".repeat(MAX_SUMMARY_LEN),
        }];
        let out = format_notes_for_prompt(&notes);
        assert!(out.contains("Summary:"));
    }

    #[test]
    fn truncate_head_lands_on_char_boundary() {
        let s = "é".repeat(10);
        let out = truncate_head(&s, 5);
        assert!(s.is_char_boundary(out.len()));
    }
}
