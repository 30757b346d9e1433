//! Worktree Manager: lifecycle of git-worktree lanes used to isolate
//! concurrent task work.
//!
//! Grounded 1:1 on `original_source/backend/app/worktree/worktree_manager.py`
//! (index file shape, name validation, dangerous-command denylist, event
//! emission points, 300s/50000-byte `run()` truncation) and the teacher's
//! `commands/start/worktree.rs` for base-ref resolution and git subprocess
//! style — re-architected onto `tokio::process::Command` so `run()` can
//! enforce its timeout without blocking the async runtime.

pub mod events;

use crate::session::tracer::Tracer;
use crate::tasks::TaskStore;
use crate::types::{WorktreeEntry, WorktreeStatus};
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::process::Command;

pub use events::EventLog;

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]{1,40}$").unwrap())
}

const RUN_TIMEOUT: Duration = Duration::from_secs(300);
const RUN_OUTPUT_LIMIT: usize = 50_000;
const DANGEROUS_FRAGMENTS: &[&str] = &["rm -rf /", "sudo", "shutdown", "reboot", "> /dev/"];

#[derive(serde::Serialize, serde::Deserialize, Default)]
struct Index {
    worktrees: Vec<WorktreeEntry>,
}

pub struct WorktreeManager {
    repo_root: PathBuf,
    worktrees_dir: PathBuf,
    index_path: PathBuf,
    tasks: Arc<TaskStore>,
    tracer: Option<Arc<Tracer>>,
    events: EventLog,
}

impl WorktreeManager {
    pub fn new(repo_root: impl Into<PathBuf>, tasks: Arc<TaskStore>) -> Result<Self> {
        let repo_root = repo_root.into();
        let worktrees_dir = repo_root.join(".worktrees");
        std::fs::create_dir_all(&worktrees_dir)?;
        let index_path = worktrees_dir.join("index.json");
        if !index_path.exists() {
            std::fs::write(&index_path, serde_json::to_string_pretty(&Index::default())?)?;
        }
        let events = EventLog::new(&worktrees_dir);
        Ok(WorktreeManager {
            repo_root,
            worktrees_dir,
            index_path,
            tasks,
            tracer: None,
            events,
        })
    }

    pub fn with_tracer(mut self, tracer: Arc<Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    fn emit(&self, event: &str, payload: serde_json::Value) {
        if let Some(t) = &self.tracer {
            t.emit(event, payload);
        }
    }

    fn validate_name(name: &str) -> Result<()> {
        if !name_re().is_match(name) {
            bail!("Invalid worktree name. Use 1-40 chars: letters, numbers, ., _, -");
        }
        Ok(())
    }

    fn load_index(&self) -> Result<Index> {
        let contents = std::fs::read_to_string(&self.index_path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save_index(&self, index: &Index) -> Result<()> {
        std::fs::write(&self.index_path, serde_json::to_string_pretty(index)?)?;
        Ok(())
    }

    fn find(&self, name: &str) -> Result<Option<WorktreeEntry>> {
        Ok(self
            .load_index()?
            .worktrees
            .into_iter()
            .find(|w| w.name == name))
    }

    async fn is_git_repo(&self) -> bool {
        Command::new("git")
            .args(["rev-parse", "--is-inside-work-tree"])
            .current_dir(&self.repo_root)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn ref_exists(&self, reference: &str) -> bool {
        Command::new("git")
            .args(["rev-parse", "--verify", reference])
            .current_dir(&self.repo_root)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn resolve_base_ref(&self, explicit_base: Option<&str>) -> String {
        let _ = Command::new("git")
            .args(["fetch", "origin"])
            .current_dir(&self.repo_root)
            .output()
            .await;

        if let Some(base) = explicit_base {
            if base == "master" || base == "main" {
                let remote_ref = format!("origin/{base}");
                return if self.ref_exists(&remote_ref).await {
                    remote_ref
                } else {
                    base.to_string()
                };
            }
            return base.to_string();
        }

        for candidate in ["origin/main", "origin/master"] {
            if self.ref_exists(candidate).await {
                return candidate.to_string();
            }
        }
        "HEAD".to_string()
    }

    pub async fn create(
        &self,
        name: &str,
        task_id: Option<u64>,
        base_ref: Option<&str>,
    ) -> Result<WorktreeEntry> {
        Self::validate_name(name)?;
        if self.find(name)?.is_some() {
            bail!("Worktree '{name}' already exists in index");
        }
        if let Some(id) = task_id {
            if !self.tasks.exists(id) {
                bail!("Task {id} not found");
            }
        }
        if !self.is_git_repo().await {
            bail!("Not in a git repository. worktree tools require git.");
        }

        let path = self.worktrees_dir.join(name);
        let branch = format!("wt/{name}");
        self.emit(
            "worktree.create.before",
            serde_json::json!({"task_id": task_id, "worktree": name, "base_ref": base_ref}),
        );
        self.events.emit("worktree.create.before", task_id, Some(name), None);

        let resolved_base = self.resolve_base_ref(base_ref).await;
        let output = Command::new("git")
            .args(["worktree", "add", "-b", &branch, &path.to_string_lossy(), &resolved_base])
            .current_dir(&self.repo_root)
            .output()
            .await
            .context("failed to spawn git worktree add")?;

        if !output.status.success() {
            let err = String::from_utf8_lossy(&output.stderr).to_string();
            self.emit(
                "worktree.create.failed",
                serde_json::json!({"task_id": task_id, "worktree": name, "error": err}),
            );
            self.events.emit("worktree.create.failed", task_id, Some(name), Some(&err));
            bail!("Failed to create worktree: {err}");
        }

        let entry = WorktreeEntry {
            name: name.to_string(),
            path: path.to_string_lossy().to_string(),
            branch,
            task_id,
            status: WorktreeStatus::Active,
            created_at: now_secs(),
            kept_at: None,
            removed_at: None,
        };
        let mut index = self.load_index()?;
        index.worktrees.push(entry.clone());
        self.save_index(&index)?;

        if let Some(id) = task_id {
            self.tasks.bind_worktree(id, name, None)?;
        }
        self.emit(
            "worktree.create.after",
            serde_json::json!({"task_id": task_id, "worktree": name, "path": entry.path, "branch": entry.branch}),
        );
        self.events.emit("worktree.create.after", task_id, Some(name), None);
        Ok(entry)
    }

    pub fn list_all(&self) -> Result<String> {
        let worktrees = self.load_index()?.worktrees;
        if worktrees.is_empty() {
            return Ok("No worktrees in index.".to_string());
        }
        let mut lines = Vec::new();
        for wt in &worktrees {
            let suffix = wt
                .task_id
                .map(|id| format!(" task={id}"))
                .unwrap_or_default();
            lines.push(format!(
                "[{:?}] {} -> {} ({}){}",
                wt.status, wt.name, wt.path, wt.branch, suffix
            ));
        }
        Ok(lines.join("\n"))
    }

    pub async fn status(&self, name: &str) -> Result<String> {
        let Some(wt) = self.find(name)? else {
            return Ok(format!("Error: Unknown worktree '{name}'"));
        };
        let path = Path::new(&wt.path);
        if !path.exists() {
            return Ok(format!("Error: Worktree path missing: {}", path.display()));
        }
        let output = Command::new("git")
            .args(["status", "--short", "--branch"])
            .current_dir(path)
            .output()
            .await?;
        let combined = merge_output(&output.stdout, &output.stderr);
        Ok(if combined.is_empty() {
            "Clean worktree".to_string()
        } else {
            combined
        })
    }

    /// Execute an arbitrary shell command inside a worktree, capped at
    /// 300s wall-clock and 50000 bytes of combined output.
    pub async fn run(&self, name: &str, command: &str) -> Result<String> {
        if DANGEROUS_FRAGMENTS.iter().any(|d| command.contains(d)) {
            return Ok("Error: Dangerous command blocked".to_string());
        }
        let Some(wt) = self.find(name)? else {
            return Ok(format!("Error: Unknown worktree '{name}'"));
        };
        let path = Path::new(&wt.path);
        if !path.exists() {
            return Ok(format!("Error: Worktree path missing: {}", path.display()));
        }

        let child = Command::new("sh")
            .args(["-c", command])
            .current_dir(path)
            .output();

        match tokio::time::timeout(RUN_TIMEOUT, child).await {
            Ok(Ok(output)) => {
                let combined = merge_output(&output.stdout, &output.stderr);
                Ok(if combined.is_empty() {
                    "(no output)".to_string()
                } else {
                    combined.chars().take(RUN_OUTPUT_LIMIT).collect()
                })
            }
            Ok(Err(e)) => Ok(format!("Error: {e}")),
            Err(_) => Ok("Error: Timeout (300s)".to_string()),
        }
    }

    pub async fn remove(&self, name: &str, force: bool, complete_task: bool) -> Result<String> {
        let Some(wt) = self.find(name)? else {
            return Ok(format!("Error: Unknown worktree '{name}'"));
        };
        self.emit(
            "worktree.remove.before",
            serde_json::json!({"task_id": wt.task_id, "worktree": name, "path": wt.path}),
        );
        self.events.emit("worktree.remove.before", wt.task_id, Some(name), None);

        let mut args = vec!["worktree".to_string(), "remove".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.push(wt.path.clone());
        let output = Command::new("git")
            .args(&args)
            .current_dir(&self.repo_root)
            .output()
            .await
            .context("failed to spawn git worktree remove")?;

        if !output.status.success() {
            let err = String::from_utf8_lossy(&output.stderr).to_string();
            self.emit(
                "worktree.remove.failed",
                serde_json::json!({"task_id": wt.task_id, "worktree": name, "error": err}),
            );
            self.events.emit("worktree.remove.failed", wt.task_id, Some(name), Some(&err));
            bail!("{err}");
        }

        if complete_task {
            if let Some(task_id) = wt.task_id {
                let before = self.tasks.get(task_id)?;
                self.tasks.update(task_id, Some("completed"), None, None)?;
                self.tasks.unbind_worktree(task_id)?;
                self.emit(
                    "task.completed",
                    serde_json::json!({"task_id": task_id, "subject": before.subject, "worktree": name}),
                );
                self.events.emit("task.completed", Some(task_id), Some(name), None);
            }
        }

        let mut index = self.load_index()?;
        for item in index.worktrees.iter_mut() {
            if item.name == name {
                item.status = WorktreeStatus::Removed;
                item.removed_at = Some(now_secs());
            }
        }
        self.save_index(&index)?;
        self.emit(
            "worktree.remove.after",
            serde_json::json!({"task_id": wt.task_id, "worktree": name, "path": wt.path}),
        );
        self.events.emit("worktree.remove.after", wt.task_id, Some(name), None);
        Ok(format!("Removed worktree '{name}'"))
    }

    pub fn keep(&self, name: &str) -> Result<String> {
        let mut index = self.load_index()?;
        let Some(entry) = index.worktrees.iter_mut().find(|w| w.name == name) else {
            return Ok(format!("Error: Unknown worktree '{name}'"));
        };
        entry.status = WorktreeStatus::Kept;
        entry.kept_at = Some(now_secs());
        let kept = entry.clone();
        self.save_index(&index)?;
        self.emit(
            "worktree.keep",
            serde_json::json!({"task_id": kept.task_id, "worktree": name, "path": kept.path}),
        );
        Ok(serde_json::to_string_pretty(&kept)?)
    }
}

fn merge_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(stderr);
    }
    combined
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_name_rejects_bad_characters() {
        assert!(WorktreeManager::validate_name("feature/x").is_err());
        assert!(WorktreeManager::validate_name("ok-name.1_2").is_ok());
        assert!(WorktreeManager::validate_name(&"a".repeat(41)).is_err());
        assert!(WorktreeManager::validate_name("").is_err());
    }

    #[test]
    fn dangerous_command_fragments_are_detected() {
        assert!(DANGEROUS_FRAGMENTS
            .iter()
            .any(|d| "sudo rm -rf /etc".contains(d)));
        assert!(!DANGEROUS_FRAGMENTS.iter().any(|d| "ls -la".contains(d)));
    }

    #[test]
    fn merge_output_joins_nonempty_streams() {
        assert_eq!(merge_output(b"out", b""), "out");
        assert_eq!(merge_output(b"", b"err"), "err");
        assert_eq!(merge_output(b"out", b"err"), "out\nerr");
        assert_eq!(merge_output(b"", b""), "");
    }
}
