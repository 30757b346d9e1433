//! Task Store: persistent task records with status and dependency edges,
//! one JSON file per id under `<session>/tasks/`.
//!
//! Grounded 1:1 on `original_source/backend/app/task/task_manager.py`:
//! id allocation by scanning `task_*.json` stems for the max id, slug
//! computed from the subject and used only for the filename (the id is
//! authoritative — renaming on subject change is delete-old+write-new).

pub mod board;

use crate::session::tracer::Tracer;
use crate::types::{Task, TaskStatus};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub use board::TaskBoard;

pub struct TaskStore {
    dir: PathBuf,
    tracer: Option<std::sync::Arc<Tracer>>,
}

/// Sanitise a subject into a filename-safe slug, matching the original's
/// `re.sub(r"[^a-z0-9]+", "-", text.lower())[:40].strip("-")`.
pub fn slug(subject: &str) -> String {
    let mut out = String::new();
    let mut last_was_sep = true; // suppress a leading '-'
    for ch in subject.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('-');
            last_was_sep = true;
        }
    }
    let trimmed = out.trim_end_matches('-');
    trimmed.chars().take(40).collect::<String>().trim_end_matches('-').to_string()
}

impl TaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        TaskStore { dir: dir.into(), tracer: None }
    }

    pub fn with_tracer(mut self, tracer: std::sync::Arc<Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    fn ensure_dir(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(&self.dir)
    }

    fn glob_for_id(&self, id: u64) -> Result<Vec<PathBuf>> {
        let prefix = format!("task_{id}_");
        let mut matches = Vec::new();
        if !self.dir.exists() {
            return Ok(matches);
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) && name.ends_with(".json") {
                matches.push(entry.path());
            }
        }
        Ok(matches)
    }

    fn all_task_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("task_") && n.ends_with(".json"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn max_id(&self) -> Result<u64> {
        let mut max = 0u64;
        for path in self.all_task_files()? {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                // task_<id>_<slug>
                if let Some(rest) = stem.strip_prefix("task_") {
                    if let Some(id_str) = rest.split('_').next() {
                        if let Ok(id) = id_str.parse::<u64>() {
                            max = max.max(id);
                        }
                    }
                }
            }
        }
        Ok(max)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self, id: u64) -> bool {
        self.glob_for_id(id).map(|m| !m.is_empty()).unwrap_or(false)
    }

    fn find(&self, id: u64) -> Result<PathBuf> {
        let matches = self.glob_for_id(id)?;
        matches
            .into_iter()
            .next()
            .with_context(|| format!("Task {id} not found"))
    }

    fn load(&self, id: u64) -> Result<Task> {
        let path = self.find(id)?;
        let contents = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, task: &Task) -> Result<()> {
        self.ensure_dir()?;
        for old in self.glob_for_id(task.id)? {
            let _ = std::fs::remove_file(old);
        }
        let path = self.dir.join(format!("task_{}_{}.json", task.id, slug(&task.subject)));
        let json = serde_json::to_string_pretty(task)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    fn emit(&self, event: &str, payload: serde_json::Value) {
        if let Some(t) = &self.tracer {
            t.emit(event, payload);
        }
    }

    pub fn create(&self, subject: &str, description: &str) -> Result<Task> {
        let next_id = self.max_id()? + 1;
        let now = now_secs();
        let task = Task::new(next_id, subject, description, now);
        self.save(&task)?;
        self.emit("task.create", serde_json::json!({"task_id": next_id, "subject": subject}));
        tracing::debug!(task_id = next_id, subject, "task created");
        Ok(task)
    }

    pub fn get(&self, id: u64) -> Result<Task> {
        self.load(id)
    }

    /// Validated status/dependency update. Completing a task removes it
    /// from every other task's `blockedBy`; `add_blocks` is symmetric.
    pub fn update(
        &self,
        id: u64,
        status: Option<&str>,
        add_blocked_by: Option<Vec<u64>>,
        add_blocks: Option<Vec<u64>>,
    ) -> Result<Task> {
        let mut task = self.load(id)?;
        let old_status = task.status;

        if let Some(status_str) = status {
            let parsed = TaskStatus::parse(status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid status: {status_str}"))?;
            task.status = parsed;
            if parsed == TaskStatus::Completed {
                for path in self.all_task_files()? {
                    let contents = std::fs::read_to_string(&path)?;
                    let mut other: Task = serde_json::from_str(&contents)?;
                    if other.blocked_by.contains(&id) {
                        other.blocked_by.retain(|&b| b != id);
                        self.save(&other)?;
                    }
                }
            }
        }

        if let Some(add) = add_blocked_by {
            let mut set: HashSet<u64> = task.blocked_by.iter().copied().collect();
            set.extend(add);
            task.blocked_by = set.into_iter().collect();
            task.blocked_by.sort_unstable();
        }

        if let Some(add) = add_blocks {
            let mut set: HashSet<u64> = task.blocks.iter().copied().collect();
            set.extend(add.iter().copied());
            task.blocks = set.into_iter().collect();
            task.blocks.sort_unstable();

            for bid in add {
                if let Ok(mut blocked) = self.load(bid) {
                    if !blocked.blocked_by.contains(&id) {
                        blocked.blocked_by.push(id);
                        self.save(&blocked)?;
                    }
                }
            }
        }

        task.updated_at = now_secs();
        self.save(&task)?;

        if status.is_some() && task.status != old_status {
            self.emit(
                "task.status",
                serde_json::json!({
                    "task_id": id, "subject": task.subject,
                    "from_status": old_status.to_string(), "to_status": task.status.to_string(),
                }),
            );
        }

        Ok(task)
    }

    pub fn bind_worktree(&self, id: u64, worktree: &str, owner: Option<&str>) -> Result<Task> {
        let mut task = self.load(id)?;
        task.worktree = worktree.to_string();
        if let Some(owner) = owner {
            task.owner = owner.to_string();
        }
        if task.status == TaskStatus::Pending {
            task.status = TaskStatus::InProgress;
        }
        task.updated_at = now_secs();
        self.save(&task)?;
        self.emit(
            "task.bind_worktree",
            serde_json::json!({
                "task_id": id, "subject": task.subject,
                "worktree": worktree, "owner": task.owner,
            }),
        );
        Ok(task)
    }

    pub fn unbind_worktree(&self, id: u64) -> Result<Task> {
        let mut task = self.load(id)?;
        task.worktree.clear();
        task.updated_at = now_secs();
        self.save(&task)?;
        Ok(task)
    }

    pub fn list_all(&self) -> Result<String> {
        let mut tasks = Vec::new();
        for path in self.all_task_files()? {
            let contents = std::fs::read_to_string(&path)?;
            tasks.push(serde_json::from_str::<Task>(&contents)?);
        }
        if tasks.is_empty() {
            return Ok("No tasks.".to_string());
        }
        let mut lines = Vec::new();
        for t in &tasks {
            let blocked = if t.blocked_by.is_empty() {
                String::new()
            } else {
                format!(" (blocked by: {:?})", t.blocked_by)
            };
            let wt = if t.worktree.is_empty() {
                String::new()
            } else {
                format!(" wt={}", t.worktree)
            };
            lines.push(format!(
                "{} #{}: {}{}{}",
                t.status_marker(),
                t.id,
                t.subject,
                blocked,
                wt
            ));
        }
        Ok(lines.join("\n"))
    }
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
    use tempfile::TempDir;

    #[test]
    fn slug_sanitizes_and_truncates() {
        assert_eq!(slug("Fix the Thing!!"), "fix-the-thing");
        let long = "a".repeat(100);
        assert_eq!(slug(&long).len(), 40);
    }

    #[test]
    fn create_allocates_monotonic_ids() {
        let tmp = TempDir::new().unwrap();
        let store = TaskStore::new(tmp.path());
        let t1 = store.create("first", "").unwrap();
        let t2 = store.create("second", "").unwrap();
        assert_eq!(t1.id, 1);
        assert_eq!(t2.id, 2);
    }

    #[test]
    fn completing_task_clears_blocked_by_everywhere() {
        let tmp = TempDir::new().unwrap();
        let store = TaskStore::new(tmp.path());
        let a = store.create("a", "").unwrap();
        let b = store.create("b", "").unwrap();
        store.update(b.id, None, None, Some(vec![])).unwrap();
        store.update(a.id, None, None, Some(vec![b.id])).unwrap();

        let b_after = store.get(b.id).unwrap();
        assert_eq!(b_after.blocked_by, vec![a.id]);

        store.update(a.id, Some("completed"), None, None).unwrap();
        let b_final = store.get(b.id).unwrap();
        assert!(b_final.blocked_by.is_empty());
    }

    #[test]
    fn duplicate_blocks_edges_do_not_duplicate_blocked_by() {
        let tmp = TempDir::new().unwrap();
        let store = TaskStore::new(tmp.path());
        let a = store.create("a", "").unwrap();
        let b = store.create("b", "").unwrap();
        store.update(a.id, None, None, Some(vec![b.id])).unwrap();
        store.update(a.id, None, None, Some(vec![b.id])).unwrap();
        let b_after = store.get(b.id).unwrap();
        assert_eq!(b_after.blocked_by, vec![a.id]);
    }

    #[test]
    fn renaming_on_subject_change_leaves_one_file_per_id() {
        let tmp = TempDir::new().unwrap();
        let store = TaskStore::new(tmp.path());
        let t = store.create("old subject", "").unwrap();
        let mut renamed = t.clone();
        renamed.subject = "brand new subject".to_string();
        store.save(&renamed).unwrap();
        assert_eq!(store.all_task_files().unwrap().len(), 1);
    }
}
