//! Task Board: the unclaimed-task queue teammates poll against.
//!
//! Grounded on `original_source/backend/app/team/state.py`'s
//! `scan_unclaimed_tasks`/`claim_task`: a process-local mutex serialises
//! claim attempts, but the authoritative check is always a fresh on-disk
//! re-read of the task's owner field, so a claim is safe even against a
//! second process racing the same session directory.

use crate::session::tracer::Tracer;
use crate::tasks::TaskStore;
use crate::types::{Task, TaskStatus};
use anyhow::Result;
use std::sync::{Arc, Mutex};

/// Why a claim attempt was refused, distinct from the `anyhow::Error`
/// reserved for store/filesystem failures. Mirrors `state.py:claim_task`'s
/// three string outcomes (`not found` / `already claimed by {owner}` /
/// success), plus `Blocked` for this crate's `blockedBy` extension.
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("Task {0} not found")]
    NotFound(u64),
    #[error("Task {0} already claimed by {1}")]
    AlreadyClaimed(u64, String),
    #[error("Task {0} is blocked by incomplete dependencies")]
    Blocked(u64),
    #[error("Task {0} is not pending")]
    NotPending(u64),
}

pub struct TaskBoard {
    store: TaskStore,
    claim_lock: Mutex<()>,
    tracer: Option<Arc<Tracer>>,
}

impl TaskBoard {
    pub fn new(tasks_dir: impl Into<std::path::PathBuf>) -> Self {
        TaskBoard {
            store: TaskStore::new(tasks_dir),
            claim_lock: Mutex::new(()),
            tracer: None,
        }
    }

    pub fn with_tracer(mut self, tracer: Arc<Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Tasks that are pending, unowned, and have no outstanding blockers.
    pub fn scan_unclaimed(&self) -> Result<Vec<Task>> {
        let mut out = Vec::new();
        for path in self.store_dir_entries()? {
            let contents = std::fs::read_to_string(&path)?;
            if let Ok(task) = serde_json::from_str::<Task>(&contents) {
                if task.is_claimable() {
                    out.push(task);
                }
            }
        }
        out.sort_by_key(|t| t.id);
        Ok(out)
    }

    fn store_dir_entries(&self) -> Result<Vec<std::path::PathBuf>> {
        let dir = self.store.dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<_> = std::fs::read_dir(&dir)?
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

    /// Attempt to claim `task_id` for `claimant`. Holds the process-local
    /// lock for the whole re-read-then-write sequence, then re-checks the
    /// task's current status/owner from disk before writing — the lock
    /// only protects against same-process races; the re-read protects
    /// against everything else. The outer `Result` is reserved for
    /// store/filesystem failures; a lost claim race is reported through
    /// the inner `ClaimError` so the loser can be told who won.
    pub fn claim_task(&self, task_id: u64, claimant: &str) -> Result<Result<(), ClaimError>> {
        let _guard = self.claim_lock.lock().unwrap();
        let task = match self.store.get(task_id) {
            Ok(t) => t,
            Err(_) => return Ok(Err(ClaimError::NotFound(task_id))),
        };
        if !task.owner.is_empty() {
            return Ok(Err(ClaimError::AlreadyClaimed(task_id, task.owner)));
        }
        if !task.blocked_by.is_empty() {
            return Ok(Err(ClaimError::Blocked(task_id)));
        }
        if task.status != TaskStatus::Pending {
            return Ok(Err(ClaimError::NotPending(task_id)));
        }
        self.store.bind_worktree(task_id, &task.worktree, Some(claimant))?;
        if let Some(t) = &self.tracer {
            t.emit(
                "board.claim",
                serde_json::json!({"task_id": task_id, "claimant": claimant}),
            );
        }
        Ok(Ok(()))
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Shared notes directory for this board's session, sibling to its
    /// tasks directory (`<session>/tasks` → `<session>/notes`) — one
    /// `worker-notes.json` per session rather than the teacher's
    /// one-per-drone file, since this crate's teammates share a single
    /// task board rather than each owning a separate drone directory.
    pub fn notes_dir(&self) -> std::path::PathBuf {
        match self.store.dir().parent() {
            Some(p) => p.join("notes"),
            None => std::path::PathBuf::from("notes"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scan_unclaimed_excludes_owned_and_blocked() {
        let tmp = TempDir::new().unwrap();
        let board = TaskBoard::new(tmp.path());
        let free = board.store().create("free task", "").unwrap();
        let blocker = board.store().create("blocker", "").unwrap();
        board
            .store()
            .update(free.id, None, None, Some(vec![blocker.id]))
            .unwrap();
        board.store().create("owned", "").unwrap();
        board.claim_task(free.id + 1, "alice").ok();

        let unclaimed = board.scan_unclaimed().unwrap();
        let ids: Vec<u64> = unclaimed.iter().map(|t| t.id).collect();
        assert!(!ids.contains(&free.id));
    }

    #[test]
    fn claim_task_binds_owner_and_is_idempotent_against_recheck() {
        let tmp = TempDir::new().unwrap();
        let board = TaskBoard::new(tmp.path());
        let task = board.store().create("do it", "").unwrap();

        assert!(board.claim_task(task.id, "alice").unwrap().is_ok());
        let after = board.store().get(task.id).unwrap();
        assert_eq!(after.owner, "alice");
        assert_eq!(after.status, TaskStatus::InProgress);

        let lost = board.claim_task(task.id, "bob").unwrap().unwrap_err();
        assert!(matches!(lost, ClaimError::AlreadyClaimed(id, ref owner) if id == task.id && owner == "alice"));
        let still = board.store().get(task.id).unwrap();
        assert_eq!(still.owner, "alice");
    }

    #[test]
    fn claim_nonexistent_task_reports_not_found() {
        let tmp = TempDir::new().unwrap();
        let board = TaskBoard::new(tmp.path());
        let err = board.claim_task(999, "alice").unwrap().unwrap_err();
        assert!(matches!(err, ClaimError::NotFound(999)));
    }

    #[test]
    fn claim_blocked_task_reports_blocked() {
        let tmp = TempDir::new().unwrap();
        let board = TaskBoard::new(tmp.path());
        let blocker = board.store().create("blocker", "").unwrap();
        let task = board.store().create("blocked", "").unwrap();
        board
            .store()
            .update(task.id, None, Some(vec![blocker.id]), None)
            .unwrap();
        let err = board.claim_task(task.id, "alice").unwrap().unwrap_err();
        assert!(matches!(err, ClaimError::Blocked(id) if id == task.id));
    }
}
