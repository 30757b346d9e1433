//! Worktree/task lifecycle event log at `<repo>/.worktrees/events.jsonl`,
//! a separate append-only stream from the session-scoped `trace.jsonl`
//! so it survives across sessions and is readable by the `/events`
//! command and the `worktree_events` tool without a session handle.
//!
//! Grounded 1:1 on `original_source/backend/app/worktree/event_bus.py`'s
//! `EventBus` (`{event, ts, task, worktree, error?}` line shape,
//! `list_recent` tail-and-parse).

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;

pub struct EventLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn new(worktrees_dir: impl Into<PathBuf>) -> Self {
        EventLog {
            path: worktrees_dir.into().join("events.jsonl"),
            lock: Mutex::new(()),
        }
    }

    pub fn emit(&self, event: &str, task_id: Option<u64>, worktree: Option<&str>, error: Option<&str>) {
        #[derive(Serialize)]
        struct Line<'a> {
            event: &'a str,
            ts: f64,
            task: serde_json::Value,
            worktree: serde_json::Value,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<&'a str>,
        }
        let line = Line {
            event,
            ts: now_secs(),
            task: task_id.map(|id| serde_json::json!({"id": id})).unwrap_or_else(|| serde_json::json!({})),
            worktree: worktree.map(|w| serde_json::json!({"name": w})).unwrap_or_else(|| serde_json::json!({})),
            error,
        };

        let _guard = self.lock.lock().unwrap();
        if let Some(parent) = self.path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        let Ok(serialized) = serde_json::to_string(&line) else {
            return;
        };
        use std::io::Write;
        if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{serialized}");
        }
    }

    /// Last `limit` events (clamped 1..=200), newest last, as pretty JSON.
    pub fn list_recent(&self, limit: usize) -> String {
        let limit = limit.clamp(1, 200);
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return "[]".to_string();
        };
        let lines: Vec<&str> = contents.lines().collect();
        let start = lines.len().saturating_sub(limit);
        let recent: Vec<serde_json::Value> = lines[start..]
            .iter()
            .map(|l| serde_json::from_str(l).unwrap_or_else(|_| serde_json::json!({"event": "parse_error", "raw": l})))
            .collect();
        serde_json::to_string_pretty(&recent).unwrap_or_default()
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
    fn emit_and_list_recent_round_trips() {
        let tmp = TempDir::new().unwrap();
        let log = EventLog::new(tmp.path());
        log.emit("worktree.create.before", Some(1), Some("feature"), None);
        log.emit("worktree.create.after", Some(1), Some("feature"), None);

        let recent = log.list_recent(20);
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&recent).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["event"], "worktree.create.before");
        assert_eq!(parsed[0]["worktree"]["name"], "feature");
    }

    #[test]
    fn list_recent_clamps_to_last_n() {
        let tmp = TempDir::new().unwrap();
        let log = EventLog::new(tmp.path());
        for i in 0..10 {
            log.emit("task.status", Some(i), None, None);
        }
        let recent = log.list_recent(3);
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&recent).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.last().unwrap()["task"]["id"], 9);
    }
}
