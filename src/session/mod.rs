//! Session Store: per-run directory layout and the explicit `Session`
//! value that replaces the original's module-level "current session key"
//! singleton.
//!
//! Layout under `<root>/.sessions/<key>/`:
//!   main.jsonl               main agent history
//!   <agent_name>.jsonl        sub-agent histories
//!   tasks/task_<id>_<slug>.json
//!   transcript.jsonl          compaction snapshot
//!   team/config.json
//!   team/inbox/<name>.jsonl
//!   board/task_<id>.json
//!   workspace/...
//!   trace.jsonl

pub mod tracer;

use crate::types::Message;
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

pub use tracer::Tracer;

/// A single run's namespace on disk, identified by a key.
///
/// `switch` atomically replaces the whole value so that any bus/team/
/// tracker state built on top of an old `Session` is dropped along with
/// it, rather than relying on resettable singletons.
#[derive(Debug, Clone)]
pub struct Session {
    pub root: PathBuf,
    pub key: String,
}

impl Session {
    /// Create a session rooted at `root` (typically the project's cwd)
    /// with a freshly minted key.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Session {
            root: root.into(),
            key: new_session_key(),
        }
    }

    pub fn with_key(root: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Session {
            root: root.into(),
            key: key.into(),
        }
    }

    /// Replace this session's key, invalidating anything built on the old
    /// directory. Callers hold their bus/team/tracker state through a
    /// `Session` reference and must rebuild it after calling this.
    pub fn switch(&mut self, new_key: String) {
        self.key = new_key;
    }

    pub fn sessions_root(&self) -> PathBuf {
        self.root.join(".sessions")
    }

    pub fn dir(&self) -> PathBuf {
        self.sessions_root().join(&self.key)
    }

    pub fn ensure_dir(&self) -> Result<PathBuf> {
        let d = self.dir();
        std::fs::create_dir_all(&d).with_context(|| format!("creating session dir {}", d.display()))?;
        Ok(d)
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.dir().join("tasks")
    }

    pub fn board_dir(&self) -> PathBuf {
        self.dir().join("board")
    }

    pub fn team_dir(&self) -> PathBuf {
        self.dir().join("team")
    }

    pub fn team_inbox_dir(&self) -> PathBuf {
        self.team_dir().join("inbox")
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.dir().join("workspace")
    }

    pub fn trace_path(&self) -> PathBuf {
        self.dir().join("trace.jsonl")
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.dir().join("transcript.jsonl")
    }

    pub fn agent_history_path(&self, agent_name: &str) -> PathBuf {
        self.dir().join(format!("{agent_name}.jsonl"))
    }

    /// Whether the team subsystem has already materialized a directory
    /// for this session. Used to avoid eagerly creating `team/` just to
    /// check an empty inbox (spec §4.1 step 3).
    pub fn team_is_live(&self) -> bool {
        self.team_dir().exists()
    }

    /// List session keys under this root, newest first.
    pub fn list_keys(root: &Path) -> Vec<String> {
        let sessions_root = root.join(".sessions");
        let Ok(entries) = std::fs::read_dir(&sessions_root) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        keys.sort_by(|a, b| b.cmp(a));
        keys
    }
}

/// A timestamp-string session key, e.g. `20260730_101500`.
pub fn new_session_key() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Append a message as one JSON line to `path`.
pub fn append_message(path: &Path, message: &Message) -> Result<()> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(f, "{}", serde_json::to_string(message)?)?;
    Ok(())
}

/// Overwrite `path` with the full history, one message per line.
pub fn save_history(path: &Path, history: &[Message]) -> Result<()> {
    if history.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = String::new();
    for m in history {
        out.push_str(&serde_json::to_string(m)?);
        out.push('\n');
    }
    std::fs::write(path, out).with_context(|| format!("writing {}", path.display()))
}

/// Reconstruct a message history from a JSONL file. Malformed lines are
/// skipped rather than aborting the whole load.
pub fn load_history(path: &Path) -> Vec<Message> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<Message>(l).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn session_paths_are_rooted_under_sessions_dir() {
        let tmp = TempDir::new().unwrap();
        let sess = Session::with_key(tmp.path(), "20260101_000000");
        assert_eq!(
            sess.dir(),
            tmp.path().join(".sessions").join("20260101_000000")
        );
        assert_eq!(sess.tasks_dir(), sess.dir().join("tasks"));
    }

    #[test]
    fn switch_replaces_key_in_place() {
        let tmp = TempDir::new().unwrap();
        let mut sess = Session::with_key(tmp.path(), "a");
        let old_dir = sess.dir();
        sess.switch("b".to_string());
        assert_ne!(sess.dir(), old_dir);
        assert_eq!(sess.key, "b");
    }

    #[test]
    fn history_round_trips_through_jsonl() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("main.jsonl");
        let history = vec![Message::user_text("hi"), Message::assistant_text("hello")];
        save_history(&path, &history).unwrap();
        let loaded = load_history(&path);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].text(), "hello");
    }

    #[test]
    fn list_keys_sorts_newest_first() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".sessions/20260101_000000")).unwrap();
        std::fs::create_dir_all(tmp.path().join(".sessions/20260201_000000")).unwrap();
        let keys = Session::list_keys(tmp.path());
        assert_eq!(keys, vec!["20260201_000000", "20260101_000000"]);
    }
}
