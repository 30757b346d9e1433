//! Message Bus: per-recipient append-only JSONL inbox files, plus the two
//! in-memory Request Trackers that correlate shutdown and plan-approval
//! protocol traffic.
//!
//! Grounded on `original_source/backend/app/team/message_bus.py` (closed
//! `msg_type` set, read-and-clear drain, broadcast-excludes-sender) and
//! reconciled with the teacher's `communication::file_bus` module naming.

pub mod trackers;

use crate::types::{InboxMessage, InboxMsgType};
use anyhow::{bail, Result};
use std::fs;
use std::path::PathBuf;

pub use trackers::RequestTrackers;

pub struct MessageBus {
    inbox_dir: PathBuf,
}

impl MessageBus {
    pub fn new(inbox_dir: impl Into<PathBuf>) -> Self {
        MessageBus {
            inbox_dir: inbox_dir.into(),
        }
    }

    fn inbox_path(&self, name: &str) -> PathBuf {
        self.inbox_dir.join(format!("{name}.jsonl"))
    }

    /// Append one message to `to`'s inbox file. Rejects any type outside
    /// the closed set without creating or modifying any file.
    pub fn send(
        &self,
        from: &str,
        to: &str,
        content: &str,
        msg_type: InboxMsgType,
        request_id: Option<String>,
    ) -> Result<()> {
        let msg = InboxMessage {
            msg_type,
            from: from.to_string(),
            content: content.to_string(),
            timestamp: now_secs(),
            request_id,
        };
        self.append(to, &msg)
    }

    /// Parses `type_str` against the closed set before sending; returns
    /// an `Error:`-style message for an unrecognised type rather than
    /// panicking, matching spec §7's tool-local-failure taxonomy.
    pub fn send_checked(
        &self,
        from: &str,
        to: &str,
        content: &str,
        type_str: &str,
        request_id: Option<String>,
    ) -> Result<()> {
        let msg_type = InboxMsgType::parse(type_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid type '{type_str}'"))?;
        self.send(from, to, content, msg_type, request_id)
    }

    fn append(&self, to: &str, msg: &InboxMessage) -> Result<()> {
        use std::io::Write;
        fs::create_dir_all(&self.inbox_dir)?;
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.inbox_path(to))?;
        writeln!(f, "{}", serde_json::to_string(msg)?)?;
        Ok(())
    }

    /// Read and then truncate `name`'s inbox file. A concurrent second
    /// call before any new message arrives returns empty (drain
    /// idempotence, spec §8).
    pub fn read_inbox(&self, name: &str) -> Result<Vec<InboxMessage>> {
        let path = self.inbox_path(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path)?;
        let messages: Vec<InboxMessage> = contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        fs::write(&path, "")?;
        Ok(messages)
    }

    /// Send a `broadcast` message to every member other than `from`.
    pub fn broadcast(&self, from: &str, content: &str, members: &[String]) -> Result<usize> {
        let mut count = 0;
        for member in members {
            if member != from {
                self.send(from, member, content, InboxMsgType::Broadcast, None)?;
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Thin guard used by callers that want to surface bus errors the same
/// way the spec's closed-set validation does.
pub fn require_known_type(s: &str) -> Result<InboxMsgType> {
    match InboxMsgType::parse(s) {
        Some(t) => Ok(t),
        None => bail!("Invalid type '{s}'"),
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
    fn send_and_read_inbox_drains() {
        let tmp = TempDir::new().unwrap();
        let bus = MessageBus::new(tmp.path());
        bus.send("alice", "bob", "hi", InboxMsgType::Message, None)
            .unwrap();

        let first = bus.read_inbox("bob").unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].from, "alice");

        let second = bus.read_inbox("bob").unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn broadcast_excludes_sender() {
        let tmp = TempDir::new().unwrap();
        let bus = MessageBus::new(tmp.path());
        let members = vec!["lead".to_string(), "alice".to_string(), "bob".to_string()];
        let sent = bus.broadcast("lead", "go", &members).unwrap();
        assert_eq!(sent, 2);

        assert!(bus.read_inbox("lead").unwrap().is_empty());
        assert_eq!(bus.read_inbox("alice").unwrap().len(), 1);
        assert_eq!(bus.read_inbox("bob").unwrap().len(), 1);
    }

    #[test]
    fn send_checked_rejects_unknown_type() {
        let tmp = TempDir::new().unwrap();
        let bus = MessageBus::new(tmp.path());
        let err = bus
            .send_checked("alice", "bob", "x", "not_a_type", None)
            .unwrap_err();
        assert!(err.to_string().contains("Invalid type"));
    }
}
