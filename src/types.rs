//! Shared data model for the orchestration core: messages, tasks, worktree
//! entries, teammate records, inbox messages and trace events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single chat message exchanged with the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User { content: Vec<ContentBlock> },
    Assistant { content: Vec<ContentBlock> },
    ToolResult { content: Vec<ContentBlock> },
    System { content: Vec<ContentBlock> },
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Message::User {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Message::Assistant {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn tool_result_for(results: Vec<ToolResult>) -> Self {
        Message::ToolResult {
            content: results
                .into_iter()
                .map(|r| ContentBlock::ToolResult {
                    call_id: r.call_id,
                    content: r.content,
                })
                .collect(),
        }
    }

    pub fn content(&self) -> &[ContentBlock] {
        match self {
            Message::User { content }
            | Message::Assistant { content }
            | Message::ToolResult { content }
            | Message::System { content } => content,
        }
    }

    pub fn content_mut(&mut self) -> &mut Vec<ContentBlock> {
        match self {
            Message::User { content }
            | Message::Assistant { content }
            | Message::ToolResult { content }
            | Message::System { content } => content,
        }
    }

    /// Tool calls carried by an assistant message, if any.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content()
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolCall(tc) => Some(tc),
                _ => None,
            })
            .collect()
    }

    /// Plain text concatenation of all Text blocks.
    pub fn text(&self) -> String {
        self.content()
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolCall(ToolCall),
    ToolResult { call_id: String, content: String },
}

/// A tool call requested by the assistant. `call_id` is the stable
/// identifier the runtime uses to pair it with its eventual result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

/// The output of dispatching one `ToolCall`.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ToolResult {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(call_id: impl Into<String>, message: impl fmt::Display) -> Self {
        ToolResult {
            call_id: call_id.into(),
            content: format!("Error: {message}"),
            is_error: true,
        }
    }
}

/// Status of a persistent task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// A persistent task record. Also serves as the board entry: an empty
/// `owner` means unclaimed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub subject: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(default, rename = "blockedBy")]
    pub blocked_by: Vec<u64>,
    #[serde(default)]
    pub blocks: Vec<u64>,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub worktree: String,
    pub created_at: f64,
    pub updated_at: f64,
}

impl Task {
    pub fn new(id: u64, subject: impl Into<String>, description: impl Into<String>, now: f64) -> Self {
        Task {
            id,
            subject: subject.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            blocked_by: Vec::new(),
            blocks: Vec::new(),
            owner: String::new(),
            worktree: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status_marker(&self) -> &'static str {
        match self.status {
            TaskStatus::Pending => "[ ]",
            TaskStatus::InProgress => "[>]",
            TaskStatus::Completed => "[x]",
        }
    }

    pub fn is_claimable(&self) -> bool {
        self.status == TaskStatus::Pending && self.owner.is_empty() && self.blocked_by.is_empty()
    }
}

/// Status of a worktree lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorktreeStatus {
    Active,
    Kept,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeEntry {
    pub name: String,
    pub path: String,
    pub branch: String,
    pub task_id: Option<u64>,
    pub status: WorktreeStatus,
    pub created_at: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kept_at: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<f64>,
}

/// A named long-lived agent in the teammate pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeammateStatus {
    Working,
    Idle,
    Shutdown,
}

impl fmt::Display for TeammateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TeammateStatus::Working => "working",
            TeammateStatus::Idle => "idle",
            TeammateStatus::Shutdown => "shutdown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeammateRecord {
    pub name: String,
    pub role: String,
    pub status: TeammateStatus,
}

/// The closed set of inbox message types recognised by the Message Bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxMsgType {
    Message,
    Broadcast,
    ShutdownRequest,
    ShutdownResponse,
    PlanApprovalResponse,
}

impl InboxMsgType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "message" => Some(InboxMsgType::Message),
            "broadcast" => Some(InboxMsgType::Broadcast),
            "shutdown_request" => Some(InboxMsgType::ShutdownRequest),
            "shutdown_response" => Some(InboxMsgType::ShutdownResponse),
            "plan_approval_response" => Some(InboxMsgType::PlanApprovalResponse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxMessage {
    #[serde(rename = "type")]
    pub msg_type: InboxMsgType,
    pub from: String,
    pub content: String,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Status of an in-memory shutdown or plan-approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct ShutdownRequest {
    pub target: String,
    pub status: RequestStatus,
}

#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub from: String,
    pub plan: String,
    pub status: RequestStatus,
}

/// Status of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundStatus {
    Running,
    Completed,
    Timeout,
    Error,
}

impl fmt::Display for BackgroundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackgroundStatus::Running => "running",
            BackgroundStatus::Completed => "completed",
            BackgroundStatus::Timeout => "timeout",
            BackgroundStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct BackgroundJob {
    pub task_id: String,
    pub command: String,
    pub status: BackgroundStatus,
    pub result: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackgroundNotification {
    pub task_id: String,
    pub status: BackgroundStatus,
    pub result: String,
}

/// One line of the append-only trace log.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub ts: f64,
    pub event: String,
    pub run_id: Option<String>,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_claimable_requires_pending_unowned_unblocked() {
        let mut t = Task::new(1, "do a thing", "", 0.0);
        assert!(t.is_claimable());
        t.owner = "alice".into();
        assert!(!t.is_claimable());
        t.owner.clear();
        t.blocked_by.push(2);
        assert!(!t.is_claimable());
    }

    #[test]
    fn task_status_round_trips() {
        assert_eq!(TaskStatus::parse("in_progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("bogus"), None);
        assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn message_text_concatenates_text_blocks() {
        let m = Message::assistant_text("hello");
        assert_eq!(m.text(), "hello");
        assert!(m.tool_calls().is_empty());
    }
}
