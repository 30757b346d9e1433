//! Per-teammate tool set: inbox/messaging, task claim, and the
//! shutdown/plan-approval protocol primitives. Grounded on
//! `original_source/backend/app/tools/team_tool.py` and
//! `team/teammate_manager.py`'s `_loop`. File primitives and (optionally)
//! worktree tools are composed alongside these by the caller; the Task
//! tool is never included in a teammate's set (spec §4.3).

use std::sync::Arc;

use anyhow::Result;

use crate::communication::MessageBus;
use crate::communication::trackers::RequestTrackers;
use crate::tasks::TaskBoard;

/// Shared state a teammate's tool handlers close over.
pub struct TeammateToolContext {
    pub name: String,
    pub bus: Arc<MessageBus>,
    pub trackers: Arc<RequestTrackers>,
    pub board: Arc<TaskBoard>,
}

pub fn send_message(ctx: &TeammateToolContext, to: &str, content: &str, msg_type: &str) -> String {
    match ctx.bus.send_checked(&ctx.name, to, content, msg_type, None) {
        Ok(()) => format!("Message sent to '{to}'"),
        Err(e) => format!("Error: {e}"),
    }
}

pub fn read_inbox(ctx: &TeammateToolContext) -> String {
    match ctx.bus.read_inbox(&ctx.name) {
        Ok(messages) => serde_json::to_string_pretty(&messages).unwrap_or_default(),
        Err(e) => format!("Error: {e}"),
    }
}

/// Respond to a shutdown request the lead previously sent this teammate.
pub fn shutdown_response(ctx: &TeammateToolContext, request_id: &str, approve: bool) -> String {
    if ctx.trackers.resolve_shutdown(request_id, approve) {
        let _ = ctx.bus.send(
            &ctx.name,
            "lead",
            if approve { "Shutting down." } else { "Declining shutdown." },
            crate::types::InboxMsgType::ShutdownResponse,
            Some(request_id.to_string()),
        );
        format!("Shutdown request {request_id} resolved: {}", if approve { "approved" } else { "rejected" })
    } else {
        format!("Error: Unknown shutdown request_id '{request_id}'")
    }
}

/// Submit a plan to the lead for approval; returns a request_id.
pub fn plan_approval(ctx: &TeammateToolContext, plan: &str) -> String {
    let request_id = ctx.trackers.submit_plan(&ctx.name, plan);
    let _ = ctx.bus.send(
        &ctx.name,
        "lead",
        plan,
        crate::types::InboxMsgType::Message,
        Some(request_id.clone()),
    );
    format!("Plan submitted (request_id: {request_id})")
}

pub fn idle() -> String {
    "Entering idle state; will poll the board and inbox.".to_string()
}

pub fn claim_task(ctx: &TeammateToolContext, task_id: u64) -> Result<String> {
    match ctx.board.claim_task(task_id, &ctx.name)? {
        Ok(()) => Ok(format!("Claimed task #{task_id} for {}", ctx.name)),
        Err(e) => Ok(format!("Error: {e}")),
    }
}

pub fn tool_schemas() -> Vec<(&'static str, &'static str, serde_json::Value)> {
    vec![
        (
            "send_message",
            "Send a message to a teammate's or the lead's inbox.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "to": {"type": "string"},
                    "content": {"type": "string"},
                    "msg_type": {"type": "string", "enum": ["message", "broadcast", "shutdown_request", "shutdown_response", "plan_approval_response"]}
                },
                "required": ["to", "content"]
            }),
        ),
        (
            "read_inbox",
            "Read and drain this agent's inbox. Returns pending messages as JSON.",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
        (
            "shutdown_response",
            "Approve or reject a shutdown request sent by the lead.",
            serde_json::json!({
                "type": "object",
                "properties": {"request_id": {"type": "string"}, "approve": {"type": "boolean"}},
                "required": ["request_id", "approve"]
            }),
        ),
        (
            "plan_approval",
            "Submit a plan to the lead for approval. Returns a request_id.",
            serde_json::json!({
                "type": "object",
                "properties": {"plan": {"type": "string"}},
                "required": ["plan"]
            }),
        ),
        (
            "idle",
            "Enter idle state, polling the shared task board and inbox.",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
        (
            "claim_task",
            "Claim a task from the shared board by id.",
            serde_json::json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}},
                "required": ["task_id"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx(tmp: &TempDir, name: &str) -> TeammateToolContext {
        TeammateToolContext {
            name: name.to_string(),
            bus: Arc::new(MessageBus::new(tmp.path().join("inbox"))),
            trackers: Arc::new(RequestTrackers::new()),
            board: Arc::new(TaskBoard::new(tmp.path().join("tasks"))),
        }
    }

    #[test]
    fn send_and_read_inbox_round_trips() {
        let tmp = TempDir::new().unwrap();
        let alice = ctx(&tmp, "alice");
        send_message(&alice, "bob", "hi bob", "message");
        let bob = ctx(&tmp, "bob");
        let out = read_inbox(&bob);
        assert!(out.contains("hi bob"));
    }

    #[test]
    fn claim_task_reports_already_claimed() {
        let tmp = TempDir::new().unwrap();
        let alice = ctx(&tmp, "alice");
        let task = alice.board.store().create("do it", "").unwrap();
        claim_task(&alice, task.id).unwrap();
        let bob = ctx(&tmp, "bob");
        let out = claim_task(&bob, task.id).unwrap();
        assert_eq!(out, format!("Error: Task {} already claimed by alice", task.id));
    }

    #[test]
    fn shutdown_response_rejects_unknown_request() {
        let tmp = TempDir::new().unwrap();
        let alice = ctx(&tmp, "alice");
        let out = shutdown_response(&alice, "deadbeef", true);
        assert!(out.contains("Unknown shutdown request_id"));
    }
}
