//! Lead-side team tools: spawn/list teammates, messaging, and the
//! shutdown/plan-approval protocol as seen from the Main Loop.
//!
//! Grounded 1:1 on `original_source/backend/app/tools/team_tool.py`
//! (`spawn_teammate`, `list_teammates`, `send_message`, `read_inbox`,
//! `broadcast`, `shutdown_request`, `check_shutdown_status`,
//! `plan_approval`, `claim_task`), addressed from the fixed `"lead"`
//! identity the original's tools always act as.

use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::roster::TeamRoster;
use crate::background::BackgroundExecutor;
use crate::communication::trackers::RequestTrackers;
use crate::communication::MessageBus;
use crate::llm::LlmClient;
use crate::session::tracer::Tracer;
use crate::tasks::TaskBoard;
use crate::types::InboxMsgType;

pub const LEAD_NAME: &str = "lead";

pub struct TeamLeadToolContext {
    pub roster: TeamRoster,
    pub llm: Arc<LlmClient>,
    pub cwd: PathBuf,
    pub bus: Arc<MessageBus>,
    pub trackers: Arc<RequestTrackers>,
    pub board: Arc<TaskBoard>,
    pub background: BackgroundExecutor,
    pub tracer: Arc<Tracer>,
}

pub fn spawn_teammate(ctx: &TeamLeadToolContext, name: &str, role: &str, prompt: &str) -> String {
    ctx.roster.spawn(
        name,
        role,
        prompt,
        ctx.llm.clone(),
        ctx.cwd.clone(),
        ctx.bus.clone(),
        ctx.trackers.clone(),
        ctx.board.clone(),
        ctx.background.clone(),
        ctx.tracer.clone(),
    )
}

pub fn list_teammates(ctx: &TeamLeadToolContext) -> String {
    ctx.roster.list_all()
}

pub fn send_message(ctx: &TeamLeadToolContext, to: &str, content: &str, msg_type: &str) -> String {
    match ctx.bus.send_checked(LEAD_NAME, to, content, msg_type, None) {
        Ok(()) => format!("Message sent to '{to}'"),
        Err(e) => format!("Error: {e}"),
    }
}

pub fn read_inbox(ctx: &TeamLeadToolContext) -> String {
    match ctx.bus.read_inbox(LEAD_NAME) {
        Ok(messages) => serde_json::to_string_pretty(&messages).unwrap_or_default(),
        Err(e) => format!("Error: {e}"),
    }
}

pub fn broadcast(ctx: &TeamLeadToolContext, content: &str) -> String {
    let members = ctx.roster.member_names();
    match ctx.bus.broadcast(LEAD_NAME, content, &members) {
        Ok(n) => format!("Broadcast to {n} teammate(s)"),
        Err(e) => format!("Error: {e}"),
    }
}

pub fn shutdown_request(ctx: &TeamLeadToolContext, teammate: &str) -> String {
    let request_id = ctx.trackers.submit_shutdown(teammate);
    let _ = ctx.bus.send(
        LEAD_NAME,
        teammate,
        "Please shut down gracefully.",
        InboxMsgType::ShutdownRequest,
        Some(request_id.clone()),
    );
    format!("Shutdown request {request_id} sent to '{teammate}' (status: pending)")
}

pub fn check_shutdown_status(ctx: &TeamLeadToolContext, request_id: &str) -> String {
    match ctx.trackers.shutdown_status(request_id) {
        Some(status) => serde_json::json!({"request_id": request_id, "status": status}).to_string(),
        None => "Error: not found".to_string(),
    }
}

pub fn plan_approval(ctx: &TeamLeadToolContext, request_id: &str, approve: bool, feedback: &str) -> String {
    let Some(from) = ctx.trackers.plan_sender(request_id) else {
        return format!("Error: Unknown plan request_id '{request_id}'");
    };
    ctx.trackers.resolve_plan(request_id, approve);
    let _ = ctx.bus.send(
        LEAD_NAME,
        &from,
        feedback,
        InboxMsgType::PlanApprovalResponse,
        Some(request_id.to_string()),
    );
    format!("Plan {} for '{from}'", if approve { "approved" } else { "rejected" })
}

pub fn claim_task(ctx: &TeamLeadToolContext, task_id: u64) -> String {
    match ctx.board.claim_task(task_id, LEAD_NAME) {
        Ok(Ok(())) => format!("Claimed task #{task_id} for {LEAD_NAME}"),
        Ok(Err(e)) => format!("Error: {e}"),
        Err(e) => format!("Error: {e}"),
    }
}

pub fn tool_schemas() -> Vec<(&'static str, &'static str, serde_json::Value)> {
    vec![
        (
            "spawn_teammate",
            "Spawn a persistent teammate agent that runs concurrently and communicates via inboxes.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "role": {"type": "string"},
                    "prompt": {"type": "string", "description": "The teammate's first task"}
                },
                "required": ["name", "role", "prompt"]
            }),
        ),
        (
            "list_teammates",
            "List all teammates with their name, role, and current status.",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
        (
            "send_message",
            "Send a message to a teammate's inbox.",
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
            "Read and drain the lead's own inbox.",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
        (
            "broadcast",
            "Send a message to every teammate.",
            serde_json::json!({
                "type": "object",
                "properties": {"content": {"type": "string"}},
                "required": ["content"]
            }),
        ),
        (
            "shutdown_request",
            "Request a teammate to shut down gracefully. Returns a request_id for tracking.",
            serde_json::json!({
                "type": "object",
                "properties": {"teammate": {"type": "string"}},
                "required": ["teammate"]
            }),
        ),
        (
            "check_shutdown_status",
            "Check the status of a shutdown request by request_id.",
            serde_json::json!({
                "type": "object",
                "properties": {"request_id": {"type": "string"}},
                "required": ["request_id"]
            }),
        ),
        (
            "plan_approval",
            "Approve or reject a teammate's submitted plan.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "request_id": {"type": "string"},
                    "approve": {"type": "boolean"},
                    "feedback": {"type": "string"}
                },
                "required": ["request_id", "approve"]
            }),
        ),
        (
            "claim_task",
            "Claim a task from the shared board by id, as the lead.",
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
    use crate::session::tracer::Tracer;
    use crate::tasks::TaskBoard;
    use tempfile::TempDir;

    fn ctx(tmp: &TempDir) -> TeamLeadToolContext {
        std::env::set_var("DEEPSEEK_API_KEY", "test-key");
        TeamLeadToolContext {
            roster: TeamRoster::new(),
            llm: Arc::new(crate::llm::LlmClient::DeepSeek(
                crate::llm::deepseek::DeepSeekClient::from_env("deepseek-chat".to_string()).unwrap(),
            )),
            cwd: tmp.path().to_path_buf(),
            bus: Arc::new(MessageBus::new(tmp.path().join("inbox"))),
            trackers: Arc::new(RequestTrackers::new()),
            board: Arc::new(TaskBoard::new(tmp.path().join("tasks"))),
            background: BackgroundExecutor::new(),
            tracer: Arc::new(Tracer::new(tmp.path().join("trace.jsonl"))),
        }
    }

    #[test]
    fn shutdown_round_trip_resolves_via_lead_tools() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        let sent = shutdown_request(&ctx, "alice");
        let request_id = sent.split_whitespace().nth(2).unwrap();
        assert!(check_shutdown_status(&ctx, request_id).contains("pending"));
        ctx.trackers.resolve_shutdown(request_id, true);
        assert!(check_shutdown_status(&ctx, request_id).contains("approved"));
    }

    #[test]
    fn plan_approval_rejects_unknown_request_id() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        let out = plan_approval(&ctx, "deadbeef", true, "");
        assert!(out.contains("Unknown plan request_id"));
    }

    #[test]
    fn plan_approval_routes_response_to_submitter() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        let request_id = ctx.trackers.submit_plan("alice", "my plan");
        let out = plan_approval(&ctx, &request_id, true, "looks good");
        assert!(out.contains("approved"));
        let inbox = ctx.bus.read_inbox("alice").unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].content, "looks good");
    }

    #[test]
    fn claim_task_loser_names_the_owner() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        let task = ctx.board.store().create("do it", "").unwrap();
        assert!(claim_task(&ctx, task.id).starts_with("Claimed"));
        assert!(ctx.board.claim_task(task.id, "bob").unwrap().is_err());
        let out = claim_task(&ctx, task.id);
        assert_eq!(out, format!("Error: Task {} already claimed by {LEAD_NAME}", task.id));
    }
}
