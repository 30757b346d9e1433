//! Task Board CRUD tools, exposed to both the lead and teammates.
//!
//! Grounded 1:1 on `original_source/backend/app/tools/task_tool.py`
//! (`task_create`, `task_get`, `task_update`, `task_list`): thin
//! wrappers over `TaskStore`, catching errors into `"Error: {e}"`
//! strings rather than propagating `Result` to the model.

use std::sync::Arc;

use crate::tasks::TaskBoard;

pub struct TaskToolsContext {
    pub board: Arc<TaskBoard>,
}

pub fn task_create(ctx: &TaskToolsContext, subject: &str, description: &str) -> String {
    match ctx.board.store().create(subject, description) {
        Ok(task) => serde_json::to_string_pretty(&task).unwrap_or_default(),
        Err(e) => format!("Error: {e}"),
    }
}

pub fn task_get(ctx: &TaskToolsContext, id: u64) -> String {
    match ctx.board.store().get(id) {
        Ok(task) => serde_json::to_string_pretty(&task).unwrap_or_default(),
        Err(e) => format!("Error: {e}"),
    }
}

pub fn task_update(
    ctx: &TaskToolsContext,
    id: u64,
    status: Option<&str>,
    add_blocked_by: Option<Vec<u64>>,
    add_blocks: Option<Vec<u64>>,
) -> String {
    match ctx.board.store().update(id, status, add_blocked_by, add_blocks) {
        Ok(task) => serde_json::to_string_pretty(&task).unwrap_or_default(),
        Err(e) => format!("Error: {e}"),
    }
}

pub fn task_list(ctx: &TaskToolsContext) -> String {
    match ctx.board.store().list_all() {
        Ok(s) => s,
        Err(e) => format!("Error: {e}"),
    }
}

pub fn tool_schemas() -> Vec<(&'static str, &'static str, serde_json::Value)> {
    vec![
        (
            "task_create",
            "Create a new task on the shared board.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "subject": {"type": "string"},
                    "description": {"type": "string"}
                },
                "required": ["subject"]
            }),
        ),
        (
            "task_get",
            "Fetch a task by id.",
            serde_json::json!({
                "type": "object",
                "properties": {"id": {"type": "integer"}},
                "required": ["id"]
            }),
        ),
        (
            "task_update",
            "Update a task's status and/or dependency edges.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "id": {"type": "integer"},
                    "status": {"type": "string", "enum": ["pending", "in_progress", "completed"]},
                    "add_blocked_by": {"type": "array", "items": {"type": "integer"}},
                    "add_blocks": {"type": "array", "items": {"type": "integer"}}
                },
                "required": ["id"]
            }),
        ),
        (
            "task_list",
            "List every task with its status, blockers, and worktree binding.",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx(tmp: &TempDir) -> TaskToolsContext {
        TaskToolsContext {
            board: Arc::new(TaskBoard::new(tmp.path())),
        }
    }

    #[test]
    fn create_then_get_round_trips() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        let created = task_create(&ctx, "write docs", "");
        assert!(created.contains("write docs"));
        let fetched = task_get(&ctx, 1);
        assert!(fetched.contains("write docs"));
    }

    #[test]
    fn update_with_bad_status_errors() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        task_create(&ctx, "t", "");
        let out = task_update(&ctx, 1, Some("bogus"), None, None);
        assert!(out.contains("Error"));
    }

    #[test]
    fn list_reports_no_tasks_when_empty() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        assert_eq!(task_list(&ctx), "No tasks.");
    }
}
