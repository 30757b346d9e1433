//! Worktree management tools: create/list/status/run/remove/keep a
//! git-worktree lane, plus the lifecycle event tail.
//!
//! Grounded 1:1 on `original_source/backend/app/tools/worktree_tool.py`.
//! Errors surface as `"Error: {e}"` strings rather than `Result`,
//! matching spec §7's tool-local-failure convention; `WorktreeManager`
//! itself already returns most failure paths this way, so these wrappers
//! only need to catch its `Err` (repo/filesystem failures) on top.

use std::sync::Arc;

use crate::worktree::WorktreeManager;

pub struct WorktreeToolsContext {
    pub manager: Arc<WorktreeManager>,
}

pub async fn worktree_create(
    ctx: &WorktreeToolsContext,
    name: &str,
    task_id: Option<u64>,
    base_ref: Option<&str>,
) -> String {
    match ctx.manager.create(name, task_id, base_ref).await {
        Ok(entry) => serde_json::to_string_pretty(&entry).unwrap_or_default(),
        Err(e) => format!("Error: {e}"),
    }
}

pub fn worktree_list(ctx: &WorktreeToolsContext) -> String {
    ctx.manager.list_all().unwrap_or_else(|e| format!("Error: {e}"))
}

pub async fn worktree_status(ctx: &WorktreeToolsContext, name: &str) -> String {
    ctx.manager.status(name).await.unwrap_or_else(|e| format!("Error: {e}"))
}

pub async fn worktree_run(ctx: &WorktreeToolsContext, name: &str, command: &str) -> String {
    ctx.manager.run(name, command).await.unwrap_or_else(|e| format!("Error: {e}"))
}

pub async fn worktree_remove(
    ctx: &WorktreeToolsContext,
    name: &str,
    force: bool,
    complete_task: bool,
) -> String {
    ctx.manager
        .remove(name, force, complete_task)
        .await
        .unwrap_or_else(|e| format!("Error: {e}"))
}

pub fn worktree_keep(ctx: &WorktreeToolsContext, name: &str) -> String {
    ctx.manager.keep(name).unwrap_or_else(|e| format!("Error: {e}"))
}

pub fn worktree_events(ctx: &WorktreeToolsContext, limit: usize) -> String {
    ctx.manager.events().list_recent(limit)
}

pub fn tool_schemas() -> Vec<(&'static str, &'static str, serde_json::Value)> {
    vec![
        (
            "worktree_create",
            "Create a new git worktree lane, optionally bound to a task and base ref.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "task_id": {"type": "integer"},
                    "base_ref": {"type": "string"}
                },
                "required": ["name"]
            }),
        ),
        (
            "worktree_list",
            "List every worktree in the index with its status and path.",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
        (
            "worktree_status",
            "Run `git status --short --branch` inside a worktree.",
            serde_json::json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            }),
        ),
        (
            "worktree_run",
            "Run a shell command inside a worktree (300s / 50000-byte caps, dangerous commands blocked).",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "command": {"type": "string"}
                },
                "required": ["name", "command"]
            }),
        ),
        (
            "worktree_remove",
            "Remove a worktree, optionally forcing and/or completing its bound task.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "force": {"type": "boolean"},
                    "complete_task": {"type": "boolean"}
                },
                "required": ["name"]
            }),
        ),
        (
            "worktree_keep",
            "Mark a worktree as kept, exempting it from cleanup.",
            serde_json::json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            }),
        ),
        (
            "worktree_events",
            "Tail the most recent worktree/task lifecycle events.",
            serde_json::json!({
                "type": "object",
                "properties": {"limit": {"type": "integer"}}
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskStore;
    use tempfile::TempDir;

    fn ctx(tmp: &TempDir) -> WorktreeToolsContext {
        let tasks = Arc::new(TaskStore::new(tmp.path().join("tasks")));
        WorktreeToolsContext {
            manager: Arc::new(WorktreeManager::new(tmp.path(), tasks).unwrap()),
        }
    }

    #[test]
    fn list_reports_empty_index() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        assert_eq!(worktree_list(&ctx), "No worktrees in index.");
    }

    #[test]
    fn keep_on_unknown_name_surfaces_error_string() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        assert!(worktree_keep(&ctx, "ghost").contains("Unknown worktree"));
    }

    #[test]
    fn events_tail_is_empty_array_before_any_lifecycle_event() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(&tmp);
        assert_eq!(worktree_events(&ctx, 20), "[]");
    }
}
