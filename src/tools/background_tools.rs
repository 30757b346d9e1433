//! Background tools: `background_run`, `background_agent`,
//! `check_background`. Grounded 1:1 on
//! `original_source/backend/app/background/runner.py`'s tool-facing
//! contract (`run`, `run_agent`, `check`).

use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::subagent::{self, SubagentRequest};
use crate::background::BackgroundExecutor;
use crate::llm::LlmClient;
use crate::session::tracer::Tracer;

pub struct BackgroundToolContext {
    pub executor: BackgroundExecutor,
    pub cwd: PathBuf,
    pub llm: Arc<LlmClient>,
    pub tracer: Option<Arc<Tracer>>,
}

pub fn background_run(ctx: &BackgroundToolContext, command: &str) -> String {
    ctx.executor.run(command, ctx.cwd.clone())
}

pub fn background_agent(
    ctx: &BackgroundToolContext,
    description: &str,
    prompt: &str,
    subagent_type: &str,
) -> String {
    let req = SubagentRequest {
        description: description.to_string(),
        prompt: prompt.to_string(),
        agent_type: subagent_type.to_string(),
        llm: ctx.llm.clone(),
        cwd: ctx.cwd.clone(),
        tracer: ctx.tracer.clone(),
    };
    ctx.executor.run_agent(description, move || subagent::run(req))
}

pub fn check_background(ctx: &BackgroundToolContext, task_id: Option<&str>) -> String {
    ctx.executor.check(task_id)
}

pub fn tool_schemas() -> Vec<(&'static str, &'static str, serde_json::Value)> {
    vec![
        (
            "background_run",
            "Run a shell command in the background and return a task id immediately.",
            serde_json::json!({
                "type": "object",
                "properties": {"command": {"type": "string"}},
                "required": ["command"]
            }),
        ),
        (
            "background_agent",
            "Spawn a subagent in the background and return a task id immediately.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "description": {"type": "string"},
                    "prompt": {"type": "string"},
                    "subagent_type": {"type": "string"}
                },
                "required": ["prompt", "subagent_type"]
            }),
        ),
        (
            "check_background",
            "Check the status of a background task, or summarize all of them if task_id is omitted.",
            serde_json::json!({
                "type": "object",
                "properties": {"task_id": {"type": "string"}}
            }),
        ),
    ]
}
