//! Task-tool factory: builds the `Task` tool the Main Loop (and, through
//! it, teammates) use to spawn a Sub-Agent Driver run in isolated
//! context. Grounded on `original_source/backend/app/tools/spawn_tool.py`'s
//! `make_task_tool` (closure-over-base-tools factory, agent-type
//! validation before dispatch).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::agent::subagent::{self, SubagentRequest};
use crate::llm::LlmClient;
use crate::session::tracer::Tracer;
use crate::tools::registry;

/// Everything a `Task` invocation needs beyond its own arguments.
pub struct TaskToolContext {
    pub llm: Arc<LlmClient>,
    pub cwd: PathBuf,
    pub tracer: Option<Arc<Tracer>>,
}

/// `input` carries `{description, prompt, subagent_type}`, matching the
/// original's `Task(description, prompt, subagent_type)` tool signature.
pub async fn execute(input: &serde_json::Value, ctx: &TaskToolContext) -> Result<String> {
    let description = input
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let prompt = input
        .get("prompt")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing required parameter: prompt"))?;
    let subagent_type = input
        .get("subagent_type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing required parameter: subagent_type"))?;

    if registry::find_agent_type(subagent_type).is_none() {
        let known: Vec<&str> = registry::agent_types().iter().map(|a| a.name).collect();
        return Ok(format!(
            "Error: Unknown agent type '{subagent_type}'. Choose from: {known:?}"
        ));
    }

    tracing::info!(subagent_type, description, "Task: spawning subagent");
    if let Some(t) = &ctx.tracer {
        t.emit(
            "task_tool.spawn",
            serde_json::json!({"subagent_type": subagent_type, "description": description}),
        );
    }

    let result = subagent::run(SubagentRequest {
        description: description.to_string(),
        prompt: prompt.to_string(),
        agent_type: subagent_type.to_string(),
        llm: ctx.llm.clone(),
        cwd: ctx.cwd.clone(),
        tracer: ctx.tracer.clone(),
    })
    .await?;

    Ok(result)
}

pub fn tool_description() -> String {
    format!(
        "Spawn a subagent for a focused subtask. Subagents run in ISOLATED context.\n\n\
         Agent types:\n{}\n\n\
         Use for subtasks needing focused exploration or implementation without polluting main context.",
        registry::agent_type_descriptions()
    )
}

pub fn tool_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "description": {"type": "string", "description": "Short description of the subtask"},
            "prompt": {"type": "string", "description": "The full task prompt for the subagent"},
            "subagent_type": {"type": "string", "description": "One of the registered agent types"}
        },
        "required": ["prompt", "subagent_type"]
    })
}
