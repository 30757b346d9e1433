//! Tool Registry: name-to-handler dispatch, per-agent-type capability
//! filtering, and the `AGENT_TYPES` table the Task-tool factory reads.
//!
//! Grounded on spec §4.8 (capability filtering: an agent type declares
//! `*` or an explicit allow-list; Task is always stripped from a child's
//! set) and §9's "agent-type polymorphism → tagged variants + config"
//! redesign note (`AGENT_TYPES` as a data-driven table of tools policy +
//! system-prompt template + loop kind), with the JSON schema catalog
//! ported from the teacher's `webui/tools/definitions.rs`.

use crate::llm::ToolSpec;
use std::collections::HashMap;
use std::path::Path;

use super::{bash, edit, glob, grep, read, write};

pub const TASK_TOOL_NAME: &str = "Task";

/// How a sub-agent drives its turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    React,
    Ooda,
    Direct,
}

/// Which tools an agent type is allowed to call.
#[derive(Debug, Clone)]
pub enum ToolsPolicy {
    All,
    Allow(Vec<&'static str>),
}

pub struct AgentTypeDef {
    pub name: &'static str,
    pub description: &'static str,
    pub system_prompt: &'static str,
    pub tools: ToolsPolicy,
    pub loop_kind: LoopKind,
}

/// The built-in agent-type table the Task tool dispatches against.
/// `general-purpose` gets every registered tool except Task itself;
/// the read-only types (`Explore`, `Plan`, `SearchSubagent`) never see
/// Write/Edit/Bash; `Reflect`/`Reflexion` carry no tools at all, so the
/// sub-agent driver skips ReAct for them and calls the LLM directly.
pub fn agent_types() -> Vec<AgentTypeDef> {
    vec![
        AgentTypeDef {
            name: "Explore",
            description: "Read-only exploration agent for codebase/file investigation.",
            system_prompt: "You are an exploration sub-agent. You may only read; report findings concisely.",
            tools: ToolsPolicy::Allow(vec!["Read", "Glob", "Grep"]),
            loop_kind: LoopKind::Ooda,
        },
        AgentTypeDef {
            name: "general-purpose",
            description: "General-purpose agent for multi-step tasks with full tool access.",
            system_prompt: "You are a focused sub-agent. Complete the given task and report back concisely.",
            tools: ToolsPolicy::All,
            loop_kind: LoopKind::React,
        },
        AgentTypeDef {
            name: "Plan",
            description: "Read-only planning agent. Produces a plan without making any modifications.",
            system_prompt: "You are a planning sub-agent. Investigate with read-only tools and propose a plan; make no modifications.",
            tools: ToolsPolicy::Allow(vec!["Read", "Glob", "Grep"]),
            loop_kind: LoopKind::React,
        },
        AgentTypeDef {
            name: "ScriptWriter",
            description: "Read and write agent for authoring scripts or files.",
            system_prompt: "You are a script-writing sub-agent. Read what you need, then write or edit files to complete the task.",
            tools: ToolsPolicy::Allow(vec!["Read", "Write", "Edit", "Glob", "Grep"]),
            loop_kind: LoopKind::React,
        },
        AgentTypeDef {
            name: "Reflect",
            description: "No-tool reviewer that returns a JSON-only PASS|NEEDS_REVISION verdict.",
            system_prompt: "You are a reflection agent. Review the given work and respond with JSON only: \
{\"verdict\": \"PASS\" or \"NEEDS_REVISION\", \"missing\": [...], \"superfluous\": [...], \"suggestion\": \"...\"}. \
You have no tools; judge from the prompt alone.",
            tools: ToolsPolicy::Allow(vec![]),
            loop_kind: LoopKind::Direct,
        },
        AgentTypeDef {
            name: "Reflexion",
            description: "No-tool two-phase agent: an initial response, then a self-critique revision pass.",
            system_prompt: "You are a reflexion agent. First answer the prompt directly, then critique and revise your \
own answer. You have no tools.",
            tools: ToolsPolicy::Allow(vec![]),
            loop_kind: LoopKind::Direct,
        },
        AgentTypeDef {
            name: "SearchSubagent",
            description: "Read-only search agent specialised for locating code or content across the workspace.",
            system_prompt: "You are a search sub-agent. Use Grep/Glob/Read to locate what's being asked for and report matches concisely.",
            tools: ToolsPolicy::Allow(vec!["Read", "Glob", "Grep"]),
            loop_kind: LoopKind::Ooda,
        },
        AgentTypeDef {
            name: "OODASubagent",
            description: "General-purpose agent driven by the bounded Observe/Orient/Decide/Act cycle instead of ReAct.",
            system_prompt: "You are a sub-agent operating in OODA cycles. Observe, orient, decide, then act; \
terminate once you have enough confidence to answer.",
            tools: ToolsPolicy::All,
            loop_kind: LoopKind::Ooda,
        },
    ]
}

pub fn find_agent_type(name: &str) -> Option<AgentTypeDef> {
    agent_types().into_iter().find(|a| a.name == name)
}

pub fn agent_type_descriptions() -> String {
    agent_types()
        .iter()
        .map(|a| format!("- {}: {}", a.name, a.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// JSON schema definitions for the filesystem/shell leaf tools, in the
/// provider-agnostic `ToolSpec` shape.
pub fn builtin_tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "Read".to_string(),
            description: "Read a file from the filesystem. Returns the file contents with line numbers.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "The absolute path to the file to read"},
                    "offset": {"type": "integer", "description": "The line number to start reading from (1-based)"},
                    "limit": {"type": "integer", "description": "The number of lines to read"}
                },
                "required": ["file_path"]
            }),
        },
        ToolSpec {
            name: "Write".to_string(),
            description: "Write content to a file, creating it if it doesn't exist or overwriting if it does.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "The absolute path to the file to write"},
                    "content": {"type": "string", "description": "The content to write to the file"}
                },
                "required": ["file_path", "content"]
            }),
        },
        ToolSpec {
            name: "Edit".to_string(),
            description: "Perform exact string replacement in a file. old_string must match exactly one location unless replace_all is set.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "The absolute path to the file to edit"},
                    "old_string": {"type": "string", "description": "The exact text to find and replace"},
                    "new_string": {"type": "string", "description": "The replacement text"},
                    "replace_all": {"type": "boolean", "description": "Replace all occurrences (default: false)"}
                },
                "required": ["file_path", "old_string", "new_string"]
            }),
        },
        ToolSpec {
            name: "Bash".to_string(),
            description: "Execute a bash command and return stdout and stderr. Commands run in the session's working directory.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "The bash command to execute"},
                    "timeout": {"type": "integer", "description": "Timeout in milliseconds (default: 120000, max: 600000)"}
                },
                "required": ["command"]
            }),
        },
        ToolSpec {
            name: "Grep".to_string(),
            description: "Search file contents using ripgrep. Returns matching files or content lines.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "The regex pattern to search for"},
                    "path": {"type": "string", "description": "File or directory to search in (defaults to cwd)"},
                    "glob": {"type": "string", "description": "Glob pattern to filter files (e.g. \"*.rs\")"},
                    "-i": {"type": "boolean", "description": "Case-insensitive search"},
                    "output_mode": {
                        "type": "string",
                        "enum": ["content", "files_with_matches", "count"],
                        "description": "Output mode (default: files_with_matches)"
                    }
                },
                "required": ["pattern"]
            }),
        },
        ToolSpec {
            name: "Glob".to_string(),
            description: "Find files matching a glob pattern. Returns matching file paths sorted by modification time.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "The glob pattern to match files against (e.g. \"**/*.rs\")"},
                    "path": {"type": "string", "description": "The directory to search in (defaults to cwd)"}
                },
                "required": ["pattern"]
            }),
        },
    ]
}

/// Dispatch a leaf-tool call by name. Callers (Main Loop, Sub-Agent
/// Driver, Teammate Loop) compose this with their own tool sets (task
/// tool, teammate tools, background tools) before handing a combined
/// `HashMap` to the LLM turn.
pub async fn dispatch_leaf(name: &str, input: &serde_json::Value, cwd: &Path) -> anyhow::Result<String> {
    match name {
        "Read" => read::execute(input, cwd).await,
        "Write" => write::execute(input, cwd).await,
        "Edit" => edit::execute(input, cwd).await,
        "Bash" => bash::execute(input, cwd).await,
        "Grep" => grep::execute(input, cwd).await,
        "Glob" => glob::execute(input, cwd).await,
        other => anyhow::bail!("Unknown tool: {other}"),
    }
}

/// Filter a base tool list against an agent type's policy, always
/// stripping the Task tool (spec §4.2/§4.8: no recursive spawning).
pub fn filter_for_agent_type(base: &[ToolSpec], policy: &ToolsPolicy) -> Vec<ToolSpec> {
    let allowed: Vec<ToolSpec> = match policy {
        ToolsPolicy::All => base.to_vec(),
        ToolsPolicy::Allow(names) => base
            .iter()
            .filter(|t| names.contains(&t.name.as_str()))
            .cloned()
            .collect(),
    };
    allowed.into_iter().filter(|t| t.name != TASK_TOOL_NAME).collect()
}

pub fn by_name(specs: &[ToolSpec]) -> HashMap<String, ToolSpec> {
    specs.iter().cloned().map(|t| (t.name.clone(), t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_purpose_gets_every_tool_but_task() {
        let mut base = builtin_tool_specs();
        base.push(ToolSpec {
            name: TASK_TOOL_NAME.to_string(),
            description: "spawn".to_string(),
            input_schema: serde_json::json!({}),
        });
        let filtered = filter_for_agent_type(&base, &ToolsPolicy::All);
        assert!(filtered.iter().all(|t| t.name != TASK_TOOL_NAME));
        assert_eq!(filtered.len(), base.len() - 1);
    }

    #[test]
    fn explore_only_gets_read_only_tools() {
        let base = builtin_tool_specs();
        let policy = ToolsPolicy::Allow(vec!["Read", "Glob", "Grep"]);
        let filtered = filter_for_agent_type(&base, &policy);
        let names: Vec<&str> = filtered.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Read", "Grep", "Glob"]);
    }

    #[test]
    fn reflect_agent_type_has_no_tools() {
        let reflect = find_agent_type("Reflect").unwrap();
        assert!(matches!(reflect.tools, ToolsPolicy::Allow(ref v) if v.is_empty()));
        assert_eq!(reflect.loop_kind, LoopKind::Direct);
    }

    #[test]
    fn unknown_agent_type_is_none() {
        assert!(find_agent_type("nonexistent").is_none());
    }

    #[test]
    fn all_eight_canonical_agent_types_are_registered() {
        let names: Vec<&str> = agent_types().iter().map(|a| a.name).collect();
        for expected in [
            "Explore",
            "general-purpose",
            "Plan",
            "ScriptWriter",
            "Reflect",
            "Reflexion",
            "SearchSubagent",
            "OODASubagent",
        ] {
            assert!(names.contains(&expected), "missing agent type {expected}");
        }
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn script_writer_can_write_but_not_execute_shell() {
        let writer = find_agent_type("ScriptWriter").unwrap();
        let base = builtin_tool_specs();
        let filtered = filter_for_agent_type(&base, &writer.tools);
        let names: Vec<&str> = filtered.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"Write"));
        assert!(!names.contains(&"Bash"));
    }
}
