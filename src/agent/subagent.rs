//! Sub-Agent Driver: runs one focused, isolated task in a fresh message
//! history with a tool set filtered by its agent type. Two modes, per
//! spec §4.2 — ReAct (default) and OODA (bounded Observe/Orient/Decide/
//! Act cycles, for exploration-heavy goals) — plus a direct, no-tool
//! mode for agent types that carry an empty tool list (`Reflect`,
//! `Reflexion`).
//!
//! Grounded on spec §4.2 directly: no usable body of
//! `original_source/backend/app/subagents/__init__.py` survived the
//! source filter (only its docstring/imports did), so the control flow
//! here mirrors the Main Loop's ReAct shape (`agent.py`'s
//! `AgentService.run`, steps 6-7) reduced to a single isolated agent
//! with no inbox/background/compaction concerns, plus the original's
//! `spawn_tool.py` sub-agent-invocation contract (description, prompt,
//! agent-type tag, recursion cap, final text as the only output).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::llm::LlmClient;
use crate::session::tracer::Tracer;
use crate::tools::quality_gate::{self, GateResult};
use crate::tools::registry::{self, LoopKind};
use crate::types::{ContentBlock, Message, ToolCall, ToolResult};

/// `ChatResponse` carries raw content blocks rather than a pre-filtered
/// tool-call list (that accessor lives on `Message`, which owns its
/// content instead of borrowing a response); pull the calls out here.
fn extract_tool_calls(content: &[ContentBlock]) -> Vec<ToolCall> {
    content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolCall(tc) => Some(tc.clone()),
            _ => None,
        })
        .collect()
}

/// Inputs the Task tool and the background-agent tool both hand to a
/// sub-agent run. `description` is a short label surfaced in traces and
/// background-job listings; `prompt` is the sub-agent's entire task.
pub struct SubagentRequest {
    pub description: String,
    pub prompt: String,
    pub agent_type: String,
    pub llm: Arc<LlmClient>,
    pub cwd: PathBuf,
    pub tracer: Option<Arc<Tracer>>,
}

const DEFAULT_RECURSION_LIMIT: usize = 100;
const MAX_OODA_CYCLES: usize = 6;
/// How many times a completion gets rejected and retried with the gate's
/// output folded into the prompt before the sub-agent's last answer is
/// accepted as-is, matching the Worker's bounded-retry posture without
/// the Worker's much larger overall iteration budget (one isolated call
/// here, not a whole task's worth of turns).
const MAX_GATE_RETRIES: usize = 2;

pub async fn run(mut req: SubagentRequest) -> Result<String> {
    let agent_def = registry::find_agent_type(&req.agent_type)
        .ok_or_else(|| anyhow::anyhow!("Unknown agent type '{}'", req.agent_type))?;

    let span_id = Tracer::new_run_id();
    if let Some(t) = &req.tracer {
        t.emit(
            "subagent.start",
            serde_json::json!({
                "span_id": span_id,
                "agent_type": agent_def.name,
                "description": req.description,
            }),
        );
    }

    let base_prompt = req.prompt.clone();
    let gate_config = quality_gate::build_gate_config(&quality_gate::detect_project_languages(&req.cwd), &req.cwd);

    let mut result = Ok(String::new());
    for attempt in 0..=MAX_GATE_RETRIES {
        result = match agent_def.loop_kind {
            LoopKind::Direct => run_direct(&req, agent_def.system_prompt).await,
            LoopKind::React => run_react(&req, agent_def.system_prompt, &agent_def.tools).await,
            LoopKind::Ooda => run_ooda(&req, agent_def.system_prompt, &agent_def.tools).await,
        };

        if result.is_err() {
            break;
        }
        let Some(gc) = &gate_config else { break };

        let gate_result = quality_gate::run_quality_gate(gc).await;
        if let Some(t) = &req.tracer {
            t.emit(
                "subagent.quality_gate",
                serde_json::json!({
                    "span_id": span_id,
                    "passed": matches!(gate_result, GateResult::Passed),
                    "attempt": attempt,
                }),
            );
        }

        let continuation = match gate_result {
            GateResult::Passed => break,
            GateResult::Failed { output } => format!(
                "Your previous attempt failed verification:\n\n{output}\n\nFix the issues and try again."
            ),
            GateResult::Timeout => {
                "Verification of your previous attempt timed out. Try a narrower, faster approach.".to_string()
            }
        };

        if attempt == MAX_GATE_RETRIES {
            break;
        }
        req.prompt = format!("{base_prompt}\n\n## Quality gate feedback\n\n{continuation}");
    }

    if let Some(t) = &req.tracer {
        t.emit(
            "subagent.end",
            serde_json::json!({
                "span_id": span_id,
                "agent_type": agent_def.name,
                "ok": result.is_ok(),
            }),
        );
    }

    result
}

/// No-tool agent types (`Reflect`, `Reflexion`) skip ReAct entirely.
/// `Reflexion` is the one two-phase exception: an initial response,
/// then a self-critique revision pass over that same response.
async fn run_direct(req: &SubagentRequest, system_prompt: &str) -> Result<String> {
    let first = req
        .llm
        .chat(system_prompt, &[Message::user_text(&req.prompt)], &[])
        .await
        .context("sub-agent direct call failed")?;
    let first_text = first.text();

    if req.agent_type != "Reflexion" {
        return Ok(first_text);
    }

    let revise_prompt = format!(
        "Original task:\n{}\n\nYour initial response:\n{}\n\n\
         Critique your own response for gaps or mistakes, then give a final, revised answer.",
        req.prompt, first_text
    );
    let revised = req
        .llm
        .chat(system_prompt, &[Message::user_text(revise_prompt)], &[])
        .await
        .context("sub-agent revision call failed")?;
    Ok(revised.text())
}

async fn run_react(
    req: &SubagentRequest,
    system_prompt: &str,
    tools_policy: &registry::ToolsPolicy,
) -> Result<String> {
    let tool_specs = registry::filter_for_agent_type(&registry::builtin_tool_specs(), tools_policy);
    let mut history = vec![Message::user_text(&req.prompt)];

    for _turn in 0..DEFAULT_RECURSION_LIMIT {
        let response = req.llm.chat(system_prompt, &history, &tool_specs).await?;

        if !response.has_tool_calls() {
            let text = response.text();
            if !text.is_empty() {
                return Ok(text);
            }
            return Ok(fallback_answer(req, system_prompt, &history).await?);
        }

        let calls = extract_tool_calls(&response.content);
        history.push(Message::Assistant {
            content: response.content.clone(),
        });

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            if let Some(t) = &req.tracer {
                t.emit(
                    "tool.call",
                    serde_json::json!({"name": call.name, "call_id": call.id}),
                );
            }
            let outcome = registry::dispatch_leaf(&call.name, &call.args, &req.cwd).await;
            let result = match outcome {
                Ok(text) => ToolResult::ok(call.id.clone(), text),
                Err(e) => ToolResult::error(call.id.clone(), e),
            };
            if let Some(t) = &req.tracer {
                t.emit(
                    "tool.result",
                    serde_json::json!({"call_id": call.id, "is_error": result.is_error}),
                );
            }
            results.push(result);
        }
        history.push(Message::tool_result_for(results));
    }

    Ok(format!(
        "Sub-agent budget exhausted after {DEFAULT_RECURSION_LIMIT} turns without a final answer."
    ))
}

/// One extra direct call with a condensed tool-result summary, for the
/// case where the model drops its natural-language content after a
/// final round of tool use (§7's LLM-integration-failure fallback).
async fn fallback_answer(req: &SubagentRequest, system_prompt: &str, history: &[Message]) -> Result<String> {
    let summary = condense_tool_results(history);
    let prompt = format!(
        "Based on the tool results below, answer the original task in natural language.\n\n\
         Original task:\n{}\n\nTool results:\n{summary}",
        req.prompt
    );
    let response = req
        .llm
        .chat(system_prompt, &[Message::user_text(prompt)], &[])
        .await?;
    Ok(response.text())
}

fn condense_tool_results(history: &[Message]) -> String {
    history
        .iter()
        .filter_map(|m| match m {
            Message::ToolResult { content } => Some(
                content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolResult { content, .. } => Some(content.clone()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

#[derive(Debug, Deserialize)]
struct OrientResult {
    situation: String,
    gaps: String,
    confidence: f64,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum Choice {
    ObserveMore,
    Act,
    Done,
}

#[derive(Debug, Deserialize)]
struct DecideResult {
    choice: Choice,
    #[allow(dead_code)]
    reason: String,
}

/// Bounded Observe/Orient/Decide/Act cycle (default cap 6). Observe/Act
/// reuse the ReAct single-turn tool-call machinery; Orient/Decide ask
/// the model for small structured JSON verdicts with no tools attached.
async fn run_ooda(
    req: &SubagentRequest,
    system_prompt: &str,
    tools_policy: &registry::ToolsPolicy,
) -> Result<String> {
    let tool_specs = registry::filter_for_agent_type(&registry::builtin_tool_specs(), tools_policy);
    let mut history = vec![Message::user_text(&req.prompt)];
    let mut observation_log: Vec<String> = Vec::new();

    for cycle in 0..MAX_OODA_CYCLES {
        observe_or_act(req, system_prompt, &tool_specs, &mut history, &mut observation_log).await?;

        let orient = ask_json::<OrientResult>(
            req,
            system_prompt,
            &format!(
                "Observations so far:\n{}\n\nDigest this into JSON only: \
                 {{\"situation\": \"...\", \"gaps\": \"...\", \"confidence\": 0.0}}",
                observation_log.join("\n")
            ),
        )
        .await?;

        let decide = ask_json::<DecideResult>(
            req,
            system_prompt,
            &format!(
                "Situation: {}\nGaps: {}\nConfidence: {}\n\n\
                 Decide what to do next. Respond with JSON only: \
                 {{\"choice\": \"OBSERVE_MORE\" | \"ACT\" | \"DONE\", \"reason\": \"...\"}}",
                orient.situation, orient.gaps, orient.confidence
            ),
        )
        .await?;

        if let Some(t) = &req.tracer {
            t.emit(
                "ooda.cycle",
                serde_json::json!({"cycle": cycle, "confidence": orient.confidence, "choice": format!("{:?}", decide.choice)}),
            );
        }

        match decide.choice {
            Choice::Done => break,
            Choice::Act => {
                observe_or_act(req, system_prompt, &tool_specs, &mut history, &mut observation_log).await?;
            }
            Choice::ObserveMore => {}
        }
    }

    let summary_prompt = format!(
        "Original task:\n{}\n\nObservations gathered:\n{}\n\nSummarize the final answer in natural language.",
        req.prompt,
        observation_log.join("\n")
    );
    let response = req
        .llm
        .chat(system_prompt, &[Message::user_text(summary_prompt)], &[])
        .await?;
    Ok(response.text())
}

async fn observe_or_act(
    req: &SubagentRequest,
    system_prompt: &str,
    tool_specs: &[crate::llm::ToolSpec],
    history: &mut Vec<Message>,
    observation_log: &mut Vec<String>,
) -> Result<()> {
    let response = req.llm.chat(system_prompt, history.as_slice(), tool_specs).await?;
    if !response.has_tool_calls() {
        observation_log.push(response.text());
        return Ok(());
    }

    let calls = extract_tool_calls(&response.content);
    history.push(Message::Assistant {
        content: response.content.clone(),
    });

    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        let outcome = registry::dispatch_leaf(&call.name, &call.args, &req.cwd).await;
        let result = match outcome {
            Ok(text) => {
                observation_log.push(format!("{}({}): {}", call.name, call.args, preview(&text, 500)));
                ToolResult::ok(call.id.clone(), text)
            }
            Err(e) => {
                observation_log.push(format!("{}({}): Error: {e}", call.name, call.args));
                ToolResult::error(call.id.clone(), e)
            }
        };
        results.push(result);
    }
    history.push(Message::tool_result_for(results));
    Ok(())
}

fn preview(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

/// Call the LLM with no tools and parse its text as JSON, tolerating a
/// ```json fenced response.
async fn ask_json<T: for<'de> Deserialize<'de>>(req: &SubagentRequest, system_prompt: &str, prompt: &str) -> Result<T> {
    let response = req.llm.chat(system_prompt, &[Message::user_text(prompt)], &[]).await?;
    let text = response.text();
    let cleaned = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(cleaned).with_context(|| format!("failed to parse sub-agent JSON verdict: {cleaned}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condense_tool_results_joins_results_in_order() {
        let history = vec![
            Message::user_text("hi"),
            Message::tool_result_for(vec![ToolResult::ok("a", "one")]),
            Message::tool_result_for(vec![ToolResult::ok("b", "two")]),
        ];
        assert_eq!(condense_tool_results(&history), "one\n---\ntwo");
    }

    #[test]
    fn decide_json_parses_screaming_snake_case() {
        let parsed: DecideResult =
            serde_json::from_str(r#"{"choice": "OBSERVE_MORE", "reason": "need more context"}"#).unwrap();
        assert_eq!(parsed.choice, Choice::ObserveMore);
    }

    #[test]
    fn orient_json_parses_confidence_as_float() {
        let parsed: OrientResult =
            serde_json::from_str(r#"{"situation": "s", "gaps": "g", "confidence": 0.75}"#).unwrap();
        assert!((parsed.confidence - 0.75).abs() < f64::EPSILON);
    }
}
