//! Main Loop: drives one user-prompt-to-final-answer cycle, orchestrating
//! compaction, inbox/background injection, the nag/reflection-gate
//! counters, and the top-level ReAct turn loop.
//!
//! Grounded 1:1 on `original_source/backend/app/agent.py`'s
//! `AgentService.run` (step ordering, counter semantics, the dual
//! background-notification-drain points), reconciled with the teacher's
//! `chat_engine/agentic.rs` for the turn-capped async-loop shape (a
//! non-streaming `chat()` call per turn in place of the teacher's SSE
//! stream, since this crate's `LlmClient::chat` is one-shot request/
//! response per spec §6a).

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use crate::agent::roster::TeamRoster;
use crate::background::BackgroundExecutor;
use crate::communication::trackers::RequestTrackers;
use crate::communication::MessageBus;
use crate::compaction;
use crate::llm::{LlmClient, ToolSpec};
use crate::session::tracer::Tracer;
use crate::session::{self, Session};
use crate::tasks::TaskBoard;
use crate::tools::registry;
use crate::tools::task_board_tools::{self, TaskToolsContext};
use crate::tools::task_tool::{self, TaskToolContext};
use crate::tools::team_lead_tools::{self, TeamLeadToolContext};
use crate::tools::worktree_tools::{self, WorktreeToolsContext};
use crate::types::{ContentBlock, Message, ToolResult};
use crate::worktree::WorktreeManager;

const ROUNDS_WITHOUT_TODO_THRESHOLD: usize = 3;
const REFLECT_RETRY_ESCAPE_VALVE: usize = 2;
const MAX_TURNS: usize = 50;
const TODO_WRITE_TOOL: &str = "TodoWrite";

/// Per-run counters that drive the nag/reflection-gate injections.
/// Persisted only for the lifetime of one `MainLoop`; reset logic
/// mirrors `agent.py`'s module-level counters exactly.
#[derive(Debug, Default, Clone, Copy)]
struct NagState {
    rounds_without_todo: usize,
    file_writes_since_reflect: usize,
    reflect_retry_count: usize,
}

impl NagState {
    fn on_tool_result(&mut self, tool_name: &str) {
        if tool_name == TODO_WRITE_TOOL {
            self.rounds_without_todo = 0;
        } else {
            self.rounds_without_todo += 1;
        }
        if tool_name == "Write" || tool_name == "Edit" {
            self.file_writes_since_reflect += 1;
        }
    }

    fn on_reflect_result(&mut self, content: &str) {
        if content.contains("NEEDS_REVISION") {
            self.reflect_retry_count += 1;
        } else {
            self.rounds_without_todo = 0;
            self.file_writes_since_reflect = 0;
            self.reflect_retry_count = 0;
        }
        if self.reflect_retry_count >= REFLECT_RETRY_ESCAPE_VALVE {
            self.rounds_without_todo = 0;
            self.file_writes_since_reflect = 0;
        }
    }
}

pub struct MainLoop {
    pub session: Session,
    pub llm: Arc<LlmClient>,
    pub bus: Option<Arc<MessageBus>>,
    pub background: BackgroundExecutor,
    pub tracer: Arc<Tracer>,
    pub system_prompt: String,
    /// Optional policy layer gating the reflection-pass reminder (spec
    /// §9 design note: "partially implemented; treat as an optional
    /// policy layer and not a core invariant"). Off by default.
    pub reflection_gate_enabled: bool,
    /// The lead's view of spawned teammates. Cheap to hold even when the
    /// team subsystem is not live; `spawn_teammate` is simply never
    /// called in that case.
    pub roster: TeamRoster,
    pub trackers: Option<Arc<RequestTrackers>>,
    pub board: Option<Arc<TaskBoard>>,
    pub worktrees: Option<Arc<WorktreeManager>>,
    nag: NagState,
}

impl MainLoop {
    pub fn new(
        session: Session,
        llm: Arc<LlmClient>,
        bus: Option<Arc<MessageBus>>,
        background: BackgroundExecutor,
        tracer: Arc<Tracer>,
        system_prompt: impl Into<String>,
    ) -> Self {
        MainLoop {
            session,
            llm,
            bus,
            background,
            tracer,
            system_prompt: system_prompt.into(),
            reflection_gate_enabled: false,
            roster: TeamRoster::new(),
            trackers: None,
            board: None,
            worktrees: None,
            nag: NagState::default(),
        }
    }

    pub fn with_reflection_gate(mut self, enabled: bool) -> Self {
        self.reflection_gate_enabled = enabled;
        self
    }

    /// Wire in the team/task-board/worktree subsystems. Called once the
    /// session directory layout for them exists; a `MainLoop` without
    /// this is still fully usable for plain single-agent runs.
    pub fn with_team(
        mut self,
        trackers: Arc<RequestTrackers>,
        board: Arc<TaskBoard>,
        worktrees: Arc<WorktreeManager>,
    ) -> Self {
        self.trackers = Some(trackers);
        self.board = Some(board);
        self.worktrees = Some(worktrees);
        self
    }

    /// Run one prompt-to-answer cycle over `history` (mutated in place)
    /// and return the assistant's final text.
    pub async fn run(&mut self, history: &mut Vec<Message>, prompt: &str) -> Result<String> {
        let run_id = Tracer::new_run_id();
        self.tracer.set_run_id(run_id.clone());
        let start = Instant::now();
        let mut tool_call_count = 0usize;
        let mut manual_compact_requested = false;
        self.tracer.emit("run.start", serde_json::json!({"run_id": run_id}));

        // 1. Micro-compact.
        compaction::micro_compact(history);

        // 2. Auto-compact gate.
        if compaction::estimate_tokens(history, Some(&self.llm)) > compaction::THRESHOLD {
            let transcript_path = self.session.transcript_path();
            *history = compaction::auto_compact(history, &self.llm, &transcript_path).await?;
            self.tracer.emit("compaction", serde_json::json!({"kind": "auto"}));
        }

        // 3. Inbox injection (only if the team subsystem is live).
        if self.session.team_is_live() {
            if let Some(bus) = &self.bus {
                let inbox = bus.read_inbox("lead")?;
                if !inbox.is_empty() && !history.is_empty() {
                    history.push(Message::user_text(format!(
                        "<inbox>{}</inbox>",
                        serde_json::to_string(&inbox)?
                    )));
                    history.push(Message::assistant_text("Acknowledged inbox messages."));
                }
            }
        }

        // 4. Background drain.
        self.drain_background_into(history);

        // 5. Nag injection.
        if self.nag.rounds_without_todo >= ROUNDS_WITHOUT_TODO_THRESHOLD {
            history.push(Message::user_text(
                "Reminder: update your todo list with TodoWrite to reflect current progress.",
            ));
        }
        if self.reflection_gate_enabled && self.nag.file_writes_since_reflect >= 1 {
            let mut reminder = "You have written files without running a reflection pass. \
                Call Task(subagent_type='Reflect') before concluding."
                .to_string();
            if self.nag.reflect_retry_count >= 1 {
                reminder.push_str(
                    " The previous reflection returned NEEDS_REVISION; address its feedback directly.",
                );
            }
            history.push(Message::user_text(reminder));
        }

        history.push(Message::user_text(prompt));

        let tool_specs = self.full_tool_set();
        let mut final_text = String::new();

        // 6. ReAct stream (non-streaming chat() per turn).
        for _turn in 0..MAX_TURNS {
            let response = self.llm.chat(&self.system_prompt, history, &tool_specs).await?;
            self.tracer.emit("llm.turn", serde_json::json!({"has_tool_calls": response.has_tool_calls()}));

            if !response.has_tool_calls() {
                final_text = response.text();
                break;
            }

            let calls: Vec<_> = response
                .content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolCall(tc) => Some(tc.clone()),
                    _ => None,
                })
                .collect();
            history.push(Message::Assistant { content: response.content.clone() });

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                self.tracer.emit("tool.call", serde_json::json!({"name": call.name, "call_id": call.id}));
                let outcome = self.dispatch(&call.name, &call.args).await;
                tool_call_count += 1;

                let (result, content_for_counters) = match outcome {
                    Ok(text) => (ToolResult::ok(call.id.clone(), text.clone()), text),
                    Err(e) => {
                        let msg = format!("Error: {e}");
                        (ToolResult::error(call.id.clone(), e), msg)
                    }
                };
                self.tracer.emit(
                    "tool.result",
                    serde_json::json!({"call_id": call.id, "is_error": result.is_error}),
                );

                if call.name == registry::TASK_TOOL_NAME && is_reflect_call(&call.args) {
                    self.nag.on_reflect_result(&content_for_counters);
                } else {
                    self.nag.on_tool_result(&call.name);
                }
                if call.name == "compact" {
                    manual_compact_requested = true;
                }

                results.push(result);
            }
            history.push(Message::tool_result_for(results));

            // Same-turn background drain, per spec §9: "before each LLM
            // invocation", applied after every tool batch too.
            self.drain_background_into(history);
        }

        // 7. Empty-content fallback.
        if final_text.is_empty() {
            let summary = condensed_tool_summary(history);
            let fallback_prompt = format!(
                "Based on the tool results below, answer the original request in natural language.\n\n\
                 Request:\n{prompt}\n\nTool results:\n{summary}"
            );
            let response = self
                .llm
                .chat(&self.system_prompt, &[Message::user_text(fallback_prompt)], &[])
                .await?;
            final_text = response.text();
        }

        // 8. Persist.
        history.push(Message::assistant_text(final_text.clone()));
        session::save_history(&self.session.dir().join("main.jsonl"), history)?;

        // 9. Manual compact (the `compact` tool flips this during dispatch).
        if manual_compact_requested {
            let transcript_path = self.session.transcript_path();
            *history = compaction::auto_compact(history, &self.llm, &transcript_path).await?;
            self.tracer.emit("compaction", serde_json::json!({"kind": "manual"}));
        }

        // 10. run.start/run.end.
        self.tracer.emit(
            "run.end",
            serde_json::json!({
                "duration_ms": start.elapsed().as_millis(),
                "tool_calls": tool_call_count,
            }),
        );

        Ok(final_text)
    }

    fn full_tool_set(&self) -> Vec<ToolSpec> {
        let mut specs = registry::builtin_tool_specs();
        specs.push(ToolSpec {
            name: registry::TASK_TOOL_NAME.to_string(),
            description: task_tool::tool_description(),
            input_schema: task_tool::tool_schema(),
        });
        specs.push(ToolSpec {
            name: "compact".to_string(),
            description: "Request context compaction at the end of this turn.".to_string(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        });
        if self.bus.is_some() {
            for (name, description, schema) in team_lead_tools::tool_schemas() {
                specs.push(ToolSpec {
                    name: name.to_string(),
                    description: description.to_string(),
                    input_schema: schema,
                });
            }
        }
        if self.board.is_some() {
            for (name, description, schema) in task_board_tools::tool_schemas() {
                specs.push(ToolSpec {
                    name: name.to_string(),
                    description: description.to_string(),
                    input_schema: schema,
                });
            }
        }
        if self.worktrees.is_some() {
            for (name, description, schema) in worktree_tools::tool_schemas() {
                specs.push(ToolSpec {
                    name: name.to_string(),
                    description: description.to_string(),
                    input_schema: schema,
                });
            }
        }
        specs
    }

    fn team_lead_ctx(&self) -> Option<TeamLeadToolContext> {
        Some(TeamLeadToolContext {
            roster: self.roster.clone(),
            llm: self.llm.clone(),
            cwd: self.session.workspace_dir(),
            bus: self.bus.clone()?,
            trackers: self.trackers.clone()?,
            board: self.board.clone()?,
            background: self.background.clone(),
            tracer: self.tracer.clone(),
        })
    }

    fn drain_background_into(&self, history: &mut Vec<Message>) {
        let notifications = self.background.drain_notifications();
        if notifications.is_empty() {
            return;
        }
        let rendered: Vec<String> = notifications
            .iter()
            .map(|n| format!("[bg:{}] {}: {}", n.task_id, n.status, n.result))
            .collect();
        history.push(Message::user_text(format!(
            "<background-results>{}</background-results>",
            rendered.join("\n")
        )));
        history.push(Message::assistant_text("Acknowledged background results."));
    }

    async fn dispatch(&self, name: &str, args: &serde_json::Value) -> Result<String> {
        if name == "compact" {
            return Ok("Compaction requested; will run at the end of this turn.".to_string());
        }
        if name == registry::TASK_TOOL_NAME {
            let ctx = TaskToolContext {
                llm: self.llm.clone(),
                cwd: self.session.workspace_dir(),
                tracer: Some(self.tracer.clone()),
            };
            return task_tool::execute(args, &ctx).await;
        }
        if let Some(result) = self.dispatch_team(name, args).await {
            return result;
        }
        if let Some(board) = &self.board {
            if let Some(result) = dispatch_task_board(board, name, args) {
                return Ok(result);
            }
        }
        if let Some(worktrees) = &self.worktrees {
            if let Some(result) = dispatch_worktree(worktrees, name, args).await {
                return Ok(result);
            }
        }
        registry::dispatch_leaf(name, args, &self.session.workspace_dir()).await
    }

    async fn dispatch_team(&self, name: &str, args: &serde_json::Value) -> Option<Result<String>> {
        let ctx = self.team_lead_ctx()?;
        let out = match name {
            "spawn_teammate" => team_lead_tools::spawn_teammate(
                &ctx,
                args.get("name").and_then(|v| v.as_str()).unwrap_or(""),
                args.get("role").and_then(|v| v.as_str()).unwrap_or(""),
                args.get("prompt").and_then(|v| v.as_str()).unwrap_or(""),
            ),
            "list_teammates" => team_lead_tools::list_teammates(&ctx),
            "send_message" => team_lead_tools::send_message(
                &ctx,
                args.get("to").and_then(|v| v.as_str()).unwrap_or(""),
                args.get("content").and_then(|v| v.as_str()).unwrap_or(""),
                args.get("msg_type").and_then(|v| v.as_str()).unwrap_or("message"),
            ),
            "read_inbox" => team_lead_tools::read_inbox(&ctx),
            "broadcast" => team_lead_tools::broadcast(
                &ctx,
                args.get("content").and_then(|v| v.as_str()).unwrap_or(""),
            ),
            "shutdown_request" => team_lead_tools::shutdown_request(
                &ctx,
                args.get("teammate").and_then(|v| v.as_str()).unwrap_or(""),
            ),
            "check_shutdown_status" => team_lead_tools::check_shutdown_status(
                &ctx,
                args.get("request_id").and_then(|v| v.as_str()).unwrap_or(""),
            ),
            "plan_approval" => team_lead_tools::plan_approval(
                &ctx,
                args.get("request_id").and_then(|v| v.as_str()).unwrap_or(""),
                args.get("approve").and_then(|v| v.as_bool()).unwrap_or(false),
                args.get("feedback").and_then(|v| v.as_str()).unwrap_or(""),
            ),
            "claim_task" => team_lead_tools::claim_task(
                &ctx,
                args.get("task_id").and_then(|v| v.as_u64()).unwrap_or(0),
            ),
            _ => return None,
        };
        Some(Ok(out))
    }
}

fn dispatch_task_board(board: &Arc<TaskBoard>, name: &str, args: &serde_json::Value) -> Option<String> {
    let ctx = TaskToolsContext { board: board.clone() };
    Some(match name {
        "task_create" => task_board_tools::task_create(
            &ctx,
            args.get("subject").and_then(|v| v.as_str()).unwrap_or(""),
            args.get("description").and_then(|v| v.as_str()).unwrap_or(""),
        ),
        "task_get" => task_board_tools::task_get(&ctx, args.get("id").and_then(|v| v.as_u64()).unwrap_or(0)),
        "task_update" => task_board_tools::task_update(
            &ctx,
            args.get("id").and_then(|v| v.as_u64()).unwrap_or(0),
            args.get("status").and_then(|v| v.as_str()),
            args.get("add_blocked_by")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_u64()).collect()),
            args.get("add_blocks")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_u64()).collect()),
        ),
        "task_list" => task_board_tools::task_list(&ctx),
        _ => return None,
    })
}

async fn dispatch_worktree(
    manager: &Arc<WorktreeManager>,
    name: &str,
    args: &serde_json::Value,
) -> Option<String> {
    let ctx = WorktreeToolsContext { manager: manager.clone() };
    Some(match name {
        "worktree_create" => {
            worktree_tools::worktree_create(
                &ctx,
                args.get("name").and_then(|v| v.as_str()).unwrap_or(""),
                args.get("task_id").and_then(|v| v.as_u64()),
                args.get("base_ref").and_then(|v| v.as_str()),
            )
            .await
        }
        "worktree_list" => worktree_tools::worktree_list(&ctx),
        "worktree_status" => {
            worktree_tools::worktree_status(&ctx, args.get("name").and_then(|v| v.as_str()).unwrap_or(""))
                .await
        }
        "worktree_run" => {
            worktree_tools::worktree_run(
                &ctx,
                args.get("name").and_then(|v| v.as_str()).unwrap_or(""),
                args.get("command").and_then(|v| v.as_str()).unwrap_or(""),
            )
            .await
        }
        "worktree_remove" => {
            worktree_tools::worktree_remove(
                &ctx,
                args.get("name").and_then(|v| v.as_str()).unwrap_or(""),
                args.get("force").and_then(|v| v.as_bool()).unwrap_or(false),
                args.get("complete_task").and_then(|v| v.as_bool()).unwrap_or(false),
            )
            .await
        }
        "worktree_keep" => {
            worktree_tools::worktree_keep(&ctx, args.get("name").and_then(|v| v.as_str()).unwrap_or(""))
        }
        "worktree_events" => worktree_tools::worktree_events(
            &ctx,
            args.get("limit").and_then(|v| v.as_u64()).unwrap_or(20) as usize,
        ),
        _ => return None,
    })
}

/// A completed `Task(subagent_type ∈ {Reflect, Reflexion})` call resets
/// (or, on `NEEDS_REVISION`, increments) the reflection-gate counters
/// instead of the ordinary per-tool-result counter (spec §4.1 step 5,
/// `agent.py`'s counter reconciliation logic).
fn is_reflect_call(args: &serde_json::Value) -> bool {
    matches!(
        args.get("subagent_type").and_then(|v| v.as_str()),
        Some("Reflect") | Some("Reflexion")
    )
}

fn condensed_tool_summary(history: &[Message]) -> String {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nag_state_resets_rounds_without_todo_on_todo_write() {
        let mut nag = NagState::default();
        nag.on_tool_result("Read");
        nag.on_tool_result("Read");
        assert_eq!(nag.rounds_without_todo, 2);
        nag.on_tool_result(TODO_WRITE_TOOL);
        assert_eq!(nag.rounds_without_todo, 0);
    }

    #[test]
    fn nag_state_tracks_file_writes_since_reflect() {
        let mut nag = NagState::default();
        nag.on_tool_result("Write");
        nag.on_tool_result("Edit");
        assert_eq!(nag.file_writes_since_reflect, 2);
    }

    #[test]
    fn reflect_pass_resets_counters_unless_needs_revision() {
        let mut nag = NagState::default();
        nag.on_tool_result("Write");
        nag.on_reflect_result("Verdict: PASS");
        assert_eq!(nag.file_writes_since_reflect, 0);
        assert_eq!(nag.reflect_retry_count, 0);
    }

    #[test]
    fn reflect_needs_revision_increments_retry_count() {
        let mut nag = NagState::default();
        nag.on_tool_result("Write");
        nag.on_reflect_result("{\"verdict\": \"NEEDS_REVISION\"}");
        assert_eq!(nag.reflect_retry_count, 1);
        assert_eq!(nag.file_writes_since_reflect, 1);
    }

    #[test]
    fn reflect_retry_escape_valve_forces_counter_reset() {
        let mut nag = NagState::default();
        nag.on_tool_result("Write");
        nag.on_reflect_result("NEEDS_REVISION");
        nag.on_tool_result("Write");
        nag.on_reflect_result("NEEDS_REVISION");
        assert_eq!(nag.reflect_retry_count, 2);
        assert_eq!(nag.file_writes_since_reflect, 0);
        assert_eq!(nag.rounds_without_todo, 0);
    }
}
