//! Teammate Loop: a long-lived named agent running concurrently with
//! the Main Loop, cycling through working/idle/shutdown phases with
//! inbox-driven and auto-claim-driven work-seeking.
//!
//! Grounded 1:1 on `original_source/backend/app/team/teammate_manager.py`'s
//! `_loop` (working phase turn cap, idle-phase tick budget draining
//! inbox before the board, identity-preamble injection on first
//! auto-claim, shutdown terminality), re-architected per spec §9's
//! "cooperative scheduling via threads and file IPC → structured
//! concurrency" note onto `tokio::spawn` instead of a daemon thread.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::background::BackgroundExecutor;
use crate::communication::trackers::RequestTrackers;
use crate::communication::MessageBus;
use crate::llm::LlmClient;
use crate::session::tracer::Tracer;
use crate::tasks::TaskBoard;
use crate::tools::quality_gate::{self, GateResult};
use crate::tools::registry;
use crate::tools::teammate_tools::{self, TeammateToolContext};
use crate::tools::worker_notes::{self, WorkerNote};
use crate::types::{ContentBlock, Message, TeammateStatus, ToolResult};
use std::path::PathBuf;

const DEFAULT_WORK_TURN_CAP: usize = 50;
const IDLE_TOOL_NAME: &str = "idle";
const CLAIM_TASK_TOOL_NAME: &str = "claim_task";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Working,
    Idle,
    Shutdown,
}

pub struct Teammate {
    pub name: String,
    pub role: String,
    pub llm: Arc<LlmClient>,
    pub cwd: PathBuf,
    pub bus: Arc<MessageBus>,
    pub trackers: Arc<RequestTrackers>,
    pub board: Arc<TaskBoard>,
    pub background: BackgroundExecutor,
    pub tracer: Arc<Tracer>,
    pub work_turn_cap: usize,
    pub idle_timeout: Duration,
    pub poll_interval: Duration,
    initial_task: Option<String>,
    status: Arc<Mutex<TeammateStatus>>,
    /// The board task this teammate last auto-claimed, if any, cleared
    /// once its completion has been gated and noted.
    current_task: Mutex<Option<u64>>,
}

impl Teammate {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        llm: Arc<LlmClient>,
        cwd: PathBuf,
        bus: Arc<MessageBus>,
        trackers: Arc<RequestTrackers>,
        board: Arc<TaskBoard>,
        background: BackgroundExecutor,
        tracer: Arc<Tracer>,
    ) -> Self {
        Teammate {
            name: name.into(),
            role: role.into(),
            llm,
            cwd,
            bus,
            trackers,
            board,
            background,
            tracer,
            work_turn_cap: DEFAULT_WORK_TURN_CAP,
            idle_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(5),
            initial_task: None,
            status: Arc::new(Mutex::new(TeammateStatus::Working)),
            current_task: Mutex::new(None),
        }
    }

    /// Seed the teammate's first turn with a task prompt, as if the lead
    /// had just sent it (used by `spawn_teammate`).
    pub fn with_initial_task(mut self, task: impl Into<String>) -> Self {
        self.initial_task = Some(task.into());
        self
    }

    /// A handle the roster can poll for this teammate's current phase
    /// without waiting on its join handle.
    pub fn status_handle(&self) -> Arc<Mutex<TeammateStatus>> {
        self.status.clone()
    }

    fn set_status(&self, status: TeammateStatus) {
        *self.status.lock().unwrap() = status;
    }

    fn tool_ctx(&self) -> TeammateToolContext {
        TeammateToolContext {
            name: self.name.clone(),
            bus: self.bus.clone(),
            trackers: self.trackers.clone(),
            board: self.board.clone(),
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are '{}', a teammate with role: {}. \
             Use send_message/read_inbox to coordinate, claim_task to take on board work, \
             and call idle when you have nothing left to do.",
            self.name, self.role
        )
    }

    fn tool_specs(&self) -> Vec<crate::llm::ToolSpec> {
        let mut specs = registry::builtin_tool_specs();
        for (name, description, schema) in teammate_tools::tool_schemas() {
            specs.push(crate::llm::ToolSpec {
                name: name.to_string(),
                description: description.to_string(),
                input_schema: schema,
            });
        }
        specs
    }

    /// The shared per-session notes file, the generic equivalent of the
    /// teacher's per-drone `worker-notes.json` directory.
    fn lane_dir(&self) -> PathBuf {
        self.board.notes_dir()
    }

    /// Run the quality gate (if the working directory's project type is
    /// recognised) against the task this teammate just auto-claimed, then
    /// append a worker note on acceptance. On gate failure/timeout, push a
    /// continuation message into history and resume working instead of
    /// going idle — mirrors the Worker's reject-and-reinject completion
    /// path, adapted to the teammate's turn-capped working phase (one
    /// retry per return to `run_working`, rather than the Worker's own
    /// bounded iteration loop).
    async fn finish_current_task(&self, history: &mut Vec<Message>) -> Phase {
        let Some(task_id) = self.current_task.lock().unwrap().take() else {
            return Phase::Idle;
        };
        let Ok(task) = self.board.store().get(task_id) else {
            return Phase::Idle;
        };

        let cwd = if task.worktree.is_empty() {
            self.cwd.clone()
        } else {
            PathBuf::from(&task.worktree)
        };

        let gate_config = quality_gate::build_gate_config(&quality_gate::detect_project_languages(&cwd), &cwd);
        if let Some(gc) = &gate_config {
            match quality_gate::run_quality_gate(gc).await {
                GateResult::Passed => {}
                GateResult::Failed { output } => {
                    *self.current_task.lock().unwrap() = Some(task_id);
                    history.push(Message::user_text(format!(
                        "Task #{task_id} failed verification:\n\n{output}\n\nFix the issues and continue."
                    )));
                    return Phase::Working;
                }
                GateResult::Timeout => {
                    *self.current_task.lock().unwrap() = Some(task_id);
                    history.push(Message::user_text(format!(
                        "Task #{task_id}'s verification timed out. Try a narrower, faster approach."
                    )));
                    return Phase::Working;
                }
            }
        }

        let files_changed = worker_notes::detect_files_changed(&cwd).await;
        let summary = history
            .iter()
            .rev()
            .find_map(|m| match m {
                Message::Assistant { content } => content.iter().find_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.clone()),
                    _ => None,
                }),
                _ => None,
            })
            .unwrap_or_default();
        let note = WorkerNote {
            task_id,
            task_title: task.subject.clone(),
            files_changed,
            summary,
        };
        let _ = worker_notes::append_note(&self.lane_dir(), &note);

        Phase::Idle
    }

    /// Run the working/idle/shutdown state machine to completion. The
    /// returned future is meant to be handed to `tokio::spawn` by the
    /// caller that owns the team roster.
    pub async fn run(mut self) {
        self.tracer.emit("teammate.spawn", serde_json::json!({"name": self.name, "role": self.role}));

        let mut history: Vec<Message> = Vec::new();
        let mut phase = Phase::Working;
        let mut identity_injected = false;

        if let Some(task) = self.initial_task.take() {
            history.push(Message::user_text(self.identity_preamble()));
            history.push(Message::user_text(task));
            identity_injected = true;
        }

        loop {
            self.set_status(match phase {
                Phase::Working => TeammateStatus::Working,
                Phase::Idle => TeammateStatus::Idle,
                Phase::Shutdown => TeammateStatus::Shutdown,
            });
            phase = match phase {
                Phase::Working => self.run_working(&mut history, &mut identity_injected).await,
                Phase::Idle => self.run_idle(&mut history, &mut identity_injected).await,
                Phase::Shutdown => {
                    self.tracer.emit("teammate.shutdown", serde_json::json!({"name": self.name}));
                    break;
                }
            };
        }
    }

    /// Drain own inbox first (a `shutdown_request` terminates immediately);
    /// otherwise run a bounded ReAct batch until the model calls `idle`,
    /// returns no tool calls, or the turn cap is hit.
    async fn run_working(&self, history: &mut Vec<Message>, identity_injected: &mut bool) -> Phase {
        if let Ok(messages) = self.bus.read_inbox(&self.name) {
            for msg in &messages {
                if msg.msg_type == crate::types::InboxMsgType::ShutdownRequest {
                    return Phase::Shutdown;
                }
            }
            if !messages.is_empty() {
                history.push(Message::user_text(format!(
                    "<inbox>{}</inbox>",
                    serde_json::to_string(&messages).unwrap_or_default()
                )));
            }
        }

        if !*identity_injected {
            history.insert(0, Message::user_text(self.identity_preamble()));
            *identity_injected = true;
        }

        let tool_specs = self.tool_specs();
        let system_prompt = self.system_prompt();

        for _turn in 0..self.work_turn_cap {
            let response = match self.llm.chat(&system_prompt, history, &tool_specs).await {
                Ok(r) => r,
                Err(e) => {
                    self.tracer.emit("teammate.error", serde_json::json!({"name": self.name, "error": e.to_string()}));
                    return Phase::Idle;
                }
            };

            if !response.has_tool_calls() {
                let text = response.text();
                if !text.is_empty() {
                    history.push(Message::assistant_text(text));
                }
                return self.finish_current_task(history).await;
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
            let mut went_idle = false;
            for call in &calls {
                let outcome = self.dispatch(&call.name, &call.args).await;
                results.push(match outcome {
                    Ok(text) => ToolResult::ok(call.id.clone(), text),
                    Err(e) => ToolResult::error(call.id.clone(), e),
                });
                if call.name == IDLE_TOOL_NAME {
                    went_idle = true;
                }
            }
            history.push(Message::tool_result_for(results));

            let bg = self.background.drain_notifications();
            if !bg.is_empty() {
                let rendered: Vec<String> = bg
                    .iter()
                    .map(|n| format!("[bg:{}] {}: {}", n.task_id, n.status, n.result))
                    .collect();
                history.push(Message::user_text(format!(
                    "<background-results>{}</background-results>",
                    rendered.join("\n")
                )));
            }

            if went_idle {
                return self.finish_current_task(history).await;
            }
        }

        Phase::Idle
    }

    /// Poll up to `idle_timeout / poll_interval` ticks. Inbox drain wins
    /// over board scanning; a found task is claimed atomically and a
    /// synthetic auto-claimed message re-establishes identity if the
    /// history is still minimal.
    async fn run_idle(&self, history: &mut Vec<Message>, identity_injected: &mut bool) -> Phase {
        self.tracer.emit("teammate.idle", serde_json::json!({"name": self.name}));
        let ticks = (self.idle_timeout.as_secs_f64() / self.poll_interval.as_secs_f64()).ceil() as u64;

        for _tick in 0..ticks.max(1) {
            tokio::time::sleep(self.poll_interval).await;

            if let Ok(messages) = self.bus.read_inbox(&self.name) {
                if !messages.is_empty() {
                    history.push(Message::user_text(format!(
                        "<inbox>{}</inbox>",
                        serde_json::to_string(&messages).unwrap_or_default()
                    )));
                    return Phase::Working;
                }
            }

            if let Ok(unclaimed) = self.board.scan_unclaimed() {
                for task in unclaimed {
                    if matches!(self.board.claim_task(task.id, &self.name), Ok(Ok(()))) {
                        if history.len() < 2 && !*identity_injected {
                            history.push(Message::user_text(self.identity_preamble()));
                            *identity_injected = true;
                        }
                        let notes_section = if !task.blocked_by.is_empty() {
                            let lane_dir = self.lane_dir();
                            let dep_notes =
                                worker_notes::read_dependency_notes(&lane_dir, &task.blocked_by);
                            worker_notes::format_notes_for_prompt(&dep_notes)
                        } else {
                            String::new()
                        };
                        history.push(Message::user_text(format!(
                            "Auto-claimed task #{}: {}. Continue working on it.{notes_section}",
                            task.id, task.subject
                        )));
                        self.tracer.emit(
                            "teammate.auto_claim",
                            serde_json::json!({"name": self.name, "task_id": task.id}),
                        );
                        *self.current_task.lock().unwrap() = Some(task.id);
                        return Phase::Working;
                    }
                }
            }
        }

        Phase::Shutdown
    }

    fn identity_preamble(&self) -> String {
        format!(
            "You are '{}' on this team, role: {}. Continue the work below.",
            self.name, self.role
        )
    }

    async fn dispatch(&self, name: &str, args: &serde_json::Value) -> anyhow::Result<String> {
        let ctx = self.tool_ctx();
        match name {
            "send_message" => {
                let to = args.get("to").and_then(|v| v.as_str()).unwrap_or("");
                let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");
                let msg_type = args.get("msg_type").and_then(|v| v.as_str()).unwrap_or("message");
                Ok(teammate_tools::send_message(&ctx, to, content, msg_type))
            }
            "read_inbox" => Ok(teammate_tools::read_inbox(&ctx)),
            "shutdown_response" => {
                let request_id = args.get("request_id").and_then(|v| v.as_str()).unwrap_or("");
                let approve = args.get("approve").and_then(|v| v.as_bool()).unwrap_or(false);
                Ok(teammate_tools::shutdown_response(&ctx, request_id, approve))
            }
            "plan_approval" => {
                let plan = args.get("plan").and_then(|v| v.as_str()).unwrap_or("");
                Ok(teammate_tools::plan_approval(&ctx, plan))
            }
            IDLE_TOOL_NAME => Ok(teammate_tools::idle()),
            CLAIM_TASK_TOOL_NAME => {
                let task_id = args.get("task_id").and_then(|v| v.as_u64()).unwrap_or(0);
                teammate_tools::claim_task(&ctx, task_id)
            }
            other => registry::dispatch_leaf(other, args, &self.cwd).await,
        }
    }
}
