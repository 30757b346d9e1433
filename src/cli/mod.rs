//! CLI surface: `run` (interactive REPL / resume / one-shot) and the
//! `status` supplement, grounded on the teacher's `main.rs` clap-derive
//! shape and `commands/status.rs`'s simple-vs-interactive split, adapted
//! to spec §6's much smaller surface (no drones, no TUI dashboard).

mod repl;
mod session_select;
mod status;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::agent::main_loop::MainLoop;
use crate::background::BackgroundExecutor;
use crate::communication::trackers::RequestTrackers;
use crate::communication::MessageBus;
use crate::config::Config;
use crate::llm::LlmClient;
use crate::session::{self, Session};
use crate::tasks::{TaskBoard, TaskStore};
use crate::worktree::WorktreeManager;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "loomctl")]
#[command(about = "Agent orchestration core: a driver that mediates between an LLM and a sandboxed workspace")]
#[command(version = VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enter the interactive REPL, resume a prior session, or answer one
    /// task and exit.
    Run {
        /// One-shot task. When given, the final answer is printed and
        /// the process exits without entering the REPL.
        task: Option<String>,
        /// Resume a session. A bare `--resume` with no value picks the
        /// newest session under `.sessions/`.
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        resume: Option<String>,
    },

    /// Print a one-shot summary of the current session's phase, worker
    /// count, and task backlog.
    Status {
        /// Non-interactive, script-friendly output.
        #[arg(short, long)]
        simple: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Run { task, resume } => run_session(cwd, task, resume).await,
        Commands::Status { simple } => status::run(&cwd, simple),
    }
}

async fn run_session(cwd: std::path::PathBuf, task: Option<String>, resume: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let llm = Arc::new(LlmClient::from_config(&config)?);

    let session = match resume {
        None => Session::new(&cwd),
        Some(key) if key.is_empty() => {
            let keys = Session::list_keys(&cwd);
            let Some(newest) = keys.into_iter().next() else {
                eprintln!("Error: no prior sessions to resume under {}", cwd.join(".sessions").display());
                std::process::exit(1);
            };
            Session::with_key(&cwd, newest)
        }
        Some(key) => {
            if !Session::list_keys(&cwd).contains(&key) {
                eprintln!("Error: unknown session key '{key}'");
                std::process::exit(1);
            }
            Session::with_key(&cwd, key)
        }
    };
    session.ensure_dir()?;

    let tracer = Arc::new(crate::session::tracer::Tracer::new(session.trace_path()));
    let background = BackgroundExecutor::new().with_tracer(tracer.clone());

    let tasks = Arc::new(TaskStore::new(session.tasks_dir()).with_tracer(tracer.clone()));
    let board = Arc::new(TaskBoard::new(session.board_dir()).with_tracer(tracer.clone()));
    let bus = Arc::new(MessageBus::new(session.team_inbox_dir()));
    let trackers = Arc::new(RequestTrackers::new());
    let worktrees = Arc::new(WorktreeManager::new(&cwd, tasks)?.with_tracer(tracer.clone()));

    let system_prompt = "You are the lead agent of an orchestration session. \
        Use your tools to read, write, and run code in the workspace, spawn teammates \
        for independent streams of work, and track progress on the shared task board."
        .to_string();

    let mut main_loop = MainLoop::new(
        session.clone(),
        llm,
        Some(bus.clone()),
        background,
        tracer,
        system_prompt,
    )
    .with_team(trackers.clone(), board.clone(), worktrees.clone());

    let mut history = session::load_history(&session.dir().join("main.jsonl"));

    if let Some(task) = task {
        let answer = main_loop.run(&mut history, &task).await?;
        println!("{answer}");
        return Ok(());
    }

    repl::run(&mut main_loop, &mut history, bus, board, worktrees).await
}
