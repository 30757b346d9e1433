//! Interactive REPL: reads lines from stdin, dispatches slash-commands
//! locally, and otherwise hands the line to the Main Loop as a prompt.
//!
//! Grounded on the teacher's `main.rs` dispatch-and-print style and
//! `commands/status.rs`'s dim-status-line convention; Ctrl-C/Ctrl-D
//! handling follows spec §6's "Exit: Ctrl-C, Ctrl-D, exit, quit, q" with
//! both exit codes mapped to a clean 0.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;

use crate::agent::main_loop::MainLoop;
use crate::communication::MessageBus;
use crate::session;
use crate::tasks::TaskBoard;
use crate::types::Message;
use crate::worktree::WorktreeManager;

use super::session_select;

pub async fn run(
    main_loop: &mut MainLoop,
    history: &mut Vec<Message>,
    bus: Arc<MessageBus>,
    board: Arc<TaskBoard>,
    worktrees: Arc<WorktreeManager>,
) -> Result<()> {
    println!(
        "{} session {}",
        "loomctl".bold(),
        main_loop.session.key.dimmed()
    );
    println!("{}", "Type a task, or /compact /tasks /team /inbox /sessions /board /worktrees /events. Ctrl-D to exit.".dimmed());

    loop {
        print!("{} ", ">".cyan());
        io::stdout().flush().ok();

        let line = tokio::select! {
            line = read_line() => line,
            _ = tokio::signal::ctrl_c() => {
                println!();
                return Ok(());
            }
        };

        let Some(line) = line? else {
            println!();
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "exit" | "quit" | "q" => return Ok(()),
            "/compact" => {
                let transcript_path = main_loop.session.transcript_path();
                *history = crate::compaction::auto_compact(history, &main_loop.llm, &transcript_path).await?;
                println!("{}", "Compacted.".dimmed());
            }
            "/tasks" => println!("{}", board.store().list_all().unwrap_or_else(|e| format!("Error: {e}"))),
            "/board" => println!("{}", render_board(&board)),
            "/team" => println!("{}", main_loop.roster.list_all()),
            "/inbox" => match bus.read_inbox("lead") {
                Ok(messages) => println!("{}", serde_json::to_string_pretty(&messages).unwrap_or_default()),
                Err(e) => println!("Error: {e}"),
            },
            "/worktrees" => println!("{}", worktrees.list_all().unwrap_or_else(|e| format!("Error: {e}"))),
            "/events" => println!("{}", worktrees.events().list_recent(20)),
            "/sessions" => {
                if let Some(new_session) = session_select::prompt(&main_loop.session)? {
                    main_loop.session = new_session;
                    main_loop.session.ensure_dir()?;
                    *history = session::load_history(&main_loop.session.dir().join("main.jsonl"));
                    println!("{} {}", "Switched to session".dimmed(), main_loop.session.key);
                }
            }
            prompt => match main_loop.run(history, prompt).await {
                Ok(answer) => println!("{answer}"),
                Err(e) => println!("{} {e}", "Error:".red()),
            },
        }
    }
}

async fn read_line() -> Result<Option<String>> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let n = io::stdin().lock().read_line(&mut line)?;
        Ok(if n == 0 { None } else { Some(line) })
    })
    .await?
}

fn render_board(board: &TaskBoard) -> String {
    match board.scan_unclaimed() {
        Ok(tasks) if tasks.is_empty() => "No unclaimed tasks.".to_string(),
        Ok(tasks) => tasks
            .iter()
            .map(|t| format!("#{}: {}", t.id, t.subject))
            .collect::<Vec<_>>()
            .join("\n"),
        Err(e) => format!("Error: {e}"),
    }
}
