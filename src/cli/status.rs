//! The `status` subcommand: a one-shot snapshot of the most recent
//! session, grounded on the teacher's `commands/status.rs` `run_simple`
//! split (the TUI/sparkline half has no counterpart here).

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::session::Session;
use crate::tasks::TaskBoard;

pub fn run(cwd: &Path, simple: bool) -> Result<()> {
    let keys = Session::list_keys(cwd);
    let Some(key) = keys.into_iter().next() else {
        if simple {
            println!("no_session");
        } else {
            println!("{}", "No sessions yet.".dimmed());
        }
        return Ok(());
    };

    let session = Session::with_key(cwd, key);
    let board = TaskBoard::new(session.board_dir());
    let (pending, in_progress, completed) = task_counts(&board)?;
    let teammates = count_teammates(&session)?;

    if simple {
        println!(
            "session={} teammates={} pending={} in_progress={} completed={}",
            session.key, teammates, pending, in_progress, completed
        );
        return Ok(());
    }

    println!("{} {}", "Session:".bold(), session.key);
    println!("{} {}", "Teammates:".bold(), teammates);
    println!(
        "{} {} pending, {} in progress, {} completed",
        "Tasks:".bold(),
        pending,
        in_progress,
        completed
    );
    Ok(())
}

fn task_counts(board: &TaskBoard) -> Result<(usize, usize, usize)> {
    let text = board.store().list_all()?;
    if text == "No tasks." {
        return Ok((0, 0, 0));
    }
    let mut pending = 0;
    let mut in_progress = 0;
    let mut completed = 0;
    for line in text.lines() {
        if line.starts_with("[x]") {
            completed += 1;
        } else if line.starts_with("[>]") {
            in_progress += 1;
        } else if line.starts_with("[ ]") {
            pending += 1;
        }
    }
    Ok((pending, in_progress, completed))
}

fn count_teammates(session: &Session) -> Result<usize> {
    let dir = session.team_inbox_dir();
    if !dir.exists() {
        return Ok(0);
    }
    let count = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.ends_with(".jsonl") && n != "lead.jsonl")
                .unwrap_or(false)
        })
        .count();
    Ok(count)
}
