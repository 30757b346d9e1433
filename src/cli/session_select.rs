//! The `/sessions` slash-command: a `dialoguer::Select` prompt over
//! `.sessions/`, grounded on the teacher's `commands/start.rs` pattern
//! for resolving multiple PRD candidates via `Select`.

use anyhow::Result;
use dialoguer::Select;

use crate::session::Session;

/// Prompt to switch sessions. Returns `None` if the user cancels or
/// there is nothing to switch to.
pub fn prompt(current: &Session) -> Result<Option<Session>> {
    let keys = Session::list_keys(&current.root);
    if keys.is_empty() {
        println!("No other sessions.");
        return Ok(None);
    }

    let selection = Select::new()
        .with_prompt("Switch session")
        .items(&keys)
        .default(0)
        .interact_opt()?;

    Ok(selection.map(|i| Session::with_key(&current.root, keys[i].clone())))
}
