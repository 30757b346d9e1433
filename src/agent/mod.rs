//! Agent orchestration core: the Main Loop, the Sub-Agent Driver
//! (ReAct/OODA), and the Teammate Loop.

pub mod main_loop;
pub mod roster;
pub mod subagent;
pub mod teammate;
