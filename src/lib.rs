//! loomctl - an agent orchestration core: a driver that mediates between
//! an LLM and a sandboxed workspace, spawning teammates onto independent
//! git worktrees and coordinating them through a shared task board.
//!
//! # Modules
//!
//! - `agent`: the Main Loop, teammates, and the in-process team roster
//! - `background`: detached shell job execution and polling
//! - `cli`: the `loomctl` command surface (REPL, resume, status)
//! - `communication`: the inter-agent message bus and request trackers
//! - `compaction`: history summarisation when a session nears its context budget
//! - `config`: configuration file handling and management
//! - `llm`: the LLM client abstraction and its backends
//! - `session`: per-run directory layout and execution tracing
//! - `tasks`: the task store and task board
//! - `tools`: the tool registry and every tool implementation
//! - `types`: shared wire types
//! - `worktree`: git worktree lifecycle management

pub mod agent;
pub mod background;
pub mod cli;
pub mod communication;
pub mod compaction;
pub mod config;
pub mod llm;
pub mod session;
pub mod tasks;
pub mod tools;
pub mod types;
pub mod worktree;
