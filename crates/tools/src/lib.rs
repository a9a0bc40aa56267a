//! Command execution and process management tools for deskcmd.
//!
//! - `execute_command`: run a shell command, wait a bounded time, hand back
//!   a session id for anything still running
//! - `read_output` / `force_terminate` / `list_sessions` / `prune_sessions`:
//!   operate on those sessions
//! - `list_processes` / `kill_process`: the OS-wide process table

pub mod buffer;
pub mod directory;
pub mod error;
pub mod exec;
pub mod handle;
pub mod manager;
pub mod process;
pub mod tool;

pub use error::{Result, ToolError};
pub use manager::ProcessManager;
