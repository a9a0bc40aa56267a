//! HTTP gateway and CLI for deskcmd.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod state;
