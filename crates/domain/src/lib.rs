//! Shared configuration and error types for the deskcmd crates.

pub mod config;
pub mod error;
pub mod tool;

pub use error::{Error, Result};
