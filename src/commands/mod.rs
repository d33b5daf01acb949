//! Command Handler Module
//!
//! This module implements the line-command layer for kayvee.
//! It parses text lines into commands, executes them against the store,
//! and returns replies for the caller to print.
//!
//! ## Architecture
//!
//! ```text
//! Input line
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ Command::parse  │  (validate verb and arity)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (execute, build Reply)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Store       │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `SET`, `GET`, `DEL`
//! - `OUT`, `STOP`

pub mod handler;

// Re-export the main command types
pub use handler::{Command, CommandError, CommandHandler, Reply};
