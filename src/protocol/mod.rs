//! FTP protocol implementation
//!
//! Command parsing, reply formatting, and the dispatch table routing each
//! parsed command to its handler.

pub mod commands;
pub mod handlers;
pub mod replies;

pub use commands::Command;
pub use handlers::{Flow, handle_command};
pub use replies::Reply;
