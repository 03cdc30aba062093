//! Server core
//!
//! The control listener and the one-at-a-time session accept loop.

pub mod core;

pub use core::Server;
