//! Error types
//!
//! Defines the command-failure taxonomy of the server and its central
//! mapping onto FTP reply codes. Every non-fatal failure becomes a reply
//! on the control channel; only `Transport` tears the session down.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use log::{error, info, warn};

use crate::protocol::Reply;
use crate::protocol::replies;

/// Failure raised while handling a single command.
#[derive(Debug)]
pub enum CommandError {
    /// Command requires authentication and the session has none.
    NotLoggedIn,
    /// Transfer command issued without an open passive channel.
    NoDataChannel,
    /// Named file or path does not exist in the store.
    NotFound(String),
    /// File content diverges from its recorded digest.
    IntegrityViolation(String),
    /// Verb is recognized nowhere in the dispatch table.
    NotImplemented(String),
    /// Verb is known but its argument is not supported.
    BadParameter(String),
    /// Passive listener could not be bound or accepted no connection.
    DataChannel(io::Error),
    /// Store enumeration or file access failed mid-command.
    Storage(io::Error),
    /// The data connection broke during a transfer.
    Transfer(io::Error),
    /// The control connection itself failed; fatal to the session.
    Transport(io::Error),
}

impl CommandError {
    /// Maps the failure to the reply sent on the control channel.
    ///
    /// `Transport` never reaches a client; the session ends instead. The
    /// reply produced for it here is only a fallback.
    pub fn reply(&self) -> Reply {
        match self {
            CommandError::NotLoggedIn => Reply::new(replies::NOT_LOGGED_IN, "Not logged in."),
            CommandError::NoDataChannel => {
                Reply::new(replies::CANT_OPEN_DATA_CONNECTION, "Use PASV first.")
            }
            CommandError::NotFound(name) => {
                Reply::new(replies::FILE_UNAVAILABLE, format!("{name}: not found."))
            }
            CommandError::IntegrityViolation(name) => Reply::new(
                replies::FILE_UNAVAILABLE,
                format!("{name}: integrity check failed."),
            ),
            CommandError::NotImplemented(_) => {
                Reply::new(replies::NOT_IMPLEMENTED, "Command not implemented.")
            }
            CommandError::BadParameter(_) => Reply::new(
                replies::BAD_PARAMETER,
                "Command not implemented for that parameter.",
            ),
            CommandError::DataChannel(_) => Reply::new(
                replies::CANT_OPEN_DATA_CONNECTION,
                "Can't open data connection.",
            ),
            CommandError::Storage(_) | CommandError::Transfer(_) | CommandError::Transport(_) => {
                Reply::new(
                    replies::TRANSFER_ABORTED,
                    "Requested action aborted: local error in processing.",
                )
            }
        }
    }

    /// Logs the failure at the level its class warrants.
    ///
    /// Integrity violations and transport faults are alerts; everything
    /// else is routine session noise.
    pub fn log(&self, peer: SocketAddr) {
        match self {
            CommandError::IntegrityViolation(name) => {
                error!("ALERT: refused transfer of tampered file {name} to {peer}");
            }
            CommandError::Transport(e) => {
                error!("ALERT: control connection to {peer} failed: {e}");
            }
            CommandError::Transfer(e) => warn!("data transfer with {peer} failed: {e}"),
            CommandError::Storage(e) => warn!("storage access failed for {peer}: {e}"),
            CommandError::DataChannel(e) => warn!("data channel for {peer} unavailable: {e}"),
            CommandError::NotImplemented(verb) => info!("unsupported command from {peer}: {verb}"),
            CommandError::BadParameter(arg) => info!("unsupported parameter from {peer}: {arg}"),
            CommandError::NotLoggedIn => info!("rejected pre-login command from {peer}"),
            CommandError::NoDataChannel => info!("transfer command from {peer} without PASV"),
            CommandError::NotFound(name) => info!("{peer} referenced missing file {name}"),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::NotLoggedIn => write!(f, "not logged in"),
            CommandError::NoDataChannel => write!(f, "no data channel open"),
            CommandError::NotFound(name) => write!(f, "not found: {name}"),
            CommandError::IntegrityViolation(name) => {
                write!(f, "integrity violation: {name}")
            }
            CommandError::NotImplemented(verb) => write!(f, "not implemented: {verb}"),
            CommandError::BadParameter(arg) => write!(f, "bad parameter: {arg}"),
            CommandError::DataChannel(e) => write!(f, "data channel error: {e}"),
            CommandError::Storage(e) => write!(f, "storage error: {e}"),
            CommandError::Transfer(e) => write!(f, "transfer error: {e}"),
            CommandError::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::DataChannel(e)
            | CommandError::Storage(e)
            | CommandError::Transfer(e)
            | CommandError::Transport(e) => Some(e),
            _ => None,
        }
    }
}
