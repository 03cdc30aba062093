//! Session management
//!
//! One `Session` per control connection: authentication state, the live
//! passive channel (at most one), and the command loop that reads a
//! line, parses it, dispatches it, and writes the reply. The loop only
//! ends on QUIT, on the client closing the stream, or on a transport
//! failure; per-command failures are answered and survived.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::{error, info};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;

use crate::config::ServerConfig;
use crate::integrity::IntegrityGate;
use crate::protocol::{Command, Flow, Reply, handle_command, replies};
use crate::storage::FileStore;
use crate::transfer::PassiveChannel;

/// Longest accepted control line, terminator included.
const MAX_LINE_LENGTH: usize = 512;

/// Collaborators shared by every session of a server instance.
pub struct SessionContext {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn FileStore>,
    pub gate: Arc<IntegrityGate>,
}

/// Per-connection protocol state.
pub struct Session {
    peer: SocketAddr,
    local_ip: IpAddr,
    authenticated: bool,
    pending_user: Option<String>,
    data_channel: Option<PassiveChannel>,
}

impl Session {
    pub fn new(peer: SocketAddr, local_ip: IpAddr) -> Self {
        Self {
            peer,
            local_ip,
            authenticated: false,
            pending_user: None,
            data_channel: None,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Address the client reached us on; advertised in PASV replies
    /// unless the configuration overrides it.
    pub fn local_ip(&self) -> IpAddr {
        self.local_ip
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    /// Username offered by USER, consumed by the next PASS.
    pub fn take_pending_user(&mut self) -> Option<String> {
        self.pending_user.take()
    }

    pub fn set_pending_user(&mut self, user: String) {
        self.pending_user = Some(user);
    }

    /// Tears down any live passive channel. Close errors are ignored.
    pub fn close_data_channel(&mut self) {
        if let Some(mut old) = self.data_channel.take() {
            info!("discarding live passive channel for {}", self.peer);
            old.close();
        }
    }

    /// Installs a freshly opened passive channel.
    pub fn set_data_channel(&mut self, channel: PassiveChannel) {
        self.data_channel = Some(channel);
    }

    /// Hands the live channel to a transfer command; the channel is gone
    /// from the session whether the transfer succeeds or not.
    pub fn take_data_channel(&mut self) -> Option<PassiveChannel> {
        self.data_channel.take()
    }

    #[cfg(test)]
    pub fn has_data_channel(&self) -> bool {
        self.data_channel.is_some()
    }
}

/// Write half of the control connection.
pub struct ControlWriter {
    half: OwnedWriteHalf,
}

impl ControlWriter {
    pub fn new(half: OwnedWriteHalf) -> Self {
        Self { half }
    }

    pub async fn send(&mut self, reply: &Reply) -> io::Result<()> {
        self.half.write_all(reply.line().as_bytes()).await?;
        self.half.flush().await
    }
}

/// Runs one control connection to completion.
///
/// Returns `Err` only for transport failures on the control socket; a
/// clean QUIT or client disconnect returns `Ok`.
pub async fn handle_session(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: &SessionContext,
) -> io::Result<()> {
    let local_ip = stream.local_addr()?.ip();
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut control = ControlWriter::new(write_half);
    let mut session = Session::new(peer, local_ip);

    control
        .send(&Reply::new(replies::READY, "Vigil FTP service ready."))
        .await?;

    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            info!("connection closed by {peer}");
            return Ok(());
        }
        if n > MAX_LINE_LENGTH {
            control
                .send(&Reply::new(replies::NOT_IMPLEMENTED, "Command line too long."))
                .await?;
            continue;
        }

        let line = decode_line(&buf);
        let command = Command::parse(&line);
        info!("{peer} -> {command}");

        match handle_command(&mut session, &command, &mut control, ctx).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => {
                info!("session with {peer} ended by QUIT");
                return Ok(());
            }
            Err(e) => {
                error!("ALERT: control channel to {peer} failed: {e}");
                return Err(e);
            }
        }
    }
}

/// Permissive line decoding: invalid byte sequences are dropped, the
/// line terminator is stripped, the command survives.
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect::<String>()
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
