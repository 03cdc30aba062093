//! Control listener and accept loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::integrity::IntegrityGate;
use crate::session::{SessionContext, handle_session};
use crate::storage::FileStore;

pub struct Server {
    listener: TcpListener,
    ctx: SessionContext,
}

impl Server {
    /// Binds the control listener and assembles the session context.
    pub async fn bind(
        config: Arc<ServerConfig>,
        store: Arc<dyn FileStore>,
        gate: Arc<IntegrityGate>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(config.control_socket()).await?;
        info!("control listener bound to {}", listener.local_addr()?);
        Ok(Self {
            listener,
            ctx: SessionContext {
                config,
                store,
                gate,
            },
        })
    }

    /// The bound control endpoint; useful when the port was OS-assigned.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts control connections one at a time, forever.
    ///
    /// Each session runs to completion before the next connection is
    /// accepted. A transport fault ends only that session; the fault is
    /// logged and the loop returns to `accept`.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    info!("new control connection from {peer}");
                    if let Err(e) = handle_session(stream, peer, &self.ctx).await {
                        error!("ALERT: session with {peer} died: {e}");
                    }
                }
                Err(e) => {
                    error!("ALERT: accepting control connection failed: {e}");
                }
            }
        }
    }
}
