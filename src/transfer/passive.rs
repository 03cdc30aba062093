//! Passive data channel
//!
//! One `PassiveChannel` backs exactly one data transfer: bind, advertise,
//! accept a single inbound connection, tear down. Channels are never
//! reused across commands; PASV replaces any live channel wholesale.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct PassiveChannel {
    listener: Option<TcpListener>,
    accepted: Option<TcpStream>,
    advertised: SocketAddrV4,
}

impl PassiveChannel {
    /// Binds a fresh listening socket on `advertise_ip`.
    ///
    /// The port is OS-assigned unless a fixed one is configured. The
    /// caller only learns the advertised endpoint once the socket is
    /// bound and listening, so a 227 reply can never precede a usable
    /// listener.
    pub fn open(advertise_ip: Ipv4Addr, fixed_port: Option<u16>) -> io::Result<Self> {
        let requested = SocketAddrV4::new(advertise_ip, fixed_port.unwrap_or(0));
        let listener = TcpListener::bind(requested)?;
        let bound_port = listener.local_addr()?.port();
        info!("passive channel listening on {advertise_ip}:{bound_port}");
        Ok(Self {
            listener: Some(listener),
            accepted: None,
            advertised: SocketAddrV4::new(advertise_ip, bound_port),
        })
    }

    pub fn advertised(&self) -> SocketAddrV4 {
        self.advertised
    }

    /// Text of the 227 reply, port split into high and low bytes.
    pub fn pasv_text(&self) -> String {
        let [h1, h2, h3, h4] = self.advertised.ip().octets();
        let port = self.advertised.port();
        format!(
            "Entering Passive Mode ({h1},{h2},{h3},{h4},{p1},{p2}).",
            p1 = port / 256,
            p2 = port % 256,
        )
    }

    /// Waits for the one inbound data connection this channel will ever
    /// accept, polling with a bounded deadline rather than blocking
    /// forever on a client that never connects.
    pub fn accept_once(&mut self, timeout: Duration) -> io::Result<&mut TcpStream> {
        if self.accepted.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "data connection already accepted on this channel",
            ));
        }
        let listener = self.listener.as_ref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "passive channel closed")
        })?;

        listener.set_nonblocking(true)?;
        let deadline = Instant::now() + timeout;
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    debug!("data connection accepted from {peer}");
                    stream.set_nonblocking(false)?;
                    return Ok(self.accepted.insert(stream));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        warn!("no data connection arrived within {timeout:?}");
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "timed out waiting for data connection",
                        ));
                    }
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Releases the listener and any accepted stream. Safe to call any
    /// number of times; close errors are ignored.
    pub fn close(&mut self) {
        self.listener.take();
        self.accepted.take();
    }
}

impl Drop for PassiveChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn open_local() -> PassiveChannel {
        PassiveChannel::open(Ipv4Addr::LOCALHOST, None).unwrap()
    }

    #[test]
    fn pasv_text_encodes_bound_endpoint() {
        let channel = open_local();
        let text = channel.pasv_text();
        let inner = text
            .strip_prefix("Entering Passive Mode (")
            .and_then(|t| t.strip_suffix(")."))
            .unwrap();
        let fields: Vec<u16> = inner.split(',').map(|f| f.parse().unwrap()).collect();
        assert_eq!(&fields[..4], &[127, 0, 0, 1]);
        assert_eq!(
            fields[4] * 256 + fields[5],
            channel.advertised().port(),
        );
    }

    #[test]
    fn accepts_exactly_one_connection() {
        let mut channel = open_local();
        let addr = channel.advertised();

        let mut client = TcpStream::connect(addr).unwrap();
        channel.accept_once(Duration::from_secs(2)).unwrap();
        client.write_all(b"ping").unwrap();

        let err = channel.accept_once(Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn accept_times_out_without_a_client() {
        let mut channel = open_local();
        let err = channel
            .accept_once(Duration::from_millis(150))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn close_is_idempotent_and_releases_the_port() {
        let mut channel = open_local();
        let addr = channel.advertised();
        channel.close();
        channel.close();
        assert!(TcpStream::connect(addr).is_err());
        assert!(
            channel
                .accept_once(Duration::from_millis(50))
                .is_err()
        );
    }

    #[test]
    fn fixed_port_override_is_honored() {
        // Bind an ephemeral listener first to find a free port, then
        // reopen it as the fixed data port.
        let probe = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        let channel = PassiveChannel::open(Ipv4Addr::LOCALHOST, Some(port)).unwrap();
        assert_eq!(channel.advertised().port(), port);
    }
}
