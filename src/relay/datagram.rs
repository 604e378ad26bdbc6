//! Datagram relay.
//!
//! The socket is never connected: the nonce and every echo are sent to the
//! target explicitly, and datagrams from any other address are dropped.
//! There is no close signal, so the session ends once nothing has arrived
//! for the idle timeout. The timeout is re-armed before every receive.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::os::unix::io::AsRawFd;
use tokio::io::Interest;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use super::sys::{self, ReceivedMsg};
use super::{EchoStats, RelaySettings};
use crate::error::{RelayError, Result};
use crate::request::ProbeRequest;

/// Open a socket, send the nonce, echo until the target goes quiet.
pub async fn run(request: &ProbeRequest, settings: &RelaySettings) -> Result<EchoStats> {
    let conn = DatagramConnection::open(request.target())?;
    conn.send_nonce(request.token()).await?;
    conn.echo(settings).await
}

/// An unconnected datagram socket paired with the only peer it talks to.
pub struct DatagramConnection {
    socket: UdpSocket,
    peer: SocketAddr,
    peer_addr: SockAddr,
}

impl DatagramConnection {
    /// Bind an ephemeral socket in the peer's address family.
    pub fn open(peer: SocketAddr) -> Result<Self> {
        let (domain, local) = match peer {
            SocketAddr::V4(_) => (Domain::IPV4, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))),
            SocketAddr::V6(_) => (Domain::IPV6, SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))),
        };

        let socket = create_socket(domain, local).map_err(RelayError::Bind)?;
        let socket = UdpSocket::from_std(socket.into()).map_err(RelayError::Bind)?;

        info!(local = ?socket.local_addr().ok(), %peer, "Opened datagram socket");

        Ok(Self {
            socket,
            peer,
            peer_addr: SockAddr::from(peer),
        })
    }

    #[cfg(test)]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Send the nonce as a single datagram.
    pub async fn send_nonce(&self, token: &[u8]) -> Result<()> {
        debug!(len = token.len(), "Sending nonce");
        let sent = self
            .socket
            .send_to(token, self.peer)
            .await
            .map_err(|source| RelayError::Handshake { written: 0, source })?;

        if sent < token.len() {
            warn!(sent, expected = token.len(), "Short send for nonce");
        }
        info!("Nonce sent");
        Ok(())
    }

    /// Echo loop. Returns once the idle timeout expires or an I/O call fails.
    pub async fn echo(&self, settings: &RelaySettings) -> Result<EchoStats> {
        let mut payload = vec![0u8; settings.max_message_size];
        let mut control = vec![0u8; settings.max_control_size];
        let idle = settings.datagram_idle_timeout;
        let fd = self.socket.as_raw_fd();
        let mut stats = EchoStats::default();

        loop {
            let recv = self.socket.async_io(Interest::READABLE, || {
                sys::recv_msg(fd, &mut payload, &mut control)
            });

            let msg = match tokio::time::timeout(idle, recv).await {
                Ok(result) => result.map_err(RelayError::Receive)?,
                Err(_) => {
                    info!(idle_ms = idle.as_millis() as u64, "Timing out after inactivity");
                    return Ok(stats);
                }
            };

            debug!(
                bytes = msg.len,
                control_bytes = msg.control_len,
                from = %msg.from,
                "Received message"
            );
            log_truncation(&msg);

            if !self.is_peer(&msg.from) {
                warn!(
                    from = %msg.from,
                    expected = %self.peer,
                    "Ignoring datagram from unexpected address"
                );
                continue;
            }

            let data = &payload[..msg.len];
            let ctrl = &control[..msg.control_len];

            let sent = self
                .socket
                .async_io(Interest::WRITABLE, || {
                    sys::send_msg(fd, data, ctrl, &self.peer_addr)
                })
                .await
                .map_err(|source| RelayError::Transmit { written: 0, source })?;

            if sent < data.len() {
                warn!(sent, expected = data.len(), "Short send for echoed datagram");
            } else {
                debug!(bytes = sent, control_bytes = ctrl.len(), "Sent message");
            }

            stats.messages += 1;
            stats.bytes += sent as u64;
        }
    }

    fn is_peer(&self, from: &SocketAddr) -> bool {
        from.ip() == self.peer.ip() && from.port() == self.peer.port()
    }
}

/// Create a non-blocking datagram socket bound to `local`.
fn create_socket(domain: Domain, local: SocketAddr) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;
    socket.bind(&local.into())?;
    Ok(socket.into())
}

fn log_truncation(msg: &ReceivedMsg) {
    if msg.truncated {
        warn!(bytes = msg.len, "Datagram payload truncated to buffer size");
    }
    if msg.control_truncated {
        warn!(control_bytes = msg.control_len, "Ancillary data truncated to buffer size");
    }
}
