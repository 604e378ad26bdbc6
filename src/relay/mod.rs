//! Relay engine.
//!
//! One invocation = one connection to the target:
//!
//! 1. establish the connection (stream or datagram, per [`Transport`])
//! 2. send the nonce as the first payload
//! 3. echo every message back until the session ends
//!
//! ## Session end
//!
//! - Stream: the peer closes (or a read returns zero bytes). There is no idle
//!   timeout unless `stream_idle_timeout` is configured.
//! - Datagram: no datagram arrives for `datagram_idle_timeout` (5s default).
//!
//! Both are reported as success. Any other I/O failure ends the invocation
//! with a [`RelayError`]. The connection is owned by the handler and dropped
//! on every exit path.

pub mod datagram;
pub mod stream;
mod sys;
pub mod writer;

use std::time::Duration;
use tracing::{error, info, info_span, Instrument};

use crate::error::Result;
use crate::request::{ProbeRequest, Transport};

/// Default datagram idle timeout.
pub const DEFAULT_DATAGRAM_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default receive buffer size for payloads.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default receive buffer size for datagram ancillary data.
pub const DEFAULT_MAX_CONTROL_SIZE: usize = 64 * 1024;

/// Tunables for one invocation.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Inactivity window after which a datagram session ends.
    pub datagram_idle_timeout: Duration,
    /// Inactivity window for stream sessions. `None` waits for the peer.
    pub stream_idle_timeout: Option<Duration>,
    /// Largest message received in one read.
    pub max_message_size: usize,
    /// Largest ancillary block received with one datagram.
    pub max_control_size: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            datagram_idle_timeout: DEFAULT_DATAGRAM_IDLE_TIMEOUT,
            stream_idle_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_control_size: DEFAULT_MAX_CONTROL_SIZE,
        }
    }
}

/// Counters reported when a session ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EchoStats {
    /// Messages echoed back to the target.
    pub messages: u64,
    /// Payload bytes echoed back to the target.
    pub bytes: u64,
}

/// Run one relay invocation to completion.
pub async fn run(request: &ProbeRequest, settings: &RelaySettings) -> Result<EchoStats> {
    let span = info_span!(
        "relay",
        transport = %request.transport(),
        target = %request.target(),
    );

    async {
        let result = match request.transport() {
            Transport::Stream(_) => stream::run(request, settings).await,
            Transport::Datagram(_) => datagram::run(request, settings).await,
        };

        match &result {
            Ok(stats) => info!(
                messages = stats.messages,
                bytes = stats.bytes,
                "Relay finished"
            ),
            Err(e) => error!(kind = e.kind(), error = %e, "Relay failed"),
        }
        result
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, UdpSocket};

    #[tokio::test]
    async fn test_dispatch_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let request = ProbeRequest::new("tcp", "127.0.0.1", port, "nonce").unwrap();

        let relay = tokio::spawn(async move { run(&request, &RelaySettings::default()).await });

        let (mut peer, _) = listener.accept().await.unwrap();
        let mut nonce = [0u8; 5];
        peer.read_exact(&mut nonce).await.unwrap();
        assert_eq!(&nonce, b"nonce");
        peer.shutdown().await.unwrap();

        let stats = relay.await.unwrap().unwrap();
        assert_eq!(stats, EchoStats::default());
    }

    #[tokio::test]
    async fn test_dispatch_datagram() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = peer.local_addr().unwrap().port();
        let request = ProbeRequest::new("udp", "127.0.0.1", port, "nonce").unwrap();
        let settings = RelaySettings {
            datagram_idle_timeout: Duration::from_millis(200),
            ..RelaySettings::default()
        };

        let relay = tokio::spawn(async move { run(&request, &settings).await });

        let mut buf = [0u8; 16];
        let (n, _) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"nonce");

        let stats = relay.await.unwrap().unwrap();
        assert_eq!(stats.messages, 0);
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        // Grab a free port, then close the listener so nothing accepts on it
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let request = ProbeRequest::new("tcp4", "127.0.0.1", port, "nonce").unwrap();
        match run(&request, &RelaySettings::default()).await {
            Err(RelayError::Connect { target, .. }) => assert_eq!(target.port(), port),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
