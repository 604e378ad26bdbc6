//! Stream relay.
//!
//! Connects to the target, sends the nonce and echoes every chunk it reads
//! back on the same connection. The session ends when the target closes its
//! side; an idle timeout only applies when one is configured.

use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{TcpSocket, TcpStream};
use tracing::{debug, info};

use super::writer::write_fully;
use super::{EchoStats, RelaySettings};
use crate::error::{RelayError, Result};
use crate::request::ProbeRequest;

/// Connect, send the nonce, echo until the target hangs up.
pub async fn run(request: &ProbeRequest, settings: &RelaySettings) -> Result<EchoStats> {
    let stream = connect(request.target()).await?;
    serve(stream, request.token(), settings).await
}

/// Open a stream connection to `target` with Nagle disabled.
///
/// The socket family follows the target address, which the request has
/// already checked against the protocol's family.
pub async fn connect(target: SocketAddr) -> Result<TcpStream> {
    let connect_err = |source: std::io::Error| RelayError::Connect { target, source };

    let socket = match target {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(connect_err)?;

    let stream = socket.connect(target).await.map_err(connect_err)?;
    stream.set_nodelay(true).map_err(connect_err)?;

    info!(local = ?stream.local_addr().ok(), "Connected to target");
    Ok(stream)
}

/// Run the handshake and echo loop over an established connection.
///
/// Takes ownership so the connection is closed when this returns, whatever
/// the outcome.
pub async fn serve<S>(mut stream: S, token: &[u8], settings: &RelaySettings) -> Result<EchoStats>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    send_nonce(&mut stream, token).await?;
    let result = echo(&mut stream, settings).await;
    drop(stream);
    debug!("Connection released");
    result
}

/// Write the nonce as the first bytes on the connection.
pub async fn send_nonce<S>(stream: &mut S, token: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    debug!(len = token.len(), "Sending nonce");
    write_fully(stream, token)
        .await
        .map_err(|e| RelayError::Handshake {
            written: e.written,
            source: e.source,
        })?;
    info!("Nonce sent");
    Ok(())
}

/// Echo loop: read a chunk, write the same bytes back, repeat.
pub async fn echo<S>(stream: &mut S, settings: &RelaySettings) -> Result<EchoStats>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::with_capacity(settings.max_message_size);
    let mut stats = EchoStats::default();

    loop {
        buffer.clear();

        let read = stream.read_buf(&mut buffer);
        let n = match settings.stream_idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, read).await {
                Ok(result) => result,
                Err(_) => {
                    info!(idle_ms = idle.as_millis() as u64, "Timing out after inactivity");
                    return Ok(stats);
                }
            },
            None => read.await,
        }
        .map_err(RelayError::Receive)?;

        if n == 0 {
            info!("Connection closed by target");
            return Ok(stats);
        }

        debug!(bytes = n, "Received message");

        write_fully(stream, &buffer[..n])
            .await
            .map_err(|e| RelayError::Transmit {
                written: e.written,
                source: e.source,
            })?;

        debug!(bytes = n, "Sent message");
        stats.messages += 1;
        stats.bytes += n as u64;
    }
}
