//! Reliable writer.
//!
//! A single `write` may accept only part of the buffer. `write_fully` keeps
//! calling it until every byte is accepted or a call fails, and reports how
//! far it got either way.

use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A write that stopped before the whole buffer was accepted.
#[derive(Debug)]
pub struct PartialWrite {
    /// Bytes accepted before the failure.
    pub written: usize,
    /// The first error encountered.
    pub source: io::Error,
}

/// Write all of `buf` to `writer`.
///
/// Returns the total number of bytes written, which equals `buf.len()`.
/// The cumulative count strictly increases on every accepted call; a call
/// that accepts nothing while bytes remain is reported as `WriteZero`.
pub async fn write_fully<W>(writer: &mut W, buf: &[u8]) -> Result<usize, PartialWrite>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0;

    while written < buf.len() {
        match writer.write(&buf[written..]).await {
            Ok(0) => {
                return Err(PartialWrite {
                    written,
                    source: io::Error::new(io::ErrorKind::WriteZero, "transport accepted no bytes"),
                });
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(PartialWrite { written, source }),
        }
    }

    Ok(written)
}
