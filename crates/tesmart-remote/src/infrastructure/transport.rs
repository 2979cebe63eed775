//! Deadline-bounded TCP transport shared by both wire protocols.
//!
//! Every exchange opens a *fresh* TCP connection, writes the request once,
//! and reads whatever arrives within a total deadline.  The appliance keeps
//! no session state worth preserving and is known to mis-handle concurrent
//! or half-open connections, so per-operation connections buy isolation at
//! the cost of a LAN handshake (well under the 100 ms read quantum).
//!
//! The read loops never fail on "no data yet": a short per-read deadline
//! converts silence into bounded polling, and expiry of the *total* deadline
//! returns the accumulated bytes rather than an error.  The caller decides
//! whether an empty or partial read is useful.
//!
//! Three exchange shapes exist, differing only in their early-exit
//! condition:
//!
//! - [`exchange`] – stop as soon as a complete binary status frame is in the
//!   buffer.
//! - [`exchange_until_term`] – stop when the ASCII terminator byte arrives.
//! - [`exchange_raw`] / [`exchange_once`] – no early exit; drain until the
//!   deadline (used by the raw-hex diagnostic path and ASCII set commands).

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::trace;

use tesmart_core::{find_frames, DeviceError, Result};

/// Per-read deadline for the binary protocol.
const FRAME_READ_QUANTUM: Duration = Duration::from_millis(100);

/// Pause between read attempts on the binary protocol.
const FRAME_RETRY_SLEEP: Duration = Duration::from_millis(15);

/// Per-read deadline for the ASCII protocol.
const ASCII_READ_QUANTUM: Duration = Duration::from_millis(200);

/// Pause between read attempts on the ASCII protocol.
const ASCII_RETRY_SLEEP: Duration = Duration::from_millis(20);

/// Hard cap on accumulated binary reply bytes.
const FRAME_BUF_CAP: usize = 4096;

/// Hard cap on accumulated ASCII reply bytes.
const ASCII_BUF_CAP: usize = 2048;

/// Opens a TCP connection to `addr`, bounded by `timeout`.
async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(DeviceError::Unreachable {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(DeviceError::Unreachable {
            addr: addr.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
        }),
    }
}

/// Writes the full payload, mapping failures to [`DeviceError::Unreachable`].
async fn write_all(stream: &mut TcpStream, addr: &str, payload: &[u8]) -> Result<()> {
    stream
        .write_all(payload)
        .await
        .map_err(|source| DeviceError::Unreachable {
            addr: addr.to_string(),
            source,
        })
}

/// Sends `payload` and accumulates reply bytes until a complete binary frame
/// is present, the total deadline elapses, or the buffer exceeds 4096 bytes.
///
/// Returns the accumulated bytes even when the deadline expires with nothing
/// parseable in them.
///
/// # Errors
///
/// Returns [`DeviceError::Unreachable`] when the connection cannot be
/// opened, the write fails, or the peer closes the connection before sending
/// anything.
pub async fn exchange(addr: &str, payload: &[u8], total: Duration) -> Result<Vec<u8>> {
    let mut stream = connect(addr, total).await?;
    write_all(&mut stream, addr, payload).await?;

    let deadline = Instant::now() + total;
    let mut buf = Vec::new();
    let mut tmp = [0u8; 256];

    loop {
        if Instant::now() >= deadline {
            trace!(addr, got = buf.len(), "binary exchange deadline elapsed");
            return Ok(buf);
        }
        match tokio::time::timeout(FRAME_READ_QUANTUM, stream.read(&mut tmp)).await {
            Ok(Ok(0)) => {
                // Peer closed the connection.  With bytes in hand the caller
                // can still try to parse them; an immediate close is the
                // appliance's way of rejecting the command.
                if buf.is_empty() {
                    return Err(DeviceError::Unreachable {
                        addr: addr.to_string(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "connection closed before reply",
                        ),
                    });
                }
                return Ok(buf);
            }
            Ok(Ok(n)) => {
                buf.extend_from_slice(&tmp[..n]);
                if !find_frames(&buf).is_empty() {
                    return Ok(buf);
                }
            }
            Ok(Err(_)) | Err(_) => {
                // Read error or quantum expiry with nothing received: wait a
                // moment and retry until the outer deadline passes.
                tokio::time::sleep(FRAME_RETRY_SLEEP).await;
            }
        }
        if buf.len() > FRAME_BUF_CAP {
            return Ok(buf);
        }
    }
}

/// Sends `payload` and drains the reply until the total deadline elapses,
/// the peer closes, or 4096 bytes accumulate.  No early frame detection:
/// the raw-hex diagnostic path wants everything the appliance emits.
///
/// # Errors
///
/// Returns [`DeviceError::Unreachable`] on connect or write failure.
pub async fn exchange_raw(addr: &str, payload: &[u8], total: Duration) -> Result<Vec<u8>> {
    let mut stream = connect(addr, total).await?;
    write_all(&mut stream, addr, payload).await?;

    let deadline = Instant::now() + total;
    let mut buf = Vec::new();
    let mut tmp = [0u8; 256];

    loop {
        if Instant::now() >= deadline {
            return Ok(buf);
        }
        match tokio::time::timeout(FRAME_READ_QUANTUM, stream.read(&mut tmp)).await {
            Ok(Ok(0)) => return Ok(buf),
            Ok(Ok(n)) => buf.extend_from_slice(&tmp[..n]),
            Ok(Err(_)) | Err(_) => tokio::time::sleep(FRAME_RETRY_SLEEP).await,
        }
        if buf.len() > FRAME_BUF_CAP {
            return Ok(buf);
        }
    }
}

/// Sends an ASCII request and accumulates the reply until the terminator
/// byte `term` arrives, the total deadline elapses, the peer closes, or
/// 2048 bytes accumulate.  The caller tidies the returned bytes (NUL/CR/LF
/// stripping, truncation at the terminator).
///
/// # Errors
///
/// Returns [`DeviceError::Unreachable`] on connect or write failure.
pub async fn exchange_until_term(
    addr: &str,
    payload: &[u8],
    total: Duration,
    term: u8,
) -> Result<Vec<u8>> {
    let mut stream = connect(addr, total).await?;
    write_all(&mut stream, addr, payload).await?;

    let deadline = Instant::now() + total;
    let mut buf = Vec::new();
    let mut tmp = [0u8; 256];

    loop {
        if Instant::now() >= deadline {
            trace!(addr, got = buf.len(), "ascii exchange deadline elapsed");
            return Ok(buf);
        }
        match tokio::time::timeout(ASCII_READ_QUANTUM, stream.read(&mut tmp)).await {
            Ok(Ok(0)) => return Ok(buf),
            Ok(Ok(n)) => {
                buf.extend_from_slice(&tmp[..n]);
                if buf.contains(&term) {
                    return Ok(buf);
                }
            }
            Ok(Err(_)) | Err(_) => tokio::time::sleep(ASCII_RETRY_SLEEP).await,
        }
        if buf.len() > ASCII_BUF_CAP {
            return Ok(buf);
        }
    }
}

/// Sends an ASCII set packet and performs a one-shot drain of the reply:
/// read until the first error, EOF, or 2048 bytes, all under the total
/// deadline.  Set replies are empty or a short `OK`, so no terminator
/// detection is needed.
///
/// # Errors
///
/// Returns [`DeviceError::Unreachable`] on connect or write failure.
pub async fn exchange_once(addr: &str, payload: &[u8], total: Duration) -> Result<Vec<u8>> {
    let mut stream = connect(addr, total).await?;
    write_all(&mut stream, addr, payload).await?;

    let deadline = Instant::now() + total;
    let mut buf = Vec::new();
    let mut tmp = [0u8; 256];

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Ok(buf);
        }
        match tokio::time::timeout(deadline - now, stream.read(&mut tmp)).await {
            Ok(Ok(0)) => return Ok(buf),
            Ok(Ok(n)) => buf.extend_from_slice(&tmp[..n]),
            // One-shot semantics: the first read failure or deadline expiry
            // ends the drain.
            Ok(Err(_)) | Err(_) => return Ok(buf),
        }
        if buf.len() > ASCII_BUF_CAP {
            return Ok(buf);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
