//! Typed operations against a single TeSmart switch.
//!
//! [`DeviceClient`] owns the target endpoint and the per-operation timeout
//! profile, and serialises *all* device I/O through one mutex: the lock is
//! acquired before connecting and released only after the connection is
//! closed, so at most one TCP session against the appliance exists at any
//! moment regardless of caller concurrency.  The firmware is known to
//! mis-handle concurrent sessions; this is a correctness requirement, not a
//! throughput optimisation.
//!
//! Set operations do not verify that the switch actually changed state.
//! Verification (and the reconciliation of optimistic UI state against the
//! device's authoritative answer) is the
//! [`SwitchMonitor`](crate::application::poll_coordinator::SwitchMonitor)'s job.

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use tesmart_core::protocol::ascii::{
    self, NetworkSettings, PREFIX_GATEWAY, PREFIX_IP, PREFIX_MASK, PREFIX_PORT, QUERY_GATEWAY,
    QUERY_IP, QUERY_MASK, QUERY_PORT, TERMINATOR,
};
use tesmart_core::protocol::frame::{
    command_frame, scan_active, LedTimeout, CMD_ACTIVE_STATUS, CMD_BUZZER, CMD_LED_TIMEOUT,
    CMD_QUERY_ACTIVE, CMD_SET_INPUT,
};
use tesmart_core::{DeviceError, Result};

use crate::infrastructure::storage::config::AppConfig;
use crate::infrastructure::transport;

/// Total deadline for each ASCII network-config session.
const ASCII_DEADLINE: Duration = Duration::from_secs(2);

/// Target endpoint plus timeout profile, replaced atomically by
/// [`DeviceClient::set_target`].
#[derive(Debug, Clone)]
struct Endpoint {
    addr: String,
    get_timeout: Duration,
    set_timeout: Duration,
}

/// Client for one switch.  Cheap to share via `Arc`; all methods take
/// `&self`.
pub struct DeviceClient {
    // Guards the endpoint fields AND every network operation end-to-end
    // (connect, write, read loop, close).
    inner: Mutex<Endpoint>,
}

impl DeviceClient {
    /// Creates a client for the switch at `ip:port` with the given timeout
    /// profile.
    pub fn new(ip: &str, port: u16, get_timeout: Duration, set_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Endpoint {
                addr: format!("{ip}:{port}"),
                get_timeout,
                set_timeout,
            }),
        }
    }

    /// Creates a client from the loaded application config.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(&cfg.ip, cfg.port, cfg.get_timeout(), cfg.set_timeout())
    }

    /// Atomically replaces the endpoint and timeouts.  No I/O.
    pub async fn set_target(&self, ip: &str, port: u16, get_timeout: Duration, set_timeout: Duration) {
        let mut ep = self.inner.lock().await;
        ep.addr = format!("{ip}:{port}");
        ep.get_timeout = get_timeout;
        ep.set_timeout = set_timeout;
    }

    /// The current `host:port` target, for status display.
    pub async fn target_addr(&self) -> String {
        self.inner.lock().await.addr.clone()
    }

    /// Sends one binary command frame under the lock and returns the raw
    /// reply bytes.
    async fn command(&self, cmd: u8, arg: u8, total: TimeoutProfile) -> Result<Vec<u8>> {
        let ep = self.inner.lock().await;
        let deadline = match total {
            TimeoutProfile::Get => ep.get_timeout,
            TimeoutProfile::Set => ep.set_timeout,
        };
        transport::exchange(&ep.addr, &command_frame(cmd, arg), deadline).await
    }

    // ── Binary operations ─────────────────────────────────────────────────────

    /// Queries the currently active input (1..=16).
    ///
    /// Retries once with the same deadline when the first reply contains no
    /// parseable status frame.
    ///
    /// # Errors
    ///
    /// [`DeviceError::NoReply`] when both attempts yield unparseable bytes;
    /// the error carries an uppercase hex dump of the last reply.
    pub async fn get_active_input(&self) -> Result<u8> {
        let reply = self.command(CMD_QUERY_ACTIVE, 0x00, TimeoutProfile::Get).await?;
        if let Some(port) = scan_active(&reply) {
            return Ok(port);
        }

        debug!(reply = %hex::encode_upper(&reply), "no status in first reply, retrying");
        let retry = self
            .command(CMD_QUERY_ACTIVE, 0x00, TimeoutProfile::Get)
            .await
            .unwrap_or_default();
        if let Some(port) = scan_active(&retry) {
            return Ok(port);
        }

        let last = if retry.is_empty() { reply } else { retry };
        Err(DeviceError::NoReply {
            reply_hex: hex::encode_upper(last),
        })
    }

    /// Switches to input `n` (1..=16).
    ///
    /// Tries the 1-indexed opcode first; on a transport error falls back to
    /// the 0-indexed alternate opcode some firmware revisions require.
    /// The switch sends no explicit ACK for either opcode, so this returns
    /// as soon as the write lands.
    ///
    /// # Errors
    ///
    /// [`DeviceError::BadArgument`] for `n` outside 1..=16 (no bytes are
    /// written); transport errors from the fallback attempt otherwise.
    pub async fn set_input(&self, n: u8) -> Result<()> {
        if !(1..=16).contains(&n) {
            return Err(DeviceError::BadArgument(format!("input out of range: {n}")));
        }
        match self.command(CMD_SET_INPUT, n, TimeoutProfile::Set).await {
            Ok(_) => Ok(()),
            Err(first) => {
                debug!(error = %first, input = n, "set-input opcode 0x01 failed, trying 0x11");
                self.command(CMD_ACTIVE_STATUS, n - 1, TimeoutProfile::Set)
                    .await
                    .map(|_| ())
            }
        }
    }

    /// Turns the confirmation buzzer on or off.
    pub async fn set_buzzer(&self, enabled: bool) -> Result<()> {
        let arg = if enabled { 0x01 } else { 0x00 };
        self.command(CMD_BUZZER, arg, TimeoutProfile::Set).await.map(|_| ())
    }

    /// Sets the front-panel LED timeout mode.
    pub async fn set_led_timeout(&self, mode: LedTimeout) -> Result<()> {
        self.command(CMD_LED_TIMEOUT, mode.arg(), TimeoutProfile::Set)
            .await
            .map(|_| ())
    }

    /// End-to-end reachability probe.  The appliance has no dedicated ping,
    /// so this is an active-input query with the value discarded.
    pub async fn ping(&self) -> Result<()> {
        self.get_active_input().await.map(|_| ())
    }

    /// Sends operator-supplied hex bytes and returns whatever the appliance
    /// replies, as an uppercase hex string.  Spaces in `hex_str` are
    /// ignored.  Intended for diagnostics only.
    ///
    /// # Errors
    ///
    /// [`DeviceError::BadArgument`] for empty or invalid hex.
    pub async fn raw_hex_send(&self, hex_str: &str, deadline: Duration) -> Result<String> {
        let cleaned: String = hex_str.split_whitespace().collect();
        if cleaned.is_empty() {
            return Err(DeviceError::BadArgument("empty hex".to_string()));
        }
        let payload = hex::decode(&cleaned)
            .map_err(|e| DeviceError::BadArgument(format!("invalid hex: {e}")))?;

        let ep = self.inner.lock().await;
        let reply = transport::exchange_raw(&ep.addr, &payload, deadline).await?;
        Ok(hex::encode_upper(reply))
    }

    // ── ASCII network-configuration operations ────────────────────────────────

    /// Issues one ASCII query in its own TCP session and returns the value
    /// between `prefix` and the terminator.
    async fn ascii_query(&self, query: &str, prefix: &str) -> Result<String> {
        let raw = {
            let ep = self.inner.lock().await;
            transport::exchange_until_term(&ep.addr, query.as_bytes(), ASCII_DEADLINE, TERMINATOR)
                .await?
        };
        let tidied = ascii::tidy_reply(&raw, TERMINATOR);
        if !tidied.ends_with(';') {
            return Err(DeviceError::NoReply {
                reply_hex: hex::encode_upper(&raw),
            });
        }
        if !tidied.trim().starts_with(prefix) {
            return Err(DeviceError::BadReply(format!(
                "missing {prefix:?} prefix in {tidied:?}"
            )));
        }
        Ok(ascii::extract_field(&tidied, prefix))
    }

    /// Reads the switch's LAN settings via four ASCII queries, each with
    /// its own TCP session and a 2 s deadline.  Octets are normalised
    /// (`192.168.001.010` → `192.168.1.10`).
    ///
    /// # Errors
    ///
    /// [`DeviceError::BadReply`] for a missing prefix or a port outside
    /// 1..=65535; [`DeviceError::NoReply`] when a reply never terminates.
    pub async fn get_network_config(&self) -> Result<NetworkSettings> {
        let ip = self.ascii_query(QUERY_IP, PREFIX_IP).await?;
        let port = self.ascii_query(QUERY_PORT, PREFIX_PORT).await?;
        let mask = self.ascii_query(QUERY_MASK, PREFIX_MASK).await?;
        let gateway = self.ascii_query(QUERY_GATEWAY, PREFIX_GATEWAY).await?;

        Ok(NetworkSettings {
            ip: ascii::normalize_octets(&ip),
            port: ascii::parse_port(&port)?,
            mask: ascii::normalize_octets(&mask),
            gateway: ascii::normalize_octets(&gateway),
        })
    }

    /// Writes the switch's LAN settings as four ASCII set packets, each in
    /// its own TCP session with a 2 s deadline.
    ///
    /// An empty reply is accepted; some firmware stays silent.  The device
    /// typically requires a power cycle before a new IP or port takes
    /// effect; this client does not reconnect on its own.
    ///
    /// # Errors
    ///
    /// [`DeviceError::BadReply`] when a non-empty reply lacks the `OK`
    /// substring.
    pub async fn set_network_config(&self, settings: &NetworkSettings) -> Result<()> {
        for packet in settings.set_packets() {
            let raw = {
                let ep = self.inner.lock().await;
                transport::exchange_once(&ep.addr, packet.as_bytes(), ASCII_DEADLINE).await?
            };
            let reply: String = String::from_utf8_lossy(&raw)
                .chars()
                .filter(|c| *c != '\0')
                .collect();
            let reply = reply.trim();
            if !reply.is_empty() && !reply.contains("OK") {
                return Err(DeviceError::BadReply(format!(
                    "unexpected reply to {packet:?}: {reply:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Which of the two configured deadlines a binary command uses.
#[derive(Debug, Clone, Copy)]
enum TimeoutProfile {
    Get,
    Set,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
