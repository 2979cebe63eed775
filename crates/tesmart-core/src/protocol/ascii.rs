//! ASCII network-configuration protocol helpers.
//!
//! The switch accepts four query packets (`IP?`, `PT?`, `MA?`, `GW?`) and
//! four set packets (`IP:<v>;` etc.) on the same TCP port as the binary
//! protocol.  Query replies echo `<prefix>:<value>;`, possibly padded with
//! NULs or line endings, and octets may carry leading zeros
//! (`192.168.001.010`).  Everything here is pure string/byte manipulation;
//! the read-until-terminator loop lives in the application's transport.

use crate::error::{DeviceError, Result};

/// Terminator byte ending every ASCII request and reply.
pub const TERMINATOR: u8 = b';';

/// Query packets, in the order `get_network_config` issues them.
pub const QUERY_IP: &str = "IP?";
pub const QUERY_PORT: &str = "PT?";
pub const QUERY_MASK: &str = "MA?";
pub const QUERY_GATEWAY: &str = "GW?";

/// Reply prefixes corresponding to the queries above.
pub const PREFIX_IP: &str = "IP:";
pub const PREFIX_PORT: &str = "PT:";
pub const PREFIX_MASK: &str = "MA:";
pub const PREFIX_GATEWAY: &str = "GW:";

/// The switch's own LAN settings, as queried or as desired.
///
/// `mask` and `gateway` stay as dotted-octet strings because the client only
/// relays them; it never routes through the switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    pub ip: String,
    pub port: u16,
    pub mask: String,
    pub gateway: String,
}

impl NetworkSettings {
    /// Builds the four set packets in the order the firmware expects:
    /// IP, port, mask, gateway.
    pub fn set_packets(&self) -> [String; 4] {
        [
            format!("{}{};", PREFIX_IP, self.ip),
            format!("{}{};", PREFIX_PORT, self.port),
            format!("{}{};", PREFIX_MASK, self.mask),
            format!("{}{};", PREFIX_GATEWAY, self.gateway),
        ]
    }
}

/// Retains only ASCII digits and dots.
pub fn keep_digits_dots(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect()
}

/// Retains only ASCII digits.
pub fn keep_digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalises a dotted-octet string by dropping leading zeros from each
/// numeric segment: `"192.168.001.010"` becomes `"192.168.1.10"`.
///
/// Non-numeric segments are passed through untouched, so the function is
/// idempotent over arbitrary input.
pub fn normalize_octets(s: &str) -> String {
    keep_digits_dots(s)
        .split('.')
        .map(|part| match part.parse::<u64>() {
            Ok(n) => n.to_string(),
            Err(_) => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Cleans up a raw ASCII reply: decodes as lossy UTF-8, strips NUL/CR/LF
/// padding, and truncates to include the first terminator byte (inclusive).
pub fn tidy_reply(raw: &[u8], term: u8) -> String {
    let s: String = String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| !matches!(c, '\0' | '\r' | '\n'))
        .collect();
    match s.find(term as char) {
        Some(cut) => s[..=cut].to_string(),
        None => s,
    }
}

/// Strips the `<prefix>` and trailing `;` from a tidied query reply,
/// returning the raw value in between.
pub fn extract_field(reply: &str, prefix: &str) -> String {
    let s = reply.trim();
    let s = s.strip_suffix(';').unwrap_or(s);
    let s = s.strip_prefix(prefix).unwrap_or(s);
    s.to_string()
}

/// Parses the value of a `PT:` reply into a TCP port.
///
/// # Errors
///
/// Returns [`DeviceError::BadReply`] when no digits are present or the value
/// falls outside 1..=65535.
pub fn parse_port(raw: &str) -> Result<u16> {
    let digits = keep_digits(raw);
    if digits.is_empty() {
        return Err(DeviceError::BadReply(format!("bad port reply: {raw:?}")));
    }
    match digits.parse::<u32>() {
        Ok(p) if (1..=65535).contains(&p) => Ok(p as u16),
        _ => Err(DeviceError::BadReply(format!("bad port: {digits}"))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
