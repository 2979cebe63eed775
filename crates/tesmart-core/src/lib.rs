//! # tesmart-core
//!
//! Shared library for the TeSmart remote containing the wire protocol codec,
//! the status-frame scanner, and the ASCII network-configuration helpers.
//!
//! This crate is pure: it operates on byte buffers and strings only and has
//! zero dependencies on sockets, timers, or OS APIs.  All network I/O lives
//! in the `tesmart-remote` application crate.
//!
//! # The two wire protocols
//!
//! TeSmart 16-port HDMI switches expose two protocols on the *same* TCP port:
//!
//! - **`protocol::frame`** – a fixed 6-byte binary command/status protocol
//!   (`AA BB 03 CMD ARG EE`) used for input switching, the buzzer, LED
//!   timeouts, and the active-input query.  The appliance frequently pads
//!   replies with garbage bytes, so this module is built around a scanner
//!   that locates valid frames inside noisy buffers rather than a strict
//!   parser.
//!
//! - **`protocol::ascii`** – a short request/response text protocol
//!   (`IP?` → `IP:192.168.1.10;`) used only for reconfiguring the switch's
//!   own network settings.  Replies may be padded with NULs or line endings
//!   and octets may carry leading zeros, so the helpers here normalise
//!   before parsing.

pub mod error;
pub mod protocol;

// Re-export the most-used items at the crate root so callers can write
// `tesmart_core::scan_active` instead of `tesmart_core::protocol::frame::scan_active`.
pub use error::{DeviceError, Result};
pub use protocol::ascii::NetworkSettings;
pub use protocol::frame::{command_frame, find_frames, scan_active, LedTimeout};
