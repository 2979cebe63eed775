//! # tesmart-remote
//!
//! Remote control application for TeSmart 16-port HDMI KVM switches on a
//! LAN.  The switch exposes two wire protocols on one unauthenticated TCP
//! port (5000 by default): a fixed 6-byte binary command/status protocol and
//! a short ASCII protocol for reconfiguring the switch's own network
//! settings.  Sessions are deliberately short-lived: every command opens a
//! fresh TCP connection, because the appliance firmware mis-handles
//! concurrent or half-open sessions.
//!
//! # Layers
//!
//! - **`application`** – the typed device client (serialises every operation
//!   through one mutex) and the polling coordinator (periodic active-input
//!   polls reconciled against optimistic user-initiated switches).
//! - **`infrastructure`** – the deadline-bounded TCP transport and TOML
//!   configuration storage.
//!
//! The protocol codec itself lives in the `tesmart-core` crate.

pub mod application;
pub mod infrastructure;
