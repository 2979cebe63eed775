//! Wire protocol for TeSmart 16-port HDMI KVM switches.
//!
//! Two protocols coexist on the same TCP port and are kept separate by call
//! site, never by inspecting received bytes: the binary path reads until a
//! framed status is detected, the ASCII path reads until a `;` terminator.

pub mod ascii;
pub mod frame;
