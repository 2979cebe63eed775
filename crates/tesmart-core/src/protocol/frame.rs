//! Binary frame codec and scanner.
//!
//! Wire format:
//! ```text
//! [0xAA][0xBB][0x03][CMD][ARG][0xEE]
//! ```
//! Total frame size: 6 bytes.  No length field, no checksum.  Commands used
//! by the client:
//!
//! | CMD    | ARG              | Meaning                                    |
//! |--------|------------------|--------------------------------------------|
//! | `0x10` | `0x00`           | Query active input (request)               |
//! | `0x11` | `0x00..=0x0F`    | Set input (0-indexed) / active-input reply |
//! | `0x01` | `0x01..=0x10`    | Set input (1-indexed, alternate form)      |
//! | `0x02` | `0x00`/`0x01`    | Buzzer off / on                            |
//! | `0x03` | `0x00`/`0x0A`/`0x1E` | LED timeout off / 10 s / 30 s          |
//!
//! The appliance pads replies with unrelated bytes and some firmware
//! variants truncate the trailing `0xEE`, so decoding is done by *scanning*
//! buffers for plausible frames rather than parsing from offset zero.

/// Length of every binary frame.
pub const FRAME_LEN: usize = 6;

/// Fixed three-byte header preceding every command and status frame.
pub const HEADER: [u8; 3] = [0xAA, 0xBB, 0x03];

/// Fixed trailer byte.
pub const TRAILER: u8 = 0xEE;

/// Query the currently active input.
pub const CMD_QUERY_ACTIVE: u8 = 0x10;

/// Active-input status reply (ARG = port − 1).  Also accepted by the switch
/// as a 0-indexed set-input command.
pub const CMD_ACTIVE_STATUS: u8 = 0x11;

/// Set input, 1-indexed (ARG = port).
pub const CMD_SET_INPUT: u8 = 0x01;

/// Buzzer on/off.
pub const CMD_BUZZER: u8 = 0x02;

/// Front-panel LED timeout.
pub const CMD_LED_TIMEOUT: u8 = 0x03;

/// LED timeout modes supported by the switch firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedTimeout {
    /// LEDs stay on permanently.
    Off,
    /// LEDs turn off 10 seconds after the last switch.
    Secs10,
    /// LEDs turn off 30 seconds after the last switch.
    Secs30,
}

impl LedTimeout {
    /// The ARG byte the firmware expects for this mode.
    pub fn arg(self) -> u8 {
        match self {
            LedTimeout::Off => 0x00,
            LedTimeout::Secs10 => 0x0A,
            LedTimeout::Secs30 => 0x1E,
        }
    }
}

/// Builds a 6-byte command frame for `cmd` and `arg`.
pub fn command_frame(cmd: u8, arg: u8) -> [u8; FRAME_LEN] {
    [HEADER[0], HEADER[1], HEADER[2], cmd, arg, TRAILER]
}

/// Locates complete 6-byte frames inside a possibly noisy buffer.
///
/// Walks the buffer left to right; at each index where bytes
/// `(i, i+1, i+2, i+5)` equal `(0xAA, 0xBB, 0x03, 0xEE)` the 6-byte slice
/// starting at `i` is emitted and the cursor skips past it, so back-to-back
/// frames with interleaved garbage are all found.  CMD and ARG are not
/// validated here; callers filter for the command they expect.
pub fn find_frames(buf: &[u8]) -> Vec<[u8; FRAME_LEN]> {
    let mut frames = Vec::new();
    let mut i = 0;
    while i + FRAME_LEN <= buf.len() {
        if buf[i] == HEADER[0]
            && buf[i + 1] == HEADER[1]
            && buf[i + 2] == HEADER[2]
            && buf[i + 5] == TRAILER
        {
            let mut frame = [0u8; FRAME_LEN];
            frame.copy_from_slice(&buf[i..i + FRAME_LEN]);
            frames.push(frame);
            i += 5;
        } else {
            i += 1;
        }
    }
    frames
}

/// Extracts the active input (1..=16) from a status reply buffer.
///
/// Prefers a fully framed `CMD=0x11` response; if none is framed, falls back
/// to a relaxed scan for the `AA BB 03 11` prefix alone.  Some firmware
/// variants truncate the trailing `0xEE`, which is why the fallback exists.
///
/// Returns `None` when the buffer contains no recognisable status.
pub fn scan_active(buf: &[u8]) -> Option<u8> {
    for frame in find_frames(buf) {
        if frame[3] == CMD_ACTIVE_STATUS {
            return Some(frame[4].wrapping_add(1));
        }
    }
    // Relaxed fallback: header + 0x11 with the ARG byte present, trailer
    // missing or mangled.
    for i in 0..buf.len().saturating_sub(4) {
        if buf[i] == HEADER[0]
            && buf[i + 1] == HEADER[1]
            && buf[i + 2] == HEADER[2]
            && buf[i + 3] == CMD_ACTIVE_STATUS
        {
            return Some(buf[i + 4].wrapping_add(1));
        }
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────
