//! Error types shared by the protocol crate and the application.
//!
//! All fallible device operations return [`Result<T>`], which uses
//! [`DeviceError`] as the error type.  The taxonomy is deliberately small:
//! slow reads and partial replies are absorbed by the transport's
//! deadline-bounded accumulation and never surface as errors.

/// The error type for all device operations.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The TCP connection to the switch could not be established, or the
    /// request could not be written before the connection dropped.
    #[error("device unreachable at {addr}: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The switch returned nothing parseable within the deadline.
    ///
    /// `reply_hex` is an uppercase hex dump of whatever bytes *were*
    /// accumulated on the last attempt, for operator diagnosis.  Empty when
    /// the device stayed completely silent.
    #[error("no parseable reply within deadline (got: {reply_hex:?})")]
    NoReply { reply_hex: String },

    /// An ASCII reply was present but malformed: missing prefix, bad octets,
    /// or a port outside 1..=65535.
    #[error("bad reply: {0}")]
    BadReply(String),

    /// A caller-supplied value was out of its declared range or malformed.
    ///
    /// This is a programmer error; callers are expected to validate before
    /// invoking the client.
    #[error("bad argument: {0}")]
    BadArgument(String),
}

/// A convenience `Result` alias using [`DeviceError`] as the error type.
pub type Result<T> = std::result::Result<T, DeviceError>;
