//! Infrastructure layer: TCP transport and configuration storage.

pub mod storage;
pub mod transport;
