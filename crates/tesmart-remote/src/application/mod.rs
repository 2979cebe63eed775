//! Application layer: the typed device client and the polling coordinator.

pub mod device_client;
pub mod poll_coordinator;

pub use device_client::DeviceClient;
pub use poll_coordinator::{MonitorEvent, MonitorSettings, SwitchMonitor};
