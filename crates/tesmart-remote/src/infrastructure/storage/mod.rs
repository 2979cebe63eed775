//! Persistence for application settings.

pub mod config;
