//! TeSmart remote command-line entry point.
//!
//! Loads the TOML configuration (creating it with defaults on first run),
//! applies any `--host`/`--port` overrides, and executes one subcommand
//! against the switch.  The `watch` subcommand runs the polling coordinator
//! and streams its events to stdout until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! tesmart-remote [--host <IP>] [--port <PORT>] <COMMAND>
//!
//! Commands:
//!   status       Query the active input
//!   switch       Switch to an input (1..=16)
//!   buzzer       Turn the confirmation buzzer on or off
//!   led-timeout  Set the front-panel LED timeout
//!   ping         Check that the switch answers at all
//!   raw          Send raw hex bytes and dump the reply (diagnostics)
//!   net          Read or write the switch's own LAN settings
//!   watch        Poll the active input continuously and print changes
//! ```
//!
//! `--host` and `--port` can also be supplied via the `TESMART_HOST` and
//! `TESMART_PORT` environment variables; CLI flags take precedence.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tesmart_core::{LedTimeout, NetworkSettings};
use tesmart_remote::application::{DeviceClient, MonitorEvent, MonitorSettings, SwitchMonitor};
use tesmart_remote::infrastructure::storage::config::{self, AppConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// LAN remote control for TeSmart 16-port HDMI KVM switches.
#[derive(Debug, Parser)]
#[command(name = "tesmart-remote", version)]
struct Cli {
    /// Switch IP address (overrides the config file).
    #[arg(long, env = "TESMART_HOST")]
    host: Option<String>,

    /// Switch TCP port (overrides the config file).
    #[arg(long, env = "TESMART_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Query the currently active input.
    Status,
    /// Switch to an input.
    Switch {
        /// Input number, 1..=16.
        input: u8,
    },
    /// Turn the confirmation buzzer on or off.
    Buzzer {
        #[arg(value_enum)]
        state: OnOff,
    },
    /// Set the front-panel LED timeout.
    LedTimeout {
        #[arg(value_enum)]
        mode: LedMode,
    },
    /// Check that the switch answers at all.
    Ping,
    /// Send raw hex bytes and dump the reply (diagnostics).
    Raw {
        /// Hex string to send; spaces allowed (`"AA BB 03 10 00 EE"`).
        hex: String,
        /// Total read deadline in milliseconds.
        #[arg(long, default_value_t = 600)]
        timeout_ms: u64,
    },
    /// Read or write the switch's own LAN settings.
    Net {
        #[command(subcommand)]
        action: NetAction,
    },
    /// Poll the active input continuously and print changes until Ctrl-C.
    Watch,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnOff {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LedMode {
    /// LEDs stay on permanently.
    Off,
    /// LEDs turn off after 10 seconds.
    #[value(name = "10s")]
    Secs10,
    /// LEDs turn off after 30 seconds.
    #[value(name = "30s")]
    Secs30,
}

impl From<LedMode> for LedTimeout {
    fn from(mode: LedMode) -> Self {
        match mode {
            LedMode::Off => LedTimeout::Off,
            LedMode::Secs10 => LedTimeout::Secs10,
            LedMode::Secs30 => LedTimeout::Secs30,
        }
    }
}

#[derive(Debug, Subcommand)]
enum NetAction {
    /// Query IP, port, netmask, and gateway from the switch.
    Get,
    /// Write new LAN settings to the switch.
    Set {
        #[arg(long)]
        ip: String,
        #[arg(long)]
        port: u16,
        #[arg(long)]
        mask: String,
        #[arg(long)]
        gateway: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging; level is controlled by RUST_LOG, default "info".
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let (mut cfg, created) = config::load_config().context("loading configuration")?;
    if created {
        info!(
            path = %config::config_file_path()?.display(),
            "created default config file"
        );
    }
    if let Some(host) = &cli.host {
        cfg.ip = host.clone();
    }
    if let Some(port) = cli.port {
        cfg.port = port;
    }

    let client = Arc::new(DeviceClient::from_config(&cfg));

    match cli.command {
        Command::Status => {
            let port = client.get_active_input().await?;
            println!("Active: {} ({})", port, cfg.port_name(port));
        }
        Command::Switch { input } => {
            let settings = MonitorSettings::from(&cfg);
            // No background poller for a one-shot switch; reuse the
            // verification policy directly.
            client.set_input(input).await?;
            if !settings.fast_mode && settings.verify_after_set {
                let mut verified = false;
                for _ in 0..2 {
                    tokio::time::sleep(Duration::from_millis(90)).await;
                    if client.get_active_input().await.ok() == Some(input) {
                        verified = true;
                        break;
                    }
                }
                if verified {
                    println!("Switched to input {} ({})", input, cfg.port_name(input));
                } else {
                    println!("Switched (unverified), device may still be settling");
                }
            } else {
                println!("Switched to input {} ({})", input, cfg.port_name(input));
            }
        }
        Command::Buzzer { state } => {
            client.set_buzzer(matches!(state, OnOff::On)).await?;
            println!("Buzzer {}", if matches!(state, OnOff::On) { "on" } else { "off" });
        }
        Command::LedTimeout { mode } => {
            client.set_led_timeout(mode.into()).await?;
            println!("LED timeout set");
        }
        Command::Ping => {
            client.ping().await?;
            println!("OK: {} answers", client.target_addr().await);
        }
        Command::Raw { hex, timeout_ms } => {
            let reply = client
                .raw_hex_send(&hex, Duration::from_millis(timeout_ms))
                .await?;
            if reply.is_empty() {
                println!("(no reply)");
            } else {
                println!("{reply}");
            }
        }
        Command::Net { action } => match action {
            NetAction::Get => {
                let net = client.get_network_config().await?;
                println!("IP:      {}", net.ip);
                println!("Port:    {}", net.port);
                println!("Mask:    {}", net.mask);
                println!("Gateway: {}", net.gateway);
            }
            NetAction::Set {
                ip,
                port,
                mask,
                gateway,
            } => {
                let settings = NetworkSettings {
                    ip,
                    port,
                    mask,
                    gateway,
                };
                client.set_network_config(&settings).await?;
                println!("Network settings sent.");
                println!("Power-cycle the switch for a new IP or port to take effect.");
            }
        },
        Command::Watch => {
            watch(client, &cfg).await?;
        }
    }

    Ok(())
}

/// Runs the polling coordinator and prints its events until Ctrl-C.
async fn watch(client: Arc<DeviceClient>, cfg: &AppConfig) -> anyhow::Result<()> {
    info!(target = %cfg.target_addr(), "watching active input, Ctrl-C to stop");

    let (monitor, mut events) = SwitchMonitor::start(client, MonitorSettings::from(cfg));

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(MonitorEvent::ActiveChanged(port)) => {
                        println!("Active: {} ({})", port, cfg.port_name(port));
                    }
                    Some(MonitorEvent::Status(message)) => {
                        tracing::debug!(%message, "monitor status");
                    }
                    Some(MonitorEvent::Error(message)) => {
                        eprintln!("error: {message}");
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    monitor.stop().await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
