//! Polling coordinator: periodic active-input polls reconciled against
//! user-initiated switches.
//!
//! A single background task asks the switch "what port is active?" once per
//! tick and publishes the answer.  The subtlety is the *pending-switch
//! window*: right after a user-initiated switch the device still reports
//! the old port for a poll or two, and naively publishing those readings
//! makes the UI highlight flicker back and forth.  The window records the
//! intended port and a deadline; polls that contradict the intent while the
//! window is open are ignored.  The design degrades gracefully: if the
//! device never reaches the intended port, the window expires and the
//! truthful reading wins.  This is preferable to pausing the poller, which
//! would hide a real failure.
//!
//! The device can also change input under a physical front-panel button;
//! that appears as a legitimate active-port change on the next tick.
//!
//! Exactly one polling task exists and ticks never overlap: each poll is
//! awaited inline and missed ticks are delayed, never stacked.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use tesmart_core::Result;

use crate::application::device_client::DeviceClient;
use crate::infrastructure::storage::config::AppConfig;

/// Delay between the two post-switch verification polls.
const VERIFY_SPACING: Duration = Duration::from_millis(90);

/// Number of post-switch verification polls.
const VERIFY_ATTEMPTS: u32 = 2;

/// Events published to the UI collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// The published active port changed.  Coalesced: fires only on change.
    ActiveChanged(u8),
    /// Free-text human-readable status line.
    Status(String),
    /// A user-initiated switch failed.  Per-tick polling errors are
    /// reported as `Status` lines instead; the coordinator never stops
    /// ticking because of them.
    Error(String),
}

/// Timing and behaviour knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Tick period for the background poll.
    pub poll_interval: Duration,
    /// How long polls contradicting a fresh switch intent are suppressed.
    pub switch_suppress: Duration,
    /// Skip post-switch verification entirely; reconcile on the next tick.
    pub fast_mode: bool,
    /// Poll twice at 90 ms spacing after a switch to confirm it landed.
    pub verify_after_set: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            switch_suppress: Duration::from_millis(800),
            fast_mode: false,
            verify_after_set: true,
        }
    }
}

impl From<&AppConfig> for MonitorSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            switch_suppress: cfg.switch_suppress(),
            fast_mode: cfg.fast_mode,
            verify_after_set: cfg.verify_after_set,
        }
    }
}

// ── Pending-switch window ─────────────────────────────────────────────────────

/// Intent recorded by a user-initiated switch: the target port and the
/// deadline after which stale polled readings stop being suppressed.
///
/// `intent == 0` means no pending switch.  A deadline in the past means the
/// window is inactive regardless of intent.  Critical sections only touch
/// these two fields and are never held across I/O.
#[derive(Debug)]
struct PendingWindow {
    state: StdMutex<PendingState>,
}

#[derive(Debug)]
struct PendingState {
    intent: u8,
    until: Instant,
}

impl PendingWindow {
    fn new() -> Self {
        Self {
            state: StdMutex::new(PendingState {
                intent: 0,
                until: Instant::now(),
            }),
        }
    }

    /// Arms the window: polls disagreeing with `intent` are ignored until
    /// the deadline.
    fn arm(&self, intent: u8, suppress: Duration) {
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        s.intent = intent;
        s.until = Instant::now() + suppress;
    }

    /// True iff the window is active and `polled` contradicts the intent.
    fn should_ignore(&self, polled: u8) -> bool {
        let s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Instant::now() < s.until && polled != s.intent
    }

    /// Deactivates the window immediately when the polled port matches the
    /// intent; convergence is detected, no need to wait for the deadline.
    fn clear_if_match(&self, polled: u8) {
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if polled == s.intent {
            s.until = Instant::now();
        }
    }

    /// Drops any pending intent, e.g. after a failed switch.
    fn reset(&self) {
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        s.intent = 0;
        s.until = Instant::now();
    }
}

// ── Event publisher ───────────────────────────────────────────────────────────

/// Shared publishing state: coalesces `ActiveChanged` across the poll task
/// and the switch path.
struct Publisher {
    last_active: StdMutex<Option<u8>>,
    event_tx: mpsc::Sender<MonitorEvent>,
}

impl Publisher {
    /// Publishes `port` if it differs from the last published value.
    async fn publish_active(&self, port: u8) {
        let changed = {
            let mut last = self.last_active.lock().unwrap_or_else(|e| e.into_inner());
            if *last != Some(port) {
                *last = Some(port);
                true
            } else {
                false
            }
        };
        if changed {
            let _ = self.event_tx.send(MonitorEvent::ActiveChanged(port)).await;
        }
    }

    async fn status(&self, message: impl Into<String>) {
        let _ = self.event_tx.send(MonitorEvent::Status(message.into())).await;
    }

    async fn error(&self, message: impl Into<String>) {
        let _ = self.event_tx.send(MonitorEvent::Error(message.into())).await;
    }
}

// ── The coordinator ───────────────────────────────────────────────────────────

/// Owns the background poll task and the pending-switch window.
///
/// Created with [`SwitchMonitor::start`], which returns the monitor together
/// with the event receiver; stopped with [`SwitchMonitor::stop`], which lets
/// the current tick run to completion.
pub struct SwitchMonitor {
    client: Arc<DeviceClient>,
    settings: MonitorSettings,
    pending: Arc<PendingWindow>,
    publisher: Arc<Publisher>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SwitchMonitor {
    /// Spawns the poll task and returns the monitor plus the event receiver.
    ///
    /// The first poll fires immediately, then every `poll_interval`.
    pub fn start(
        client: Arc<DeviceClient>,
        settings: MonitorSettings,
    ) -> (Self, mpsc::Receiver<MonitorEvent>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pending = Arc::new(PendingWindow::new());
        let publisher = Arc::new(Publisher {
            last_active: StdMutex::new(None),
            event_tx,
        });

        let task = tokio::spawn(poll_loop(
            Arc::clone(&client),
            settings.poll_interval,
            Arc::clone(&pending),
            Arc::clone(&publisher),
            shutdown_rx,
        ));

        let monitor = Self {
            client,
            settings,
            pending,
            publisher,
            shutdown_tx,
            task,
        };
        (monitor, event_rx)
    }

    /// User-initiated switch to `port`.
    ///
    /// Arms the pending window *before* sending so the very next poll tick
    /// already suppresses stale readings, then performs the switch and the
    /// configured verification.  A failed switch resets the window so the
    /// poller resumes unconditional reporting.
    ///
    /// # Errors
    ///
    /// Propagates the [`DeviceClient::set_input`] error after resetting the
    /// pending window and publishing it.
    pub async fn switch_to(&self, port: u8) -> Result<()> {
        self.pending.arm(port, self.settings.switch_suppress);

        if let Err(e) = self.client.set_input(port).await {
            self.pending.reset();
            self.publisher.status("Switch failed").await;
            self.publisher.error(e.to_string()).await;
            return Err(e);
        }

        if self.settings.fast_mode {
            self.publisher
                .status(format!("Switched (fast) to input {port}"))
                .await;
            return Ok(());
        }

        if self.settings.verify_after_set {
            let mut verified = false;
            for _ in 0..VERIFY_ATTEMPTS {
                tokio::time::sleep(VERIFY_SPACING).await;
                if let Ok(current) = self.client.get_active_input().await {
                    if current == port {
                        verified = true;
                        break;
                    }
                }
            }
            if verified {
                self.pending.clear_if_match(port);
                self.publisher.publish_active(port).await;
                self.publisher
                    .status(format!("Switched to input {port}"))
                    .await;
            } else {
                debug!(port, "switch unverified, deferring to poller");
                self.publisher
                    .status("Switched (unverified), will sync on next poll")
                    .await;
            }
            return Ok(());
        }

        self.publisher
            .status(format!("Switched to input {port}"))
            .await;
        Ok(())
    }

    /// Signals shutdown and waits for the poll task to finish its current
    /// tick.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

/// The background poll task.
async fn poll_loop(
    client: Arc<DeviceClient>,
    interval: Duration,
    pending: Arc<PendingWindow>,
    publisher: Arc<Publisher>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // A tick that arrives while a slow poll is still in flight is delayed,
    // not stacked: polls never overlap.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poll_once(&client, &pending, &publisher).await;
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    trace!("poll loop shutting down");
                    return;
                }
            }
        }
    }
}

/// One poll tick: query, suppress or publish.
async fn poll_once(client: &DeviceClient, pending: &PendingWindow, publisher: &Publisher) {
    let port = match client.get_active_input().await {
        Ok(port) => port,
        Err(e) => {
            // Non-fatal: report and keep the last known highlight untouched.
            warn!(error = %e, "poll failed");
            publisher.status(format!("Polling error: {e}")).await;
            return;
        }
    };

    if pending.should_ignore(port) {
        trace!(port, "suppressed stale poll during pending switch");
        return;
    }
    pending.clear_if_match(port);

    publisher.publish_active(port).await;
    publisher.status(format!("Active: {port}")).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
