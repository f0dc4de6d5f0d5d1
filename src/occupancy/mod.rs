//! Presence state machine for the sofa force-sensitive resistor.
//!
//! The machine is owned by the ingestion dispatcher and only mutated from
//! there. Timers run as separate tasks that post [`OccupancyEvent`]s back to
//! the dispatcher, so every state read and write happens on one task.

use crate::sensor::{Reading, SensorType};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub mod alert;
pub mod mock;

pub use alert::{AlertChild, AlertCommand, AlertLauncher, AlertSupervisor, CommandLauncher};

/// Boolean field of an occupancy reading.
pub const SITTING_FIELD: &str = "sitting";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyConfig {
    pub sensor_id: String,
    pub tick_interval: Duration,
    pub progress_ceiling: u32,
    pub sustained_false: Duration,
    pub deferred_check_delay: Duration,
    pub launch_alert_on_start: bool,
}

/// Timer and process notifications delivered to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OccupancyEvent {
    Tick { episode: u64 },
    DeferredCheck,
    AlertExited { generation: u64, code: Option<i32> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OccupancySnapshot {
    pub sitting: bool,
    /// In `0..=progress_ceiling`; holds the ceiling itself once an episode completes.
    pub progress: u32,
    pub alert_running: bool,
}

struct Ticker {
    episode: u64,
    handle: JoinHandle<()>,
}

struct OccupancyState {
    sitting: bool,
    progress: u32,
    last_false_at: Instant,
    sat_at: Option<Instant>,
    ticker: Option<Ticker>,
    episode: u64,
}

pub struct OccupancyMachine {
    config: OccupancyConfig,
    state: OccupancyState,
    alert: AlertSupervisor,
    events: mpsc::UnboundedSender<OccupancyEvent>,
}

impl OccupancyMachine {
    pub fn new(
        config: OccupancyConfig,
        alert: AlertSupervisor,
        events: mpsc::UnboundedSender<OccupancyEvent>,
    ) -> Self {
        Self {
            config,
            state: OccupancyState {
                sitting: false,
                progress: 0,
                last_false_at: Instant::now(),
                sat_at: None,
                ticker: None,
                episode: 0,
            },
            alert,
            events,
        }
    }

    pub fn start(&mut self) {
        if self.config.launch_alert_on_start {
            self.alert.start();
        }
    }

    /// True for the configured FSR sensor.
    pub fn matches(&self, reading: &Reading) -> bool {
        reading.sensor_type == SensorType::Fsr
            && reading.sensor_id.as_deref() == Some(self.config.sensor_id.as_str())
    }

    pub fn is_sitting(&self) -> bool {
        self.state.sitting
    }

    pub fn progress(&self) -> u32 {
        self.state.progress
    }

    pub fn alert_running(&self) -> bool {
        self.alert.is_running()
    }

    pub fn snapshot(&self) -> OccupancySnapshot {
        OccupancySnapshot {
            sitting: self.state.sitting,
            progress: self.state.progress,
            alert_running: self.alert.is_running(),
        }
    }

    /// Feed an occupancy reading. Returns true when the state changed.
    pub fn apply(&mut self, reading: &Reading, now: Instant) -> bool {
        let Some(sitting) = reading.flag(SITTING_FIELD) else {
            warn!(
                sensor_id = reading.display_id(),
                "Occupancy reading without boolean `sitting` field"
            );
            return false;
        };

        match (self.state.sitting, sitting) {
            (false, true) => {
                self.enter_sitting(now);
                true
            }
            (true, false) => {
                self.enter_standing(now);
                true
            }
            _ => {
                debug!(sitting, "Occupancy unchanged");
                false
            }
        }
    }

    fn enter_sitting(&mut self, now: Instant) {
        self.state.sitting = true;
        self.state.sat_at = Some(now);
        info!(progress = self.state.progress, "Occupancy: sitting");
        if self.state.ticker.is_none() {
            self.start_ticker();
        }
    }

    fn enter_standing(&mut self, now: Instant) {
        let sat_for = self.state.sat_at.take().map(|sat_at| now.saturating_duration_since(sat_at));
        self.state.sitting = false;
        self.state.progress = 0;
        self.stop_ticker();
        self.alert.signal(0);
        self.state.last_false_at = now;
        info!(sat_for = ?sat_for, "Occupancy: standing");
        self.schedule_deferred_check();
    }

    fn start_ticker(&mut self) {
        self.state.episode += 1;
        let episode = self.state.episode;
        let period = self.config.tick_interval;
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if events.send(OccupancyEvent::Tick { episode }).is_err() {
                    return;
                }
            }
        });

        debug!(episode, interval_ms = period.as_millis(), "Progress ticker started");
        self.state.ticker = Some(Ticker { episode, handle });
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.state.ticker.take() {
            ticker.handle.abort();
            debug!(episode = ticker.episode, "Progress ticker stopped");
        }
    }

    // Not cancellable: the check re-reads state when it fires instead.
    fn schedule_deferred_check(&self) {
        let delay = self.config.deferred_check_delay;
        let events = self.events.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = events.send(OccupancyEvent::DeferredCheck);
        });
    }

    /// Advance progress by one. Returns the synthesized progress reading.
    pub fn on_tick(&mut self, episode: u64) -> Option<Reading> {
        let current = self.state.ticker.as_ref().map(|ticker| ticker.episode);
        if !self.state.sitting || current != Some(episode) {
            debug!(episode, "Ignoring stale progress tick");
            return None;
        }

        self.state.progress += 1;
        let progress = self.state.progress;

        if progress >= self.config.progress_ceiling {
            info!(progress, "Progress complete, stopping alert process");
            self.alert.stop();
            self.stop_ticker();
        } else {
            self.alert.signal(progress);
        }

        Some(Reading::progress(&self.config.sensor_id, progress))
    }

    /// Restart the alert process once standing has lasted long enough.
    pub fn on_deferred_check(&mut self, now: Instant) -> bool {
        if self.state.sitting {
            debug!("Deferred check superseded by a sit event");
            return false;
        }

        let standing_for = now.saturating_duration_since(self.state.last_false_at);
        if standing_for < self.config.sustained_false {
            debug!(
                standing_ms = standing_for.as_millis(),
                "Standing not sustained yet, alert left as is"
            );
            return false;
        }

        info!(
            standing_ms = standing_for.as_millis(),
            "Sustained standing, restarting alert process"
        );
        self.alert.restart();
        true
    }

    pub fn on_alert_exit(&mut self, generation: u64, code: Option<i32>) {
        self.alert.handle_exit(generation, code);
    }

    /// Stop the ticker and the alert process. Idempotent.
    pub fn shutdown(&mut self) {
        self.stop_ticker();
        self.alert.stop();
    }
}

impl Drop for OccupancyMachine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
