use crate::occupancy::OccupancySnapshot;
use crate::sensor::Reading;
use crate::server::stats::Stats;
use serde::Serialize;
use std::collections::VecDeque;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::{broadcast, watch};

pub const MAX_LOG_ENTRIES: usize = 1000;
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub message: String,
    pub timestamp: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: now_rfc3339(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Live update pushed to dashboard subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum DashboardEvent {
    Reading(Reading),
    Log(LogEntry),
}

/// Everything the dashboard shows. Written by the ingestion side through
/// [`crate::dashboard::SharedDashboard`], read by the HTTP API.
#[derive(Debug)]
pub struct DashboardState {
    logs: VecDeque<LogEntry>,
    events_tx: broadcast::Sender<DashboardEvent>,
    stats: Stats,
    stats_tx: watch::Sender<Stats>,
    occupancy: Option<OccupancySnapshot>,
    occupancy_tx: watch::Sender<Option<OccupancySnapshot>>,
}

impl DashboardState {
    pub fn new() -> Self {
        let (events_tx, _events_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (stats_tx, _stats_rx) = watch::channel(Stats::new());
        let (occupancy_tx, _occupancy_rx) = watch::channel(None);
        Self {
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            events_tx,
            stats: Stats::new(),
            stats_tx,
            occupancy: None,
            occupancy_tx,
        }
    }

    pub fn logs(&self) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter()
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }

    /// Append to the bounded log and broadcast it.
    pub fn push_log(&mut self, entry: LogEntry) {
        if self.logs.len() == MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(entry.clone());
        // No subscribers is fine.
        let _ = self.events_tx.send(DashboardEvent::Log(entry));
    }

    pub fn publish_reading(&self, reading: Reading) {
        let _ = self.events_tx.send(DashboardEvent::Reading(reading));
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events_tx.subscribe()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<Stats> {
        self.stats_tx.subscribe()
    }

    pub fn set_stats(&mut self, stats: Stats) {
        self.stats = stats.clone();
        self.stats_tx.send_replace(stats);
    }

    pub fn occupancy(&self) -> Option<&OccupancySnapshot> {
        self.occupancy.as_ref()
    }

    pub fn subscribe_occupancy(&self) -> watch::Receiver<Option<OccupancySnapshot>> {
        self.occupancy_tx.subscribe()
    }

    pub fn set_occupancy(&mut self, occupancy: OccupancySnapshot) {
        self.occupancy = Some(occupancy);
        self.occupancy_tx.send_replace(Some(occupancy));
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}
