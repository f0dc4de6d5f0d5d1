use crate::occupancy::OccupancySnapshot;
use crate::sensor::Reading;
use crate::server::stats::Stats;
use crate::state::{DashboardState, LogEntry};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Receiver of user-visible hub events.
///
/// Called from the ingestion dispatcher: implementations must return quickly
/// and must not panic.
pub trait DashboardSink: Send + Sync {
    fn on_reading(&self, reading: &Reading);
    fn on_stats(&self, stats: &Stats);
    fn on_log(&self, entry: LogEntry);
    fn on_occupancy(&self, _snapshot: &OccupancySnapshot) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDashboard;

impl DashboardSink for NullDashboard {
    fn on_reading(&self, _reading: &Reading) {}
    fn on_stats(&self, _stats: &Stats) {}
    fn on_log(&self, _entry: LogEntry) {}
}

/// Writes into the shared [`DashboardState`] served by the API.
#[derive(Debug, Clone)]
pub struct SharedDashboard {
    state: Arc<RwLock<DashboardState>>,
}

impl SharedDashboard {
    pub fn new(state: Arc<RwLock<DashboardState>>) -> Self {
        Self { state }
    }

    fn update(&self, apply: impl FnOnce(&mut DashboardState)) {
        match self.state.write() {
            Ok(mut guard) => apply(&mut guard),
            Err(_) => warn!("Dashboard state lock poisoned, dropping update"),
        }
    }
}

impl DashboardSink for SharedDashboard {
    fn on_reading(&self, reading: &Reading) {
        match self.state.read() {
            Ok(guard) => guard.publish_reading(reading.clone()),
            Err(_) => warn!("Dashboard state lock poisoned, dropping reading"),
        }
    }

    fn on_stats(&self, stats: &Stats) {
        self.update(|state| state.set_stats(stats.clone()));
    }

    fn on_log(&self, entry: LogEntry) {
        self.update(|state| state.push_log(entry));
    }

    fn on_occupancy(&self, snapshot: &OccupancySnapshot) {
        self.update(|state| state.set_occupancy(*snapshot));
    }
}
