use crate::dashboard::DashboardSink;
use crate::forwarder::Forwarder;
use crate::occupancy::{OccupancyEvent, OccupancyMachine, SITTING_FIELD};
use crate::sensor::Reading;
use crate::server::stats::Stats;
use crate::state::LogEntry;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Per-datagram processing, owned by the dispatcher task.
pub struct Pipeline {
    stats: Stats,
    forwarder: Forwarder,
    occupancy: OccupancyMachine,
    sink: Arc<dyn DashboardSink>,
}

impl Pipeline {
    pub fn new(
        forwarder: Forwarder,
        occupancy: OccupancyMachine,
        sink: Arc<dyn DashboardSink>,
    ) -> Self {
        Self {
            stats: Stats::new(),
            forwarder,
            occupancy,
            sink,
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn occupancy(&self) -> &OccupancyMachine {
        &self.occupancy
    }

    /// Decode one datagram and run it through the hub. Malformed payloads
    /// are logged and dropped.
    pub fn handle_datagram(&mut self, payload: &[u8]) {
        let reading = match Reading::from_slice(payload) {
            Ok(reading) => reading,
            Err(err) => {
                warn!(error = %err, bytes = payload.len(), "Error handling sensor data");
                self.sink.on_log(LogEntry::error(format!("Error: {err}")));
                return;
            }
        };

        if self.occupancy.matches(&reading) {
            if reading.flag(SITTING_FIELD).is_none() {
                self.sink.on_log(LogEntry::warning(format!(
                    "Occupancy reading from {} has no boolean `{SITTING_FIELD}` field",
                    reading.display_id()
                )));
            }
            if self.occupancy.apply(&reading, Instant::now()) {
                self.sink.on_occupancy(&self.occupancy.snapshot());
            }
        }

        self.ingest(reading);
    }

    /// Common path shared by sensed and synthesized readings.
    pub fn ingest(&mut self, reading: Reading) {
        self.stats.record(reading.sensor_type);

        let message = format!(
            "Processed {} data (sensor_id: {})",
            reading.sensor_type,
            reading.display_id()
        );
        info!(
            sensor_type = %reading.sensor_type,
            sensor_id = reading.display_id(),
            "Processed reading"
        );
        self.sink.on_log(LogEntry::success(message));
        self.sink.on_reading(&reading);
        self.sink.on_stats(&self.stats);

        self.forwarder.send(&reading);
    }

    pub fn handle_occupancy_event(&mut self, event: OccupancyEvent) {
        match event {
            OccupancyEvent::Tick { episode } => {
                if let Some(reading) = self.occupancy.on_tick(episode) {
                    self.ingest(reading);
                    self.sink.on_occupancy(&self.occupancy.snapshot());
                }
            }
            OccupancyEvent::DeferredCheck => {
                if self.occupancy.on_deferred_check(Instant::now()) {
                    self.sink.on_log(LogEntry::info(
                        "Alert process restarted after sustained absence",
                    ));
                    self.sink.on_occupancy(&self.occupancy.snapshot());
                }
            }
            OccupancyEvent::AlertExited { generation, code } => {
                self.occupancy.on_alert_exit(generation, code);
                self.sink.on_occupancy(&self.occupancy.snapshot());
            }
        }
    }

    /// Tear down ticker, alert process and outbound socket. Idempotent.
    pub fn shutdown(&mut self) {
        self.occupancy.shutdown();
        self.forwarder.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::NullDashboard;
    use crate::occupancy::mock::MockAlertLauncher;
    use crate::occupancy::{AlertSupervisor, OccupancyConfig, OccupancySnapshot};
    use crate::sensor::SensorType;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingSink {
        readings: Mutex<Vec<Reading>>,
        stats: Mutex<Vec<Stats>>,
        logs: Mutex<Vec<LogEntry>>,
        occupancy: Mutex<Vec<OccupancySnapshot>>,
    }

    impl DashboardSink for RecordingSink {
        fn on_reading(&self, reading: &Reading) {
            self.readings.lock().expect("readings lock").push(reading.clone());
        }
        fn on_stats(&self, stats: &Stats) {
            self.stats.lock().expect("stats lock").push(stats.clone());
        }
        fn on_log(&self, entry: LogEntry) {
            self.logs.lock().expect("logs lock").push(entry);
        }
        fn on_occupancy(&self, snapshot: &OccupancySnapshot) {
            self.occupancy.lock().expect("occupancy lock").push(*snapshot);
        }
    }

    fn pipeline(
        sink: Arc<dyn DashboardSink>,
    ) -> (Pipeline, mpsc::UnboundedReceiver<OccupancyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let alert = AlertSupervisor::new(Box::new(MockAlertLauncher::new()), tx.clone());
        let config = OccupancyConfig {
            sensor_id: "sofa".to_string(),
            tick_interval: Duration::from_millis(100),
            progress_ceiling: 100,
            sustained_false: Duration::from_secs(10),
            deferred_check_delay: Duration::from_secs(11),
            launch_alert_on_start: false,
        };
        let occupancy = OccupancyMachine::new(config, alert, tx);
        (Pipeline::new(Forwarder::new("127.0.0.1", 9), occupancy, sink), rx)
    }

    #[tokio::test]
    async fn counts_readings_per_type() {
        let sink = Arc::new(RecordingSink::default());
        let (mut pipeline, _rx) = pipeline(Arc::<RecordingSink>::clone(&sink));

        for _ in 0..3 {
            pipeline
                .handle_datagram(br#"{"sensor_type":"temperature","sensor_id":"t1","value":21.5}"#);
        }
        pipeline.handle_datagram(br#"{"sensor_type":"PRESSURE","sensor_id":"p9","value":1001}"#);
        pipeline.handle_datagram(br#"{"sensor_type":"pressure","value":999}"#);

        assert_eq!(pipeline.stats().get(SensorType::Temperature), 3);
        assert_eq!(pipeline.stats().get(SensorType::Pressure), 2);
        assert_eq!(pipeline.stats().total(), 5);
        assert_eq!(sink.readings.lock().expect("readings lock").len(), 5);
        assert_eq!(
            sink.stats.lock().expect("stats lock").last().map(Stats::total),
            Some(5)
        );
    }

    #[tokio::test]
    async fn malformed_datagram_only_logs_error() {
        let sink = Arc::new(RecordingSink::default());
        let (mut pipeline, _rx) = pipeline(Arc::<RecordingSink>::clone(&sink));

        pipeline.handle_datagram(b"{\"sensor_type\": \"temperature\"");
        pipeline.handle_datagram(b"42");

        assert_eq!(pipeline.stats().total(), 0);
        assert!(sink.readings.lock().expect("readings lock").is_empty());
        let logs = sink.logs.lock().expect("logs lock");
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|entry| entry.level == crate::state::LogLevel::Error));
    }

    #[tokio::test]
    async fn occupancy_reading_also_takes_common_path() {
        let sink = Arc::new(RecordingSink::default());
        let (mut pipeline, _rx) = pipeline(Arc::<RecordingSink>::clone(&sink));

        pipeline.handle_datagram(br#"{"sensor_type":"fsr","sensor_id":"sofa","sitting":true}"#);

        assert!(pipeline.occupancy().is_sitting());
        assert_eq!(pipeline.stats().get(SensorType::Fsr), 1);
        let snapshots = sink.occupancy.lock().expect("occupancy lock");
        assert_eq!(snapshots.last().map(|s| s.sitting), Some(true));
    }

    #[tokio::test]
    async fn other_fsr_sensors_do_not_drive_occupancy() {
        let sink = Arc::new(RecordingSink::default());
        let (mut pipeline, _rx) = pipeline(Arc::<RecordingSink>::clone(&sink));

        pipeline.handle_datagram(br#"{"sensor_type":"fsr","sensor_id":"chair","sitting":true}"#);

        assert!(!pipeline.occupancy().is_sitting());
        assert_eq!(pipeline.stats().get(SensorType::Fsr), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_ticks_are_ingested_as_readings() {
        let sink = Arc::new(RecordingSink::default());
        let (mut pipeline, mut rx) = pipeline(Arc::<RecordingSink>::clone(&sink));
        pipeline.handle_datagram(br#"{"sensor_type":"fsr","sensor_id":"sofa","sitting":true}"#);

        for _ in 0..5 {
            if let Some(event) = rx.recv().await {
                pipeline.handle_occupancy_event(event);
            }
        }

        assert_eq!(pipeline.stats().get(SensorType::SofaProgress), 5);
        let readings = sink.readings.lock().expect("readings lock");
        let last = readings.last().expect("progress reading");
        assert_eq!(last.sensor_type, SensorType::SofaProgress);
        assert_eq!(last.fields.get("progress"), Some(&serde_json::json!(5)));
    }

    #[tokio::test]
    async fn occupancy_reading_without_flag_logs_warning() {
        let sink = Arc::new(RecordingSink::default());
        let (mut pipeline, _rx) = pipeline(Arc::<RecordingSink>::clone(&sink));

        pipeline.handle_datagram(br#"{"sensor_type":"fsr","sensor_id":"sofa","sitting":"yes"}"#);

        assert!(!pipeline.occupancy().is_sitting());
        assert_eq!(pipeline.stats().get(SensorType::Fsr), 1);
        let logs = sink.logs.lock().expect("logs lock");
        assert_eq!(
            logs.first().map(|entry| entry.level),
            Some(crate::state::LogLevel::Warning)
        );
        assert!(sink.occupancy.lock().expect("occupancy lock").is_empty());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (mut pipeline, _rx) = pipeline(Arc::new(NullDashboard));
        pipeline.handle_datagram(br#"{"sensor_type":"fsr","sensor_id":"sofa","sitting":true}"#);

        pipeline.shutdown();
        pipeline.shutdown();

        assert!(!pipeline.occupancy().alert_running());
    }
}
