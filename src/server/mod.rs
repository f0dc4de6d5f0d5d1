//! UDP ingestion server.
//!
//! A single task owns the inbound socket and the [`Pipeline`]: datagrams and
//! occupancy timer events are handled one at a time in arrival order, so the
//! counters and occupancy state need no locking.

use crate::dashboard::DashboardSink;
use crate::error::AppError;
use crate::forwarder::Forwarder;
use crate::occupancy::{
    AlertLauncher, AlertSupervisor, OccupancyConfig, OccupancyEvent, OccupancyMachine,
};
use crate::state::LogEntry;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub mod pipeline;
pub mod stats;

pub use pipeline::Pipeline;
pub use stats::Stats;

/// Largest datagram accepted; longer payloads are truncated by the OS.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub ingest_host: String,
    pub ingest_port: u16,
    pub forward_host: String,
    pub forward_port: u16,
    pub occupancy: OccupancyConfig,
}

pub struct IngestServer {
    socket: UdpSocket,
    pipeline: Pipeline,
    events: mpsc::UnboundedReceiver<OccupancyEvent>,
    sink: Arc<dyn DashboardSink>,
}

impl IngestServer {
    /// Bind the inbound endpoint and wire up forwarding and occupancy.
    ///
    /// Failing to bind is the only fatal startup error. Without a launcher
    /// the occupancy machine runs with the alert process disabled.
    pub async fn bind(
        settings: ServerSettings,
        launcher: Option<Box<dyn AlertLauncher>>,
        sink: Arc<dyn DashboardSink>,
    ) -> Result<Self, AppError> {
        let addr = format!("{}:{}", settings.ingest_host, settings.ingest_port);
        let socket = UdpSocket::bind((settings.ingest_host.as_str(), settings.ingest_port))
            .await
            .map_err(|source| AppError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let mut forwarder = Forwarder::new(settings.forward_host, settings.forward_port);
        forwarder.connect().await;

        let (events_tx, events) = mpsc::unbounded_channel();
        let alert = match launcher {
            Some(launcher) => AlertSupervisor::new(launcher, events_tx.clone()),
            None => AlertSupervisor::disabled(events_tx.clone()),
        };
        let mut occupancy = OccupancyMachine::new(settings.occupancy, alert, events_tx);
        occupancy.start();
        sink.on_occupancy(&occupancy.snapshot());

        let pipeline = Pipeline::new(forwarder, occupancy, Arc::clone(&sink));

        match socket.local_addr() {
            Ok(local) => info!(addr = %local, "UDP server listening"),
            Err(_) => info!(addr = %addr, "UDP server listening"),
        }
        sink.on_log(LogEntry::info(format!("UDP server listening on {addr}")));

        Ok(Self {
            socket,
            pipeline,
            events,
            sink,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serve until `shutdown` resolves, then release every resource.
    /// Returns the final counters.
    pub async fn run<F>(mut self, shutdown: F) -> Stats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => {
                        debug!(bytes = len, peer = %peer, "Received datagram");
                        self.pipeline.handle_datagram(&buf[..len]);
                    }
                    Err(err) => warn!(error = %err, "UDP receive error"),
                },
                Some(event) = self.events.recv() => {
                    self.pipeline.handle_occupancy_event(event);
                }
            }
        }

        self.pipeline.shutdown();
        let stats = self.pipeline.stats().clone();
        log_stats(&stats);
        self.sink.on_log(LogEntry::info("Server stopped"));
        stats
    }
}

/// Print non-zero counters.
pub fn log_stats(stats: &Stats) {
    info!(total = stats.total(), "Sensor statistics");
    for (sensor_type, count) in stats.non_zero() {
        info!(sensor_type = %sensor_type, count, "Sensor count");
    }
}
