//! Emits a repeating cycle of synthetic sensor readings to the hub.
//!
//! Usage: `test-sender [host] [port]` (defaults to 127.0.0.1:5000).

use serde_json::{Value, json};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const SEND_INTERVAL: Duration = Duration::from_secs(1);

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt().with_target(false).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}

/// Smooth value in `[center - spread, center + spread]` for step `n`.
fn wave(n: u64, phase: f64, center: f64, spread: f64) -> f64 {
    center + spread * ((n as f64) * 0.37 + phase).sin()
}

fn reading(sensor_type: &str, step: u64) -> Value {
    let timestamp = unix_seconds();
    match sensor_type {
        "accelerometer" => json!({
            "sensor_type": sensor_type,
            "sensor_id": "accel_001",
            "x": wave(step, 0.0, 0.0, 10.0),
            "y": wave(step, 1.3, 0.0, 10.0),
            "z": wave(step, 2.6, 0.0, 10.0),
            "timestamp": timestamp,
        }),
        "gyroscope" => json!({
            "sensor_type": sensor_type,
            "sensor_id": "gyro_001",
            "x": wave(step, 0.5, 0.0, 180.0),
            "y": wave(step, 1.8, 0.0, 180.0),
            "z": wave(step, 3.1, 0.0, 180.0),
            "timestamp": timestamp,
        }),
        "temperature" => json!({
            "sensor_type": sensor_type,
            "sensor_id": "temp_001",
            "value": wave(step, 0.0, 25.0, 10.0),
            "timestamp": timestamp,
        }),
        _ => json!({
            "sensor_type": "pressure",
            "sensor_id": "pressure_001",
            "value": wave(step, 0.0, 1000.0, 20.0),
            "timestamp": timestamp,
        }),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = match args.next() {
        Some(raw) => raw.parse::<u16>()?,
        None => DEFAULT_PORT,
    };

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    tracing::info!(host = %host, port, "Sending test sensor data, Ctrl+C to stop");

    let cycle = ["accelerometer", "gyroscope", "temperature", "pressure"];
    let mut step: u64 = 0;
    let mut interval = tokio::time::interval(SEND_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopped sending test data");
                return Ok(());
            }
            _ = interval.tick() => {
                let sensor_type = cycle[(step % cycle.len() as u64) as usize];
                let payload = serde_json::to_vec(&reading(sensor_type, step))?;
                socket.send_to(&payload, (host.as_str(), port)).await?;
                tracing::info!(sensor_type, bytes = payload.len(), "Sent reading");
                step += 1;
            }
        }
    }
}
