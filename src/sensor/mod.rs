use serde::Serialize;
use std::fmt;

pub mod reading;

pub use reading::Reading;

/// Reserved keys of an inbound payload; everything else is a sensor field.
pub const RESERVED_KEYS: [&str; 3] = ["sensor_type", "sensor_id", "timestamp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Accelerometer,
    Gyroscope,
    Magnetometer,
    Pressure,
    Temperature,
    Humidity,
    Light,
    Proximity,
    /// Force-sensitive resistor.
    Fsr,
    Mic,
    /// Progress values synthesized by the occupancy machine.
    SofaProgress,
    Unknown,
}

impl SensorType {
    pub const ALL: [SensorType; 12] = [
        SensorType::Accelerometer,
        SensorType::Gyroscope,
        SensorType::Magnetometer,
        SensorType::Pressure,
        SensorType::Temperature,
        SensorType::Humidity,
        SensorType::Light,
        SensorType::Proximity,
        SensorType::Fsr,
        SensorType::Mic,
        SensorType::SofaProgress,
        SensorType::Unknown,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Case-insensitive lookup. Unrecognized names map to [`SensorType::Unknown`].
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|sensor_type| sensor_type.as_str().eq_ignore_ascii_case(name))
            .unwrap_or(SensorType::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SensorType::Accelerometer => "accelerometer",
            SensorType::Gyroscope => "gyroscope",
            SensorType::Magnetometer => "magnetometer",
            SensorType::Pressure => "pressure",
            SensorType::Temperature => "temperature",
            SensorType::Humidity => "humidity",
            SensorType::Light => "light",
            SensorType::Proximity => "proximity",
            SensorType::Fsr => "fsr",
            SensorType::Mic => "mic",
            SensorType::SofaProgress => "sofa_progress",
            SensorType::Unknown => "unknown",
        }
    }

    /// Position in [`SensorType::ALL`], used to index fixed-size counters.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
