use crate::error::ParseError;
use crate::osc::OscArg;
use crate::sensor::{RESERVED_KEYS, SensorType};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

const ADDRESS_ROOT: &str = "/sensor";

/// Field carrying the synthesized progress value.
pub const PROGRESS_FIELD: &str = "progress";

/// One normalized sensor sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub sensor_type: SensorType,
    pub sensor_id: Option<String>,
    pub timestamp: Option<f64>,
    pub fields: BTreeMap<String, Value>,
}

impl Reading {
    pub fn new(sensor_type: SensorType, sensor_id: Option<String>) -> Self {
        Self {
            sensor_type,
            sensor_id,
            timestamp: None,
            fields: BTreeMap::new(),
        }
    }

    /// Decode one inbound datagram.
    pub fn from_slice(payload: &[u8]) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(payload)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        let Value::Object(object) = value else {
            return Err(ParseError::NotAnObject);
        };

        // Non-string types degrade like unrecognized names.
        let sensor_type = object
            .get("sensor_type")
            .and_then(Value::as_str)
            .map(SensorType::from_name)
            .unwrap_or(SensorType::Unknown);

        let sensor_id = match object.get("sensor_id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };

        let timestamp = object.get("timestamp").and_then(Value::as_f64);

        let fields = object
            .into_iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .collect();

        Ok(Self {
            sensor_type,
            sensor_id,
            timestamp,
            fields,
        })
    }

    /// Synthetic progress reading emitted while someone is sitting.
    pub fn progress(sensor_id: &str, value: u32) -> Self {
        let mut reading = Self::new(SensorType::SofaProgress, Some(sensor_id.to_string()));
        reading
            .fields
            .insert(PROGRESS_FIELD.to_string(), Value::from(value));
        reading
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Boolean field lookup; non-boolean values yield `None`.
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.fields.get(name).and_then(Value::as_bool)
    }

    /// `/sensor/<type>` or `/sensor/<type>/<id>`. An empty id counts as absent.
    pub fn osc_address(&self) -> String {
        match self.sensor_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => format!("{ADDRESS_ROOT}/{}/{id}", self.sensor_type),
            None => format!("{ADDRESS_ROOT}/{}", self.sensor_type),
        }
    }

    /// Positional OSC arguments: numeric fields in ascending key order.
    ///
    /// Receivers read arguments by position, so the order must be stable.
    /// Non-numeric fields stay on the reading for the dashboard but are not
    /// forwarded. A reading without numeric fields projects to `[0.0]`.
    pub fn osc_args(&self) -> Vec<OscArg> {
        let args: Vec<OscArg> = self
            .fields
            .values()
            .filter_map(Value::as_f64)
            .map(OscArg::Number)
            .collect();

        if args.is_empty() {
            vec![OscArg::Number(0.0)]
        } else {
            args
        }
    }

    pub fn display_id(&self) -> &str {
        self.sensor_id.as_deref().unwrap_or("N/A")
    }
}
