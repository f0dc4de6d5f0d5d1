use crate::sensor::SensorType;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Per-type reading counters, one slot for every [`SensorType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    counts: [u64; SensorType::COUNT],
}

impl Stats {
    pub fn new() -> Self {
        Self {
            counts: [0; SensorType::COUNT],
        }
    }

    pub fn record(&mut self, sensor_type: SensorType) {
        self.counts[sensor_type.index()] += 1;
    }

    pub fn get(&self, sensor_type: SensorType) -> u64 {
        self.counts[sensor_type.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SensorType, u64)> + '_ {
        SensorType::ALL
            .into_iter()
            .map(|sensor_type| (sensor_type, self.get(sensor_type)))
    }

    pub fn non_zero(&self) -> impl Iterator<Item = (SensorType, u64)> + '_ {
        self.iter().filter(|(_, count)| *count > 0)
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for Stats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(SensorType::COUNT))?;
        for (sensor_type, count) in self.iter() {
            map.serialize_entry(sensor_type.as_str(), &count)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_for_every_type() {
        let stats = Stats::new();
        assert_eq!(stats.iter().count(), SensorType::COUNT);
        assert!(stats.iter().all(|(_, count)| count == 0));
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn record_only_touches_one_counter() {
        let mut stats = Stats::new();
        stats.record(SensorType::Temperature);
        stats.record(SensorType::Temperature);
        stats.record(SensorType::Unknown);

        assert_eq!(stats.get(SensorType::Temperature), 2);
        assert_eq!(stats.get(SensorType::Unknown), 1);
        assert_eq!(stats.get(SensorType::Pressure), 0);
        assert_eq!(
            stats.non_zero().collect::<Vec<_>>(),
            vec![(SensorType::Temperature, 2), (SensorType::Unknown, 1)]
        );
    }

    #[test]
    fn serializes_every_type_by_wire_name() -> Result<(), serde_json::Error> {
        let mut stats = Stats::new();
        stats.record(SensorType::SofaProgress);

        let value = serde_json::to_value(&stats)?;
        let object = value.as_object().expect("stats serialize as a map");

        assert_eq!(object.len(), SensorType::COUNT);
        assert_eq!(object.get("sofa_progress"), Some(&serde_json::json!(1)));
        assert_eq!(object.get("fsr"), Some(&serde_json::json!(0)));
        Ok(())
    }
}
