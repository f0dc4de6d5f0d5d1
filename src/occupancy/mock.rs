use crate::error::ProcessError;
use crate::occupancy::OccupancyEvent;
use crate::occupancy::alert::{AlertChild, AlertLauncher};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct MockAlertRecord {
    fail_launch: bool,
    launches: Vec<u64>,
    progress: Vec<(u64, u32)>,
    terminations: Vec<u64>,
}

/// Shared view of everything a [`MockAlertLauncher`] and its children did.
#[derive(Debug, Clone, Default)]
pub struct MockAlertLog {
    inner: Arc<Mutex<MockAlertRecord>>,
}

impl MockAlertLog {
    fn lock(&self) -> MutexGuard<'_, MockAlertRecord> {
        // A panicking test thread must not hide the record from the others.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_fail_launch(&self, fail: bool) {
        self.lock().fail_launch = fail;
    }

    pub fn launches(&self) -> usize {
        self.lock().launches.len()
    }

    pub fn launched_generations(&self) -> Vec<u64> {
        self.lock().launches.clone()
    }

    pub fn terminations(&self) -> usize {
        self.lock().terminations.len()
    }

    /// Every progress value written, across all launches.
    pub fn progress_values(&self) -> Vec<u32> {
        self.lock().progress.iter().map(|(_, value)| *value).collect()
    }

    pub fn progress_values_for(&self, generation: u64) -> Vec<u32> {
        self.lock()
            .progress
            .iter()
            .filter(|(g, _)| *g == generation)
            .map(|(_, value)| *value)
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockAlertLauncher {
    log: MockAlertLog,
}

impl MockAlertLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let launcher = Self::default();
        launcher.log.set_fail_launch(true);
        launcher
    }

    pub fn log(&self) -> MockAlertLog {
        self.log.clone()
    }
}

impl AlertLauncher for MockAlertLauncher {
    fn launch(
        &mut self,
        generation: u64,
        _events: mpsc::UnboundedSender<OccupancyEvent>,
    ) -> Result<Box<dyn AlertChild>, ProcessError> {
        let mut record = self.log.lock();
        if record.fail_launch {
            return Err(ProcessError::Spawn {
                program: "mock-alert".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock launch failure"),
            });
        }
        record.launches.push(generation);
        Ok(Box::new(MockAlertChild {
            generation,
            log: self.log.clone(),
            terminated: false,
        }))
    }
}

struct MockAlertChild {
    generation: u64,
    log: MockAlertLog,
    terminated: bool,
}

impl AlertChild for MockAlertChild {
    fn send_progress(&mut self, value: u32) -> Result<(), ProcessError> {
        if self.terminated {
            return Err(ProcessError::Input);
        }
        self.log.lock().progress.push((self.generation, value));
        Ok(())
    }

    fn terminate(&mut self) {
        if !self.terminated {
            self.terminated = true;
            self.log.lock().terminations.push(self.generation);
        }
    }
}
