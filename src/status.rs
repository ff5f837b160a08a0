// src/status.rs - Fire-and-forget status reporting
use std::sync::Mutex;

use crate::effector::ActuatorLengths;

/// Label key for the connection/output status line.
pub const OUT_LABEL: &str = "out";

pub trait StatusSink: Send + Sync {
    fn update_labels(&self, key: &str, text: &str);
    fn update_actuators(&self, lengths: &ActuatorLengths);
}

/// Status sink that writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn update_labels(&self, key: &str, text: &str) {
        tracing::info!(label = key, "{}", text);
    }

    fn update_actuators(&self, lengths: &ActuatorLengths) {
        tracing::debug!("Actuators: {:?}", lengths);
    }
}

/// Status sink that keeps the latest values, for inspection by other parts
/// of the process (and by tests).
#[derive(Debug, Default)]
pub struct RecordingStatusSink {
    labels: Mutex<Vec<(String, String)>>,
    actuators: Mutex<Vec<ActuatorLengths>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<(String, String)> {
        self.labels.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn last_label(&self, key: &str) -> Option<String> {
        self.labels().into_iter().rev().find(|(k, _)| k == key).map(|(_, text)| text)
    }

    pub fn actuator_updates(&self) -> Vec<ActuatorLengths> {
        self.actuators.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl StatusSink for RecordingStatusSink {
    fn update_labels(&self, key: &str, text: &str) {
        if let Ok(mut labels) = self.labels.lock() {
            labels.push((key.to_string(), text.to_string()));
        }
    }

    fn update_actuators(&self, lengths: &ActuatorLengths) {
        if let Ok(mut actuators) = self.actuators.lock() {
            actuators.push(*lengths);
        }
    }
}
