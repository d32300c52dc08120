use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reading::Reading;
use crate::rules::engine::{Severity, Triggered};

/// An alert raised by a rule for one reading. Written once, never updated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub rule: String,
    pub severity: Severity,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub sensor_id: String,
    /// Timestamp of the reading, as the producer sent it.
    pub reading_timestamp: String,
    pub generated_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(triggered: &Triggered<'_>, reading: &Reading) -> Self {
        Self {
            rule: triggered.rule.name.clone(),
            severity: triggered.rule.severity,
            metric: triggered.rule.metric.clone(),
            value: triggered.value,
            threshold: triggered.rule.threshold,
            sensor_id: reading.sensor_id.clone(),
            reading_timestamp: reading.raw_timestamp.clone(),
            generated_at: Utc::now(),
        }
    }

    /// Human-readable description stored alongside the alert.
    pub fn message(&self) -> String {
        format!(
            "{}: Sensor {} reported {}={:.2} (threshold: {:.2}) at {}",
            self.rule, self.sensor_id, self.metric, self.value, self.threshold, self.reading_timestamp
        )
    }
}
