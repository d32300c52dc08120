//! The `persistence` module is where readings and alerts end up.
//!
//! The consumer only sees the [`PersistenceSink`] trait: one call per reading
//! and one per alert, each independently fallible. [`SledSink`] is the
//! embedded implementation, laid out as a small star schema on `sled` trees
//! (time/sensor/location/status dimensions, a reading fact tree and an alert log).

pub mod sled_store;

use crate::reading::Reading;
use crate::rules::Alert;
use crate::utils::error::PersistenceError;

pub use sled_store::{AlertRecord, FactReading, LocationDim, SensorDim, SledSink, StatusDim, TimeDim};

/// Destination for processed readings and raised alerts.
///
/// Implementations serialize their own writes; calls carry no idempotency
/// guarantee.
pub trait PersistenceSink: Send + Sync {
    fn store_reading(&self, reading: &Reading) -> Result<(), PersistenceError>;

    fn store_alert(&self, alert: &Alert) -> Result<(), PersistenceError>;

    /// Push buffered writes to durable storage.
    fn flush(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}
