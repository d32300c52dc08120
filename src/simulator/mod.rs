//! The `simulator` module is a stand-in producer for demos and tests.
//!
//! It publishes nested-shape envelopes for a small fleet of weather stations.
//! Values are drawn uniformly from plausible ranges; there is no attempt at
//! realistic weather.

pub mod generator;

pub use generator::{PublishReport, SensorSimulator, SimulatedSensor};
