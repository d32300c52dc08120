//! # sensorstream
//!
//! `sensorstream` is the streaming core of an IoT weather pipeline: an
//! in-memory, multi-topic broker with bounded queues, and a consumer that
//! evaluates alert rules on every reading and persists readings and alerts.
//!
//! ## Core Modules
//!
//! - `broker`: topics backed by bounded FIFO queues; publish, consume, subscribe, stats.
//! - `reading`: the canonical reading type and normalization of both envelope shapes.
//! - `rules`: the threshold rule table and the alerts it produces.
//! - `consumer`: the consume loop tying broker, rules and persistence together.
//! - `persistence`: the sink trait and its `sled`-backed dimensional store.
//! - `simulator`: a demo producer of synthetic envelopes.
//! - `transport`: WebSocket ingest for producers outside the process.
//! - `config`: layered settings from file and environment.
//! - `utils`: typed errors and logging setup.

pub mod broker;
pub mod config;
pub mod consumer;
pub mod persistence;
pub mod reading;
pub mod rules;
pub mod simulator;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;
