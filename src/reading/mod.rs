//! The `reading` module defines the one canonical shape every envelope is
//! mapped into before rules run or anything is persisted.
//!
//! Producers send either a nested envelope (metrics under a `value` object,
//! location under `metadata`) or a flat one with the same keys at the top
//! level. [`normalize`] accepts both, so nothing downstream branches on shape.

pub mod envelope;

pub use envelope::{Location, Reading, SensorDescriptor, METRIC_KEYS, normalize};
