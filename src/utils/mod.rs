//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `sensorstream` pipeline.
//!
//! It centralizes the typed errors returned at module boundaries and the
//! tracing subscriber setup shared by the binary and the tests.

pub mod error;
pub mod logging;
