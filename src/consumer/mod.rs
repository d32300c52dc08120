//! The `consumer` module drives the pipeline: it pulls readings from one
//! broker topic, runs the rule engine over each, and hands readings and
//! alerts to the persistence sink.

pub mod stream;

pub use stream::{ConsumerCounters, ConsumerState, Outcome, StreamingConsumer};
