//! The `error` module defines the typed errors used within the pipeline.
//!
//! Only [`PipelineError`] ever reaches the process entry point; everything the
//! consumer loop hits while running is logged and handled in place.

use thiserror::Error;

/// Failures of a persistence sink write or lookup.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Reasons an envelope cannot be turned into a [`crate::reading::Reading`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadingError {
    #[error("envelope is not a JSON object")]
    NotAnObject,

    #[error("required field '{0}' is missing")]
    MissingField(&'static str),

    #[error("timestamp '{0}' is not ISO-8601")]
    InvalidTimestamp(String),
}

/// Errors raised while building a rule table from configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("unknown comparator '{0}', expected one of >, <, >=, <=")]
    UnknownComparator(String),

    #[error("unknown severity '{0}', expected WARNING or CRITICAL")]
    UnknownSeverity(String),

    #[error("rule '{0}' has an empty metric name")]
    EmptyMetric(String),

    #[error("rule '{rule}' watches unknown metric '{metric}'")]
    UnknownMetric { rule: String, metric: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsumerError {
    #[error("consumer already started (state: {0})")]
    AlreadyStarted(String),
}

/// Unrecoverable setup errors. These terminate the process at startup.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("rule table error: {0}")]
    Rules(#[from] RuleError),

    #[error("consumer error: {0}")]
    Consumer(#[from] ConsumerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker thread failed: {0}")]
    Worker(String),
}
