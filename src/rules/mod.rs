//! The `rules` module classifies readings as alert-worthy.
//!
//! A [`RuleEngine`] holds a fixed table of threshold rules, evaluated in table
//! order against a reading's metrics. A metric the reading lacks simply skips
//! the rules that reference it.

pub mod alert;
pub mod engine;

pub use alert::Alert;
pub use engine::{AlertRule, Comparator, RuleEngine, Severity, Triggered, default_rules};

#[cfg(test)]
mod tests;
