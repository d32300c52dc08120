//! Streaming consumer
//!
//! Lifecycle: `Created -> Running -> Stopping -> Stopped`.
//!
//! - `start` runs the loop on the calling thread until `stop` is requested;
//!   `spawn` runs it on a dedicated worker thread named after the topic.
//! - Stop is cooperative: it is checked once per iteration, so it takes
//!   effect after the message in hand (if any) and at most one poll timeout.
//! - Nothing a single message does can end the loop. Malformed envelopes are
//!   discarded, and each persistence call fails on its own without
//!   preventing the others.
//!
//! Counters are written only by the loop and may be read from any thread.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::broker::{Broker, Message};
use crate::config::ConsumerSettings;
use crate::persistence::PersistenceSink;
use crate::reading::Reading;
use crate::rules::{Alert, RuleEngine, Severity};
use crate::utils::error::ConsumerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum ConsumerState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl ConsumerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConsumerState::Created,
            1 => ConsumerState::Running,
            2 => ConsumerState::Stopping,
            _ => ConsumerState::Stopped,
        }
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsumerState::Created => "CREATED",
            ConsumerState::Running => "RUNNING",
            ConsumerState::Stopping => "STOPPING",
            ConsumerState::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// Point-in-time copy of the consumer's counters.
///
/// Once the loop is idle,
/// `processed == persisted + discarded_malformed + persist_failures`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerCounters {
    pub processed: u64,
    pub alerts: u64,
    pub persisted: u64,
    pub discarded_malformed: u64,
    pub persist_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    alerts: AtomicU64,
    persisted: AtomicU64,
    discarded_malformed: AtomicU64,
    persist_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn snapshot(&self) -> ConsumerCounters {
        ConsumerCounters {
            processed: self.processed.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            discarded_malformed: self.discarded_malformed.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}

/// What happened to one consumed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The envelope could not be normalized; nothing was persisted.
    Discarded,
    Processed {
        /// Names of the rules that fired, in table order.
        alerts: Vec<String>,
        /// Whether `store_reading` succeeded.
        persisted: bool,
    },
}

pub struct StreamingConsumer {
    broker: Arc<Broker>,
    sink: Arc<dyn PersistenceSink>,
    rules: RuleEngine,
    topic: String,
    poll_timeout: Duration,
    status_every: u64,
    state: AtomicU8,
    stop_requested: AtomicBool,
    counters: Counters,
}

impl StreamingConsumer {
    pub fn new(
        broker: Arc<Broker>,
        sink: Arc<dyn PersistenceSink>,
        rules: RuleEngine,
        settings: &ConsumerSettings,
    ) -> Self {
        info!(
            topic = %settings.topic,
            rules = rules.len(),
            "Streaming consumer initialized"
        );
        Self {
            broker,
            sink,
            rules,
            topic: settings.topic.clone(),
            poll_timeout: Duration::from_millis(settings.poll_timeout_ms),
            status_every: settings.status_every.max(1),
            state: AtomicU8::new(ConsumerState::Created as u8),
            stop_requested: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> ConsumerState {
        ConsumerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn counters(&self) -> ConsumerCounters {
        self.counters.snapshot()
    }

    /// Request a cooperative stop. Safe to call from any thread, any number of times.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        let _ = self.state.compare_exchange(
            ConsumerState::Running as u8,
            ConsumerState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Run the consume loop on the current thread until [`stop`](Self::stop)
    /// is called. Returns the final counters.
    pub fn start(&self) -> Result<ConsumerCounters, ConsumerError> {
        if let Err(current) = self.state.compare_exchange(
            ConsumerState::Created as u8,
            ConsumerState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return Err(ConsumerError::AlreadyStarted(ConsumerState::from_u8(current).to_string()));
        }

        info!(topic = %self.topic, rules = self.rules.len(), "Consumer running");

        while !self.stop_requested.load(Ordering::SeqCst) {
            if let Some(message) = self.broker.consume(&self.topic, self.poll_timeout) {
                self.process(&message);
            }
        }

        self.set_state(ConsumerState::Stopping);
        self.shutdown();
        self.set_state(ConsumerState::Stopped);
        Ok(self.counters())
    }

    /// Run [`start`](Self::start) on a dedicated worker thread.
    pub fn spawn(self: Arc<Self>) -> io::Result<JoinHandle<Result<ConsumerCounters, ConsumerError>>> {
        thread::Builder::new()
            .name(format!("consumer-{}", self.topic))
            .spawn(move || self.start())
    }

    fn shutdown(&self) {
        if let Err(e) = self.sink.flush() {
            error!(operation = "flush", "Failed to flush persistence sink: {e}");
        }
        self.broker.stop();

        let c = self.counters();
        info!(
            "Consumer stopped. Messages: {} | Saved: {} | Alerts: {} | Discarded: {} | Failed: {}",
            c.processed, c.persisted, c.alerts, c.discarded_malformed, c.persist_failures
        );
    }

    /// Handle one consumed message end to end.
    pub fn process(&self, message: &Message) -> Outcome {
        let processed = Counters::bump(&self.counters.processed);

        let reading = match Reading::from_message(message) {
            Ok(reading) => reading,
            Err(e) => {
                Counters::bump(&self.counters.discarded_malformed);
                warn!(
                    topic = %message.topic,
                    message_id = %message.message_id,
                    "Discarding malformed envelope: {e}"
                );
                return Outcome::Discarded;
            }
        };

        let mut fired = Vec::new();
        for triggered in self.rules.evaluate(&reading.metrics) {
            let alert = Alert::new(&triggered, &reading);
            Counters::bump(&self.counters.alerts);
            match alert.severity {
                Severity::Critical => error!("[CRITICAL ALERT] {}", alert.message()),
                Severity::Warning => warn!("[WARNING] {}", alert.message()),
            }
            if let Err(e) = self.sink.store_alert(&alert) {
                error!(
                    sensor_id = %reading.sensor_id,
                    timestamp = %reading.raw_timestamp,
                    rule = %alert.rule,
                    operation = "store_alert",
                    "Failed to persist alert: {e}"
                );
            }
            fired.push(alert.rule);
        }

        let persisted = match self.sink.store_reading(&reading) {
            Ok(()) => {
                Counters::bump(&self.counters.persisted);
                true
            }
            Err(e) => {
                Counters::bump(&self.counters.persist_failures);
                error!(
                    sensor_id = %reading.sensor_id,
                    timestamp = %reading.raw_timestamp,
                    operation = "store_reading",
                    "Failed to persist reading: {e}"
                );
                false
            }
        };

        self.report(processed, &fired);
        Outcome::Processed {
            alerts: fired,
            persisted,
        }
    }

    fn report(&self, processed: u64, fired: &[String]) {
        if fired.is_empty() && processed % self.status_every != 0 {
            return;
        }
        let c = self.counters();
        if fired.is_empty() {
            info!(
                "Processed {} messages | Saved: {} | Alerts: {}",
                processed, c.persisted, c.alerts
            );
        } else {
            info!(
                "Processed {} messages | Saved: {} | Alerts: {} | Current: {}",
                processed,
                c.persisted,
                c.alerts,
                fired.join(", ")
            );
        }
    }
}

impl fmt::Debug for StreamingConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingConsumer")
            .field("topic", &self.topic)
            .field("state", &self.state())
            .field("counters", &self.counters())
            .finish()
    }
}
