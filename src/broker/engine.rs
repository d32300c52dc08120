//! Broker engine
//!
//! This module contains the in-memory broker responsible for:
//! - managing topics, each backed by a bounded [`TopicQueue`]
//! - accepting publishes with a short bounded wait (backpressure drop on expiry)
//! - handing messages to pull consumers and to push-style subscription pollers
//! - reporting per-topic depth and subscriber counts
//!
//! Concurrency and usage notes:
//! - The broker is shared as `Arc<Broker>`; every method takes `&self`.
//! - The topic registry is the only state behind the broker lock. Blocking
//!   queue operations run after the lock is released, so one full topic never
//!   stalls publishes or consumes on another.
//! - Subscriptions are competing consumers: each poller draws from the topic's
//!   one shared queue, so a message reaches exactly one subscriber. Fan-out
//!   would need a queue per subscriber.

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::broker::message::Message;
use crate::broker::topic::{DEFAULT_CAPACITY, SubscriberId, Topic, TopicQueue};
use crate::config::BrokerSettings;

type Registry = HashMap<String, Topic>;

/// Per-topic numbers exposed to monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicStats {
    pub pending: usize,
    pub subscribers: usize,
}

#[derive(Debug)]
pub struct Broker {
    topics: Arc<Mutex<Registry>>,
    running: Arc<AtomicBool>,
    capacity: usize,
    publish_timeout: Duration,
    subscriber_poll: Duration,
}

impl Broker {
    /// Wait applied to every publish before the message is dropped.
    pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

    /// Poll interval of subscription threads; bounds how long `stop` takes to be observed.
    const SUBSCRIBER_POLL: Duration = Duration::from_millis(100);
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(true)),
            capacity: DEFAULT_CAPACITY,
            publish_timeout: Self::PUBLISH_TIMEOUT,
            subscriber_poll: Self::SUBSCRIBER_POLL,
        }
    }

    pub fn with_settings(settings: &BrokerSettings) -> Self {
        Self {
            capacity: settings.topic_capacity,
            publish_timeout: Duration::from_millis(settings.publish_timeout_ms),
            subscriber_poll: Duration::from_millis(settings.subscriber_poll_ms),
            ..Self::new()
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a topic's queue, creating the topic if needed. The lock is
    /// released before the caller touches the queue.
    fn queue(&self, topic: &str) -> Arc<TopicQueue> {
        let mut topics = self.registry();
        let entry = topics.entry(topic.to_string()).or_insert_with(|| {
            info!(topic, capacity = self.capacity, "Topic created");
            Topic::new(topic, self.capacity)
        });
        Arc::clone(&entry.queue)
    }

    /// Create `topic` if it does not exist. An existing topic is left untouched.
    pub fn create_topic(&self, topic: &str) {
        self.queue(topic);
    }

    /// Publish `payload` to `topic`, creating the topic on first use.
    ///
    /// Waits at most the configured publish timeout for room; returns `false`
    /// if the message had to be dropped.
    pub fn publish(&self, topic: &str, payload: Value) -> bool {
        let queue = self.queue(topic);
        queue.publish(Message::new(topic, payload), self.publish_timeout)
    }

    /// Pull one message from `topic`, waiting up to `timeout`.
    pub fn consume(&self, topic: &str, timeout: Duration) -> Option<Message> {
        self.queue(topic).consume(timeout)
    }

    /// Start a poller thread that hands each message drawn from `topic` to
    /// `callback`.
    ///
    /// Pollers share the topic's queue with every other consumer. The thread
    /// exits after [`Broker::stop`] or [`Subscription::cancel`]; callers do
    /// not need to join it.
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> Subscription
    where
        F: Fn(Message) + Send + 'static,
    {
        let id: SubscriberId = format!("sub-{}", Uuid::new_v4());
        let queue = {
            let mut topics = self.registry();
            let entry = topics
                .entry(topic.to_string())
                .or_insert_with(|| Topic::new(topic, self.capacity));
            entry.subscribe(id.clone());
            Arc::clone(&entry.queue)
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        let poller = Poller {
            id: id.clone(),
            topic: topic.to_string(),
            queue,
            registry: Arc::clone(&self.topics),
            running: Arc::clone(&self.running),
            cancelled: Arc::clone(&cancelled),
            poll: self.subscriber_poll,
        };

        let handle = thread::Builder::new()
            .name(format!("subscriber-{topic}"))
            .spawn(move || poller.run(callback));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(topic, "Failed to spawn subscriber thread: {e}");
                let mut topics = self.registry();
                if let Some(t) = topics.get_mut(topic) {
                    t.unsubscribe(&id);
                }
                None
            }
        };

        Subscription {
            id,
            topic: topic.to_string(),
            cancelled,
            handle,
        }
    }

    /// Depth and subscriber count of every known topic, ordered by name.
    pub fn get_stats(&self) -> BTreeMap<String, TopicStats> {
        let topics = self.registry();
        topics
            .values()
            .map(|t| {
                (
                    t.name.clone(),
                    TopicStats {
                        pending: t.queue.size(),
                        subscribers: t.subscribers.len(),
                    },
                )
            })
            .collect()
    }

    /// Signal all subscription pollers to exit. Queued messages are left in place.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Broker stopping subscription pollers");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// State moved into a subscription thread.
struct Poller {
    id: SubscriberId,
    topic: String,
    queue: Arc<TopicQueue>,
    registry: Arc<Mutex<Registry>>,
    running: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    poll: Duration,
}

impl Poller {
    fn active(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.cancelled.load(Ordering::SeqCst)
    }

    fn run<F: Fn(Message)>(self, callback: F) {
        debug!(topic = %self.topic, subscriber = %self.id, "Subscriber poller started");
        while self.active() {
            let Some(message) = self.queue.consume(self.poll) else {
                continue;
            };
            let message_id = message.message_id.clone();
            if catch_unwind(AssertUnwindSafe(|| callback(message))).is_err() {
                error!(
                    topic = %self.topic,
                    subscriber = %self.id,
                    message_id = %message_id,
                    "Subscriber callback panicked"
                );
            }
        }

        let mut topics = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(topic) = topics.get_mut(&self.topic) {
            topic.unsubscribe(&self.id);
        }
        debug!(topic = %self.topic, subscriber = %self.id, "Subscriber poller exited");
    }
}

/// Handle to a running subscription poller.
///
/// Dropping the handle detaches the thread; it keeps running until the
/// broker stops or the subscription is cancelled.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    topic: String,
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Ask this poller alone to exit after its current poll.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Wait for the poller thread to finish. Only returns once the broker
    /// has been stopped or the subscription cancelled.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(topic = %self.topic, subscriber = %self.id, "Subscriber thread panicked");
            }
        }
    }
}
