//! Topic management
//!
//! A `Topic` pairs one bounded FIFO ([`TopicQueue`]) with the ids of the
//! subscription pollers currently draining it. Topics are only ever created,
//! never removed, so a cloned `Arc<TopicQueue>` stays valid for the life of
//! the broker.
//!
//! Concurrency note: `Topic` itself is guarded by the broker registry lock.
//! `TopicQueue` synchronizes internally and is used outside that lock.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use tracing::warn;

use crate::broker::message::Message;

pub type SubscriberId = String;

/// Default number of messages a topic can hold before publishers are shed.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Bounded, blocking-with-timeout FIFO backing a single topic.
///
/// Both channel ends are held by the queue, so the channel never disconnects
/// while the queue is alive. Competing consumers each get a disjoint share.
#[derive(Debug)]
pub struct TopicQueue {
    name: String,
    capacity: usize,
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

impl TopicQueue {
    pub fn new(name: &str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            name: name.to_string(),
            capacity,
            tx,
            rx,
        }
    }

    /// Enqueue `message`, waiting up to `timeout` for free capacity.
    ///
    /// Returns `false` when the queue is still full at expiry; the message is
    /// dropped and it is up to the producer to retry.
    pub fn publish(&self, message: Message, timeout: Duration) -> bool {
        match self.tx.send_timeout(message, timeout) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(dropped)) => {
                warn!(
                    topic = %self.name,
                    message_id = %dropped.message_id,
                    capacity = self.capacity,
                    "Topic is full, dropping message"
                );
                false
            }
            Err(SendTimeoutError::Disconnected(_)) => false,
        }
    }

    /// Take the oldest message, waiting up to `timeout`. `None` on timeout.
    pub fn consume(&self, timeout: Duration) -> Option<Message> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Current depth. Non-blocking.
    pub fn size(&self) -> usize {
        self.rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug)]
pub struct Topic {
    pub name: String,
    pub queue: Arc<TopicQueue>,
    pub subscribers: Vec<SubscriberId>,
}

impl Topic {
    /// Create a new topic with an empty queue of the given capacity.
    pub fn new(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            queue: Arc::new(TopicQueue::new(name, capacity)),
            subscribers: Vec::new(),
        }
    }

    /// Record a subscription poller. Duplicate ids are ignored.
    pub fn subscribe(&mut self, id: SubscriberId) {
        if !self.subscribers.contains(&id) {
            self.subscribers.push(id);
        }
    }

    /// Forget a subscription poller.
    pub fn unsubscribe(&mut self, id: &SubscriberId) {
        self.subscribers.retain(|s| s != id);
    }
}
