//! Message definitions for the broker
//!
//! `Message` is the unit a topic queue holds. The broker owns every field
//! except `payload`, which is the producer's envelope passed through as-is.
//!
//! Notes on fields:
//! - `topic`: topic name used for routing
//! - `payload`: the JSON envelope published by the producer
//! - `received_at`: receipt time, stamped by the broker upon publish
//! - `message_id`: opaque unique id, useful for correlating log lines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub topic: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
    pub message_id: String,
}

impl Message {
    /// Wrap `payload` for `topic`, stamping the receipt time and a fresh id.
    pub fn new(topic: &str, payload: Value) -> Self {
        Self {
            topic: topic.to_string(),
            payload,
            received_at: Utc::now(),
            message_id: Uuid::new_v4().to_string(),
        }
    }
}
