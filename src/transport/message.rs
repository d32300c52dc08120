use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::broker::TopicStats;

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "publish")]
    Publish { topic: String, payload: Value },

    #[serde(rename = "stats")]
    Stats,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// `accepted` is false when the topic stayed full for the whole publish wait.
    #[serde(rename = "published")]
    Published { topic: String, accepted: bool },

    #[serde(rename = "stats")]
    Stats { topics: BTreeMap<String, TopicStats> },

    #[serde(rename = "error")]
    Error { message: String },
}
