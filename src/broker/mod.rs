pub mod engine;
pub mod message;
pub mod topic;

pub use engine::{Broker, Subscription, TopicStats};
pub use message::Message;
pub use topic::{DEFAULT_CAPACITY, TopicQueue};
