use serde::Deserialize;

/// Top-level configuration settings for the pipeline.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub consumer: ConsumerSettings,
    pub persistence: PersistenceSettings,
    pub logging: LoggingSettings,
    /// Replaces the stock alert rule table when present.
    pub rules: Option<Vec<RuleSettings>>,
}

/// WebSocket ingest endpoint.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub enabled: bool,
}

/// Topic queue sizing and wait bounds.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub topic_capacity: usize,
    pub publish_timeout_ms: u64,
    pub subscriber_poll_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ConsumerSettings {
    pub topic: String,
    pub poll_timeout_ms: u64,
    /// Emit a status line every this many messages.
    pub status_every: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PersistenceSettings {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// One alert rule as written in configuration. Validated when the rule
/// engine is built.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RuleSettings {
    pub name: String,
    pub metric: String,
    pub comparator: String,
    pub threshold: f64,
    pub severity: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every field is optional; missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub consumer: Option<PartialConsumerSettings>,
    pub persistence: Option<PartialPersistenceSettings>,
    pub logging: Option<PartialLoggingSettings>,
    pub rules: Option<Vec<RuleSettings>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub topic_capacity: Option<usize>,
    pub publish_timeout_ms: Option<u64>,
    pub subscriber_poll_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialConsumerSettings {
    pub topic: Option<String>,
    pub poll_timeout_ms: Option<u64>,
    pub status_every: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialPersistenceSettings {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                enabled: true,
            },
            broker: BrokerSettings::default(),
            consumer: ConsumerSettings::default(),
            persistence: PersistenceSettings {
                path: "iot_warehouse_db".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
            rules: None,
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            topic_capacity: 1000,
            publish_timeout_ms: 1000,
            subscriber_poll_ms: 100,
        }
    }
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            topic: "sensor_data".to_string(),
            poll_timeout_ms: 500,
            status_every: 50,
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let broker = self.broker.unwrap_or_default();
        let consumer = self.consumer.unwrap_or_default();
        let persistence = self.persistence.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(defaults.server.host),
                port: server.port.unwrap_or(defaults.server.port),
                enabled: server.enabled.unwrap_or(defaults.server.enabled),
            },
            broker: BrokerSettings {
                topic_capacity: broker.topic_capacity.unwrap_or(defaults.broker.topic_capacity),
                publish_timeout_ms: broker
                    .publish_timeout_ms
                    .unwrap_or(defaults.broker.publish_timeout_ms),
                subscriber_poll_ms: broker
                    .subscriber_poll_ms
                    .unwrap_or(defaults.broker.subscriber_poll_ms),
            },
            consumer: ConsumerSettings {
                topic: consumer.topic.unwrap_or(defaults.consumer.topic),
                poll_timeout_ms: consumer.poll_timeout_ms.unwrap_or(defaults.consumer.poll_timeout_ms),
                status_every: consumer.status_every.unwrap_or(defaults.consumer.status_every),
            },
            persistence: PersistenceSettings {
                path: persistence.path.unwrap_or(defaults.persistence.path),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(defaults.logging.level),
            },
            rules: self.rules.or(defaults.rules),
        }
    }
}
