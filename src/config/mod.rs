mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BrokerSettings, ConsumerSettings, LoggingSettings, PersistenceSettings, RuleSettings, ServerSettings,
    Settings,
};

/// Prefix for environment overrides, e.g. `SENSORSTREAM_BROKER__TOPIC_CAPACITY=50`.
pub const ENV_PREFIX: &str = "SENSORSTREAM";

/// Loads the configuration from `config/default` and environment variables,
/// merged over default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit base file (extension optional).
/// The file is not required to exist.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();

    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
