use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{
    Config, FibonacciParams, Instrument, LoggingParams, RecoveryParams, SessionParams, Timing,
    ZoneHistoryParams,
};

/// Command-line selection of the configuration file.
#[cfg(feature = "clap")]
#[derive(Debug, Clone, clap::Args)]
pub struct ConfigArgs {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c', default_value = "config.toml")]
    pub config: std::path::PathBuf,
}

/// Loads the application configuration from a TOML file.
///
/// Values can be overridden from the environment with the `CASSANDRA` prefix and
/// `__` as the section separator, e.g. `CASSANDRA__INSTRUMENT__SYMBOL=SPXm`.
/// The result is validated before it is returned.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("CASSANDRA").separator("__"))
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}
