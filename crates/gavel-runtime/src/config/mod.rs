//! Configuration for the Gavel runtime.
//!
//! [`ConfigLoader`] layers defaults, files, `GAVEL_*` environment variables
//! and programmatic overrides into one [`GavelConfig`], which
//! [`validate_config`] then checks.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config, load_config_from_file};
pub use schema::{
    BotConfig, CommandsConfig, GavelConfig, LogFormat, LogLevel, LogOutput, LoggingConfig,
    SpanEventConfig, StorageConfig,
};
pub use validation::validate_config;
