//! # Gavel Runtime
//!
//! Runs a [`gavel_framework`] deployment as a process:
//!
//! - **Configuration**: layered TOML/YAML files, `GAVEL_*` environment variables and
//!   programmatic overrides ([`ConfigLoader`])
//! - **Logging**: `tracing-subscriber` set up from the `[logging]` table ([`LoggingBuilder`])
//! - **Persistence**: one JSON file per record ([`JsonFileBackend`]) with periodic autosave
//! - **Event loop**: a bounded worker pool feeding the [`Dispatcher`](gavel_framework::Dispatcher)
//!
//! ```ignore
//! use gavel_runtime::GavelRuntime;
//!
//! #[tokio::main]
//! async fn main() -> gavel_runtime::RuntimeResult<()> {
//!     let runtime = GavelRuntime::builder()
//!         .platform(connect_gateway().await)
//!         .build()?;
//!     runtime.run().await
//! }
//! ```
//!
//! # Features
//!
//! - `toml-config` *(default)*: `gavel.toml`
//! - `yaml-config`: `gavel.yaml` / `gavel.yml`
//! - `json-log`: `logging.format = "json"`

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod storage;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, GavelConfig, load_config, load_config_from_file,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{EventSink, GavelRuntime, InboundEvent, RuntimeBuilder};
pub use storage::JsonFileBackend;

pub use tracing;

/// Logging macros for module authors.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
