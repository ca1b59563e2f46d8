//! Runtime error types.

use gavel_core::PersistenceError;
use gavel_framework::FrameworkError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while building or running the bot.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The module manager failed to start or to sync commands.
    #[error("Framework error: {0}")]
    Framework(#[from] FrameworkError),

    /// Persisted records could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Installing a shutdown signal handler failed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[source] std::io::Error),

    /// The builder was finished without a platform client.
    #[error("No platform client configured")]
    NoPlatform,

    /// A background task panicked or was aborted.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
