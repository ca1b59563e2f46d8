//! Error types for the Gavel framework.

use gavel_core::{ApiError, BoxError, DefinitionError, ParameterType, PersistenceError};
use thiserror::Error;

use crate::tree::TreeDiagnostic;

/// Failure returned by a command handler.
///
/// Only [`category`](CommandError::category) is ever shown to the caller;
/// the full error goes to the log.
#[derive(Debug, Error)]
pub enum CommandError {
    /// An argument was missing or had the wrong shape.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// A platform call made by the handler failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The handler gave up with a message of its own.
    #[error("{0}")]
    Failed(String),

    /// Anything else.
    #[error(transparent)]
    Other(BoxError),
}

impl CommandError {
    pub fn argument(msg: impl Into<String>) -> Self {
        Self::Argument(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }

    /// Caller-safe name of the fault.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Argument(_) => "invalid argument",
            Self::Api(_) => "platform error",
            Self::Failed(_) => "command failure",
            Self::Other(_) => "internal error",
        }
    }
}

impl From<PersistenceError> for CommandError {
    fn from(err: PersistenceError) -> Self {
        Self::Other(Box::new(err))
    }
}

/// The platform broke its contract while delivering an interaction.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// A declared-required option was not sent.
    #[error("platform did not send required option `{option}` for `{path}`")]
    MissingRequiredOption {
        /// Descriptor path.
        path: String,
        /// Option name.
        option: String,
    },

    /// An option arrived with a value of the wrong kind.
    #[error("option `{option}` of `{path}` expected {expected}, got {got}")]
    OptionTypeMismatch {
        /// Descriptor path.
        path: String,
        /// Option name.
        option: String,
        /// Declared type.
        expected: ParameterType,
        /// Delivered type.
        got: ParameterType,
    },
}

impl DispatchError {
    pub fn category(&self) -> &'static str {
        "protocol error"
    }
}

/// Why a module could not be loaded.
///
/// The display strings are what the registry records and reports.
#[derive(Debug, Error)]
pub enum ModuleLoadError {
    #[error("Attempt to load non-existent module")]
    NotFound,

    #[error("Error during load: {0}")]
    Construction(BoxError),

    #[error("Error during load: {0}")]
    Definition(#[from] DefinitionError),
}

/// Command tree assembly rejected under strict conflict checking.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("command tree has {} conflict(s): {}", .0.len(), join_diagnostics(.0))]
    Conflicts(Vec<TreeDiagnostic>),
}

fn join_diagnostics(diagnostics: &[TreeDiagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Top-level framework error.
#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Result type for command handlers.
pub type CommandResult<T = ()> = Result<T, CommandError>;

/// Result type for framework operations.
pub type FrameworkResult<T> = Result<T, FrameworkError>;
