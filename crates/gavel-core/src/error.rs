//! Error types shared by every Gavel layer.
//!
//! Framework-level errors (dispatch, tree assembly, module loading) live in
//! `gavel-framework`; this module only holds the failures the leaf types can
//! produce on their own.

use thiserror::Error;

use crate::parameter::ParameterType;

/// A boxed, thread-safe error used at plugin-author boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Definition Errors
// =============================================================================

/// A command or parameter declaration broke a naming or structural rule.
///
/// These are module-author mistakes. They abort compilation of the module
/// that declared them, which is then recorded as failed to load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// Name shorter than 1 or longer than 32 characters.
    #[error("{what} name `{name}` must be 1-32 characters long")]
    NameLength {
        /// What was being named (command, parameter, ...).
        what: &'static str,
        /// The offending name.
        name: String,
    },

    /// Name contains characters outside `[A-Za-z0-9_-]`.
    #[error("{what} name `{name}` may only contain word characters and '-'")]
    NameCharset {
        /// What was being named.
        what: &'static str,
        /// The offending name.
        name: String,
    },

    /// Description shorter than 1 or longer than 100 characters.
    #[error("description of `{owner}` must be 1-100 characters long")]
    DescriptionLength {
        /// The thing being described.
        owner: String,
    },

    /// Choices declared on a parameter type that cannot carry them.
    #[error("fixed choices may not be used with {kind} type parameters")]
    ChoicesNotAllowed {
        /// The parameter type.
        kind: ParameterType,
    },

    /// A choice value does not match the parameter's type.
    #[error("choice `{label}` does not match the {kind} type of its parameter")]
    ChoiceTypeMismatch {
        /// Choice label.
        label: String,
        /// The parameter type.
        kind: ParameterType,
    },

    /// A subcommand group was named without a subcommand.
    #[error("command `{command}` declares a subcommand group without a subcommand name")]
    GroupWithoutSubcommand {
        /// The command name.
        command: String,
    },

    /// More than 25 parameters on one command.
    #[error("command `{path}` declares {count} parameters, at most 25 are allowed")]
    TooManyParameters {
        /// Path of the command.
        path: String,
        /// Declared parameter count.
        count: usize,
    },

    /// Two parameters on one command share a name.
    #[error("command `{path}` declares parameter `{name}` twice")]
    DuplicateParameter {
        /// Path of the command.
        path: String,
        /// Parameter name.
        name: String,
    },

    /// A text command with an empty display name.
    #[error("text command `{ident}` has an empty display name")]
    EmptyTextCommand {
        /// Handler identifier.
        ident: String,
    },
}

// =============================================================================
// Persistence Errors
// =============================================================================

/// Errors raised by the persistence collaborator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Backend I/O failed.
    #[error("storage I/O failed for `{key}`: {source}")]
    Io {
        /// Record key.
        key: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A stored record could not be decoded.
    #[error("failed to decode record `{key}`: {source}")]
    Decode {
        /// Record key.
        key: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be encoded.
    #[error("failed to encode record `{key}`: {source}")]
    Encode {
        /// Record key.
        key: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The same key was loaded twice with different record types.
    #[error("record `{key}` was already loaded with a different type")]
    TypeMismatch {
        /// Record key.
        key: String,
    },
}

impl PersistenceError {
    /// Creates an I/O error for `key`.
    pub fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }
}

// =============================================================================
// Platform Errors
// =============================================================================

/// Failures reported by the platform client.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request reached the platform and was rejected, or never arrived.
    #[error("platform request failed: {0}")]
    Request(String),

    /// A first reply was attempted on an interaction that already has one.
    #[error("interaction already acknowledged")]
    AlreadyAcknowledged,

    /// The platform client does not implement this operation.
    #[error("operation not supported by platform: {0}")]
    Unsupported(&'static str),
}

impl ApiError {
    /// Creates a request error.
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for declaration validation.
pub type DefinitionResult<T> = Result<T, DefinitionError>;

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Result type for platform calls.
pub type ApiResult<T> = Result<T, ApiError>;
