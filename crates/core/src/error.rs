//! Error types for Conduit
//!
//! Every failure surfaced by the pipeline is an [`Error`]. Variants follow the
//! stage that detects them:
//!
//! | Kind | Variants | Detected |
//! |------|----------|----------|
//! | Definition | `Definition` | descriptor resolution |
//! | Binding | `Binding` | parameter binding |
//! | Backend | `Backend` | driver execution |
//! | Mapping | `Mapping`, `UnmappedColumn`, `WrongType` | result mapping |
//! | Configuration | `Configuration`, `Io` | engine setup, missing collaborators |
//! | Usage | `TransactionCompleted`, `InvalidInput` | caller misuse |
//! | Cancelled | `Cancelled` | cancellation token observed |
//!
//! The core never retries: [`Error::is_retryable`] is false for every kind.

use std::io;
use thiserror::Error;

/// Result type alias for Conduit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Conduit pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed contract or entity metadata
    #[error("definition error in {owner}: {reason}")]
    Definition {
        /// Contract or entity the definition belongs to
        owner: String,
        /// What is wrong with it
        reason: String,
    },

    /// An argument could not be bound to a call parameter
    #[error("binding error for {contract}.{member}: {reason}")]
    Binding {
        /// Contract being bound
        contract: String,
        /// Member that failed
        member: String,
        /// Why binding failed
        reason: String,
    },

    /// A transform rejected its input
    #[error("transform failed for {member}: {reason}")]
    Transform {
        /// Member being transformed
        member: String,
        /// Why the transform failed
        reason: String,
    },

    /// A value could not be converted to the requested field type
    #[error("wrong type: expected {expected}, got {actual}")]
    WrongType {
        /// Expected type
        expected: String,
        /// Actual type
        actual: String,
    },

    /// Native execution failure reported by the backend
    #[error("backend error {code}: {message}")]
    Backend {
        /// Backend-native error code
        code: i32,
        /// Backend-native error message
        message: String,
    },

    /// A row could not populate the target shape
    #[error("mapping error at row {row}: {reason}")]
    Mapping {
        /// Zero-based row index within the result stream
        row: usize,
        /// Why mapping failed
        reason: String,
    },

    /// A result column has no matching entity member (strict columns only)
    #[error("mapping error at row {row}: column '{column}' has no matching member on {entity}")]
    UnmappedColumn {
        /// Zero-based row index within the result stream
        row: usize,
        /// Entity being populated
        entity: String,
        /// Column name as returned
        column: String,
    },

    /// A required collaborator or setting is absent or invalid
    #[error("configuration error: {reason}")]
    Configuration {
        /// What is missing or invalid
        reason: String,
    },

    /// The transaction has already been committed or rolled back
    #[error("transaction {transaction_id} is already {state}")]
    TransactionCompleted {
        /// Transaction identity
        transaction_id: String,
        /// Terminal state ("committed" or "rolled back")
        state: &'static str,
    },

    /// The caller supplied something the pipeline cannot use
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What was wrong
        reason: String,
    },

    /// The call was cancelled through its cancellation token
    #[error("call cancelled")]
    Cancelled,

    /// I/O error (config file loading)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed metadata
    Definition,
    /// Argument binding failure
    Binding,
    /// Backend execution failure
    Backend,
    /// Row mapping failure
    Mapping,
    /// Missing or invalid configuration
    Configuration,
    /// Caller misuse
    Usage,
    /// Cancelled by the caller
    Cancelled,
}

impl Error {
    /// Create a backend error.
    pub fn backend(code: i32, message: impl Into<String>) -> Self {
        Error::Backend {
            code,
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Error::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a transform error.
    pub fn transform(member: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Transform {
            member: member.into(),
            reason: reason.into(),
        }
    }

    /// Create a definition error.
    pub fn definition(owner: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Definition {
            owner: owner.into(),
            reason: reason.into(),
        }
    }

    /// Create a mapping error for a row.
    pub fn mapping(row: usize, reason: impl Into<String>) -> Self {
        Error::Mapping {
            row,
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Definition { .. } => ErrorKind::Definition,
            Error::Binding { .. } => ErrorKind::Binding,
            Error::Transform { .. }
            | Error::WrongType { .. }
            | Error::Mapping { .. }
            | Error::UnmappedColumn { .. } => ErrorKind::Mapping,
            Error::Backend { .. } => ErrorKind::Backend,
            Error::Configuration { .. } | Error::Io(_) => ErrorKind::Configuration,
            Error::TransactionCompleted { .. } | Error::InvalidInput { .. } => ErrorKind::Usage,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the core would retry this error. It never does.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Re-scope a transform or conversion failure as a binding error.
    ///
    /// Configuration errors (e.g. a missing encryption provider) and
    /// cancellation keep their own kind.
    pub fn into_binding(self, contract: &str, member: &str) -> Self {
        match self {
            Error::Transform { reason, .. } => Error::Binding {
                contract: contract.to_string(),
                member: member.to_string(),
                reason,
            },
            Error::WrongType { expected, actual } => Error::Binding {
                contract: contract.to_string(),
                member: member.to_string(),
                reason: format!("expected {expected}, got {actual}"),
            },
            other => other,
        }
    }

    /// Re-scope a transform or conversion failure as a mapping error on `row`.
    pub fn into_mapping(self, row: usize, member: &str) -> Self {
        match self {
            Error::Transform { reason, .. } => Error::Mapping {
                row,
                reason: format!("{member}: {reason}"),
            },
            Error::WrongType { expected, actual } => Error::Mapping {
                row,
                reason: format!("{member}: expected {expected}, got {actual}"),
            },
            Error::InvalidInput { reason } => Error::Mapping {
                row,
                reason: format!("{member}: {reason}"),
            },
            other => other,
        }
    }
}
