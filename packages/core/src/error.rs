//! Error taxonomy shared by every pipe.

use crate::schema::SchemaError;

/// Errors surfaced by record and pipe operations.
///
/// Validation errors ([`PipeError::KeyNotFound`], [`PipeError::Schema`]) are
/// surfaced immediately to the caller and never retried. Transactional
/// failures carry the underlying cause after rollback.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// A read or write referenced a field the record does not carry.
    #[error("key not found: {name}")]
    KeyNotFound {
        /// The missing field name.
        name: String,
    },

    /// Schema violation (missing name or wrong kind).
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A structurally unsupported operation or expression node.
    ///
    /// Raised by the predicate compiler for node kinds it has no rule for,
    /// and by backends for capabilities they cannot provide (e.g. `delete`
    /// on the file pipe, binding on a pipe that does not advertise it).
    #[error("unsupported: {what}")]
    Unsupported {
        /// Description of the unsupported operation or node kind.
        what: String,
    },

    /// A SQL execution failed; the transaction was rolled back before this
    /// error was returned. Never a partial commit.
    #[error("transaction failed: {source}")]
    Transaction {
        /// The underlying backend error.
        #[source]
        source: anyhow::Error,
    },

    /// Anything else from a backend.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PipeError {
    /// Shorthand for [`PipeError::Unsupported`].
    #[must_use]
    pub fn unsupported(what: impl Into<String>) -> Self {
        PipeError::Unsupported { what: what.into() }
    }

    /// Shorthand for [`PipeError::KeyNotFound`].
    #[must_use]
    pub fn key_not_found(name: impl Into<String>) -> Self {
        PipeError::KeyNotFound { name: name.into() }
    }
}
