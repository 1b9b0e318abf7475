//! Error types for graphtx
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::failure::{Classify, FailureKind};
use crate::types::{NodeId, RelationshipId, TxnId};
use std::io;
use thiserror::Error;

/// Result type alias for graphtx operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for graphtx
#[derive(Debug, Error)]
pub enum Error {
    /// An operation required an ambient transaction and none exists
    #[error("No active transaction scope on this thread")]
    NoActiveScope,

    /// Scope exit without a matching enter, or out of LIFO order
    #[error("Transaction scope imbalance: {0}")]
    ScopeImbalance(String),

    /// A background job failed while executing
    #[error("Background job '{job}' failed: {reason}")]
    JobFailure {
        /// Job name
        job: String,
        /// Failure description
        reason: String,
    },

    /// The background worker no longer accepts jobs
    #[error("Background worker is stopped")]
    WorkerStopped,

    /// Transaction was already committed or rolled back
    #[error("Transaction {0} is already closed")]
    TransactionClosed(TxnId),

    /// A pre-commit observer refused the commit; the transaction rolled back
    #[error("Commit vetoed by {handler}: {reason}")]
    CommitVetoed {
        /// Observer that refused
        handler: String,
        /// Reason given by the observer
        reason: String,
    },

    /// The store was shut down or hit a kernel panic
    #[error("Database is shut down")]
    DatabaseShutdown,

    /// Node does not exist (or was deleted in this transaction)
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Relationship does not exist (or was deleted in this transaction)
    #[error("Relationship not found: {0}")]
    RelationshipNotFound(RelationshipId),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (configuration files)
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl Error {
    /// True for scope plumbing errors, which always indicate a caller bug
    pub fn is_scope_error(&self) -> bool {
        matches!(self, Error::NoActiveScope | Error::ScopeImbalance(_))
    }
}

impl Classify for Error {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Error::NoActiveScope | Error::ScopeImbalance(_) => FailureKind::SCOPE,
            Error::JobFailure { .. } | Error::WorkerStopped => FailureKind::WORKER,
            Error::Config(_) | Error::IoError(_) => FailureKind::CONFIG,
            Error::TransactionClosed(_)
            | Error::CommitVetoed { .. }
            | Error::DatabaseShutdown
            | Error::NodeNotFound(_)
            | Error::RelationshipNotFound(_)
            | Error::InvalidOperation(_) => FailureKind::STORAGE,
        }
    }
}
