use std::fmt;

use crate::utils::IsTransient;

// ============================================================================
// Error Taxonomy
// ============================================================================
//
// One error type flows through the whole chain. Interceptors and the unit of
// work only observe it to decide between commit and rollback; it is handed
// back to the caller unchanged.
//
// ============================================================================

/// Which transaction operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOperation {
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for TransactionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionOperation::Begin => write!(f, "begin"),
            TransactionOperation::Commit => write!(f, "commit"),
            TransactionOperation::Rollback => write!(f, "rollback"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A handler or interceptor gave up on the message
    #[error("Chain aborted: {0}")]
    ChainAbort(#[from] anyhow::Error),

    #[error("Concurrency conflict on stream {stream_id}: expected sequence {expected}, but head is {actual}")]
    ConcurrencyConflict {
        stream_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Transaction {operation} failed: {reason}")]
    TransactionFailure {
        operation: TransactionOperation,
        reason: String,
    },

    #[error("No transaction is bound to the unit of work")]
    NoTransaction,

    #[error("Unit of work has already been executed")]
    AlreadyExecuted,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn transaction(operation: TransactionOperation, reason: impl Into<String>) -> Self {
        Error::TransactionFailure {
            operation,
            reason: reason.into(),
        }
    }

    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Error::ConcurrencyConflict { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ============================================================================
// Unit of Work Failure
// ============================================================================

/// Failure of a whole unit of work.
///
/// `cause` is the error raised inside the chain, untouched. A rollback that
/// failed on the way out is reported next to it.
#[derive(Debug)]
pub struct UnitOfWorkError {
    pub cause: Error,
    pub rollback_failure: Option<Error>,
}

impl UnitOfWorkError {
    pub fn new(cause: Error) -> Self {
        Self {
            cause,
            rollback_failure: None,
        }
    }
}

impl fmt::Display for UnitOfWorkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unit of work failed: {}", self.cause)?;
        if let Some(rollback) = &self.rollback_failure {
            write!(f, " (rollback also failed: {})", rollback)?;
        }
        Ok(())
    }
}

impl std::error::Error for UnitOfWorkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Only optimistic-concurrency conflicts are worth another attempt
impl IsTransient for UnitOfWorkError {
    fn is_transient(&self) -> bool {
        self.cause.is_concurrency_conflict()
    }
}
