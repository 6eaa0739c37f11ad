//! Error types for the bank ledger
//!
//! This module provides a unified error handling system for the ledger core
//! and its storage backends. Business-rule and validation failures are
//! recoverable and must reach the caller of the bank operation; storage
//! failures abort (and roll back) whatever transaction they happen in.

use std::fmt::Display;
use thiserror::Error;

use crate::decimal::Amount;
use crate::model::{AccountId, ClientId};

/// Bank ledger error type
#[derive(Debug, Error)]
pub enum Error {
    /// A savings account cannot cover a debit
    #[error("Insufficient funds in account {account_id} to debit {amount}")]
    InsufficientFunds {
        account_id: AccountId,
        amount: Amount,
    },

    /// Error when a client cannot be found
    #[error("Client not found: {0}")]
    ClientNotFound(ClientId),

    /// Error when an account cannot be found
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// The account exists but belongs to another client
    #[error("Account {account_id} does not belong to client {client_id}")]
    OwnershipMismatch {
        client_id: ClientId,
        account_id: AccountId,
    },

    /// Generic validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Storage-layer failure not raised by the database driver
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A persisted row cannot be turned back into a domain value
    #[error("Reconstruction error: {0}")]
    Reconstruction(String),

    /// Transaction control used out of order (nested begin, commit without begin)
    #[error("Transaction error: {0}")]
    TransactionState(String),

    /// A transactional batch failed and was rolled back as a whole
    #[error("Batch '{batch}' aborted and rolled back: {source}")]
    BatchAborted {
        batch: String,
        #[source]
        source: Box<Error>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Decimal conversion or overflow error
    #[error("Decimal error: {0}")]
    DecimalError(String),
}

impl Error {
    /// Business-rule and lookup failures the caller is expected to handle
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientFunds { .. }
                | Error::ClientNotFound(_)
                | Error::AccountNotFound(_)
                | Error::OwnershipMismatch { .. }
                | Error::ValidationError(_)
                | Error::DecimalError(_)
        )
    }

    /// Failures raised by the storage layer
    pub fn is_persistence(&self) -> bool {
        matches!(self, Error::Persistence(_) | Error::Database(_))
    }

    /// Wrap an error as the cause of an aborted batch
    pub fn batch_aborted(batch: impl Into<String>, source: Error) -> Self {
        Error::BatchAborted {
            batch: batch.into(),
            source: Box::new(source),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait to add context to error results
pub trait ErrorExt<T> {
    /// Add context information to an error
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display;
}

impl<T> ErrorExt<T> for Result<T> {
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        self.map_err(|e| {
            let context = context_fn().to_string();
            match e {
                Error::ValidationError(msg) => Error::ValidationError(format!("{}: {}", context, msg)),
                Error::Persistence(msg) => Error::Persistence(format!("{}: {}", context, msg)),
                Error::Reconstruction(msg) => Error::Reconstruction(format!("{}: {}", context, msg)),
                Error::TransactionState(msg) => Error::TransactionState(format!("{}: {}", context, msg)),
                Error::ConfigurationError(msg) => Error::ConfigurationError(format!("{}: {}", context, msg)),
                Error::Internal(msg) => Error::Internal(format!("{}: {}", context, msg)),
                Error::DecimalError(msg) => Error::DecimalError(format!("{}: {}", context, msg)),
                other => other,
            }
        })
    }
}

/// Convert string messages into an error
impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Internal(message)
    }
}

/// Convert static string references into an error
impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::Internal(message.to_string())
    }
}

/// From rust_decimal::Error
impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::DecimalError(err.to_string())
    }
}
