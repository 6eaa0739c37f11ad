//! Common types and utilities for the bank ledger
//!
//! This library contains the shared domain model (clients, accounts and their
//! operation log), money helpers, the unified error type, and the database
//! plumbing (row types, pool setup and transaction management) used by the
//! account service.

pub mod error;
pub mod model;
pub mod decimal;
pub mod db;

/// Re-export important types
pub use error::{Error, Result, ErrorExt};
pub use decimal::*;

// Re-export database types
pub use db::transaction::{TransactionManager, PgSession, InMemoryTransactionManager, Snapshot};
