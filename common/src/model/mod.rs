//! Domain models for the bank ledger

pub mod account;
pub mod operation;
pub mod client;

/// Storage-assigned identity of an account
pub type AccountId = i64;

/// Storage-assigned identity of a client
pub type ClientId = i64;

/// Storage-assigned identity of an operation
pub type OperationId = i64;

pub use account::{Account, AccountKind, AccountType, NewAccount, Posting};
pub use operation::{Operation, OperationKind};
pub use client::{Client, NewClient};
