//! Account service: the ledger core of the bank
//!
//! Accounts, their operation log and the clients that own them are kept in
//! a storage backend (PostgreSQL or in-memory); the [`Bank`] drives every
//! balance change through it transactionally.

pub mod bank;
pub mod clients;
pub mod config;
pub mod operation_log;
pub mod repository;
pub mod store;

pub use bank::{Bank, BatchReport, RepositoryType, TransferOutcome};
pub use clients::{ClientDirectory, InMemoryClientDirectory, PostgresClientDirectory};
pub use config::{BankConfig, FeeConfig, InterestConfig};
pub use operation_log::{InMemoryOperationLog, OperationLog, PostgresOperationLog};
pub use repository::{AccountRepository, InMemoryAccountRepository, PostgresAccountRepository};
pub use store::InMemoryStore;
