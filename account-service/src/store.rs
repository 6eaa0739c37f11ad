//! In-memory tables backing the in-memory repositories

use std::sync::atomic::{AtomicI64, Ordering};

use common::db::models::{DbAccount, DbClient, DbOperation};
use common::model::{AccountId, ClientId, OperationId};
use common::Snapshot;
use dashmap::DashMap;

/// Tables for clients, accounts and operations. Rows are stored exactly as
/// the database would store them, so reads go through the same
/// reconstruction path as the PostgreSQL backend.
pub struct InMemoryStore {
    /// Clients by ID
    pub clients: DashMap<ClientId, DbClient>,
    /// Accounts by ID
    pub accounts: DashMap<AccountId, DbAccount>,
    /// Operations by ID
    pub operations: DashMap<OperationId, DbOperation>,
    next_client_id: AtomicI64,
    next_account_id: AtomicI64,
    next_operation_id: AtomicI64,
}

/// Copy of every table taken at `begin`
pub struct StoreState {
    clients: DashMap<ClientId, DbClient>,
    accounts: DashMap<AccountId, DbAccount>,
    operations: DashMap<OperationId, DbOperation>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            accounts: DashMap::new(),
            operations: DashMap::new(),
            next_client_id: AtomicI64::new(1),
            next_account_id: AtomicI64::new(1),
            next_operation_id: AtomicI64::new(1),
        }
    }

    pub(crate) fn next_client_id(&self) -> ClientId {
        self.next_client_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn next_account_id(&self) -> AccountId {
        self.next_account_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn next_operation_id(&self) -> OperationId {
        self.next_operation_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn replace<K, V>(table: &DashMap<K, V>, rows: DashMap<K, V>)
where
    K: Eq + std::hash::Hash,
{
    table.clear();
    for (key, value) in rows {
        table.insert(key, value);
    }
}

// Identity counters are not restored, like database sequences.
impl Snapshot for InMemoryStore {
    type State = StoreState;

    fn capture(&self) -> StoreState {
        StoreState {
            clients: self.clients.clone(),
            accounts: self.accounts.clone(),
            operations: self.operations.clone(),
        }
    }

    fn restore(&self, state: StoreState) {
        replace(&self.clients, state.clients);
        replace(&self.accounts, state.accounts);
        replace(&self.operations, state.operations);
    }
}
