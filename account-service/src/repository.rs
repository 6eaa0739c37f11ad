//! Repository for account data

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use common::db::models::DbAccount;
use common::error::{Error, Result};
use common::model::{Account, AccountId, ClientId, NewAccount};
use common::{InMemoryTransactionManager, PgSession, TransactionManager};
use dashmap::DashSet;
use tracing::debug;

use crate::operation_log::{InMemoryOperationLog, OperationLog, PostgresOperationLog};
use crate::store::InMemoryStore;

/// Account repository trait defining the interface for account data storage
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Get the transaction manager
    fn transaction_manager(&self) -> &dyn TransactionManager;

    /// Get the operation log the repository reconstructs and cascades through
    fn operation_log(&self) -> &dyn OperationLog;

    /// Get a fully reconstructed account by ID
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>>;

    /// IDs of every account owned by a client
    async fn find_all_ids_for_client(&self, client_id: ClientId) -> Result<BTreeSet<AccountId>>;

    /// Every account, fully reconstructed, ordered by ID
    async fn find_all(&self) -> Result<Vec<Account>>;

    /// Persist a new account and return its generated ID
    async fn create(&self, account: &NewAccount) -> Result<AccountId>;

    /// Persist the balance and variant fields of an account
    async fn update(&self, account: &Account) -> Result<()>;

    /// Delete an account together with all of its operations
    async fn delete(&self, id: AccountId) -> Result<()>;

    /// Begin a database transaction
    async fn begin(&self) -> Result<()> {
        self.transaction_manager().begin().await
    }

    /// Commit the active transaction
    async fn commit(&self) -> Result<()> {
        self.transaction_manager().commit().await
    }

    /// Roll back the active transaction
    async fn rollback(&self) -> Result<()> {
        self.transaction_manager().rollback().await
    }

    /// Close the transactional scope
    async fn end(&self) -> Result<()> {
        self.transaction_manager().end().await
    }
}

/// Rebuild an account from its row: the stored type tag picks the variant,
/// then the operations are loaded from the log.
pub async fn reconstruct(row: DbAccount, operations: &dyn OperationLog) -> Result<Account> {
    let history = operations.find_by_account_id(row.id).await?;
    row.into_account(history)
}

/// In-memory repository for account data
pub struct InMemoryAccountRepository {
    store: Arc<InMemoryStore>,
    operations: InMemoryOperationLog,
    transaction_manager: InMemoryTransactionManager<InMemoryStore>,
    failing_updates: DashSet<AccountId>,
}

impl InMemoryAccountRepository {
    /// Create a new in-memory account repository over a store
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self {
            operations: InMemoryOperationLog::new(store.clone()),
            transaction_manager: InMemoryTransactionManager::new(store.clone()),
            store,
            failing_updates: DashSet::new(),
        }
    }

    /// The backing store
    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Make every later `update` of this account fail with a persistence error
    pub fn fail_updates_for(&self, id: AccountId) {
        self.failing_updates.insert(id);
    }

    /// Stop failing updates of this account
    pub fn clear_failure(&self, id: AccountId) {
        self.failing_updates.remove(&id);
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    fn transaction_manager(&self) -> &dyn TransactionManager {
        &self.transaction_manager
    }

    fn operation_log(&self) -> &dyn OperationLog {
        &self.operations
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        let row = self.store.accounts.get(&id).map(|r| r.clone());
        match row {
            Some(row) => Ok(Some(reconstruct(row, &self.operations).await?)),
            None => Ok(None),
        }
    }

    async fn find_all_ids_for_client(&self, client_id: ClientId) -> Result<BTreeSet<AccountId>> {
        Ok(self.store.accounts
            .iter()
            .filter(|entry| entry.value().client_id == client_id)
            .map(|entry| *entry.key())
            .collect())
    }

    async fn find_all(&self) -> Result<Vec<Account>> {
        let mut rows: Vec<DbAccount> = self.store.accounts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.id);

        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            accounts.push(reconstruct(row, &self.operations).await?);
        }
        Ok(accounts)
    }

    async fn create(&self, account: &NewAccount) -> Result<AccountId> {
        if !self.store.clients.contains_key(&account.owner_id) {
            return Err(Error::ClientNotFound(account.owner_id));
        }

        let id = self.store.next_account_id();
        let account = account.clone().assign_id(id);
        self.store.accounts.insert(id, DbAccount::from(&account));
        Ok(id)
    }

    async fn update(&self, account: &Account) -> Result<()> {
        if self.failing_updates.contains(&account.id) {
            return Err(Error::Persistence(format!("Simulated failure updating account {}", account.id)));
        }

        let mut row = self.store.accounts
            .get_mut(&account.id)
            .ok_or(Error::AccountNotFound(account.id))?;

        let updated = DbAccount::from(account);
        row.balance = updated.balance;
        row.has_passbook = updated.has_passbook;
        row.bonus_rate = updated.bonus_rate;
        Ok(())
    }

    async fn delete(&self, id: AccountId) -> Result<()> {
        if !self.store.accounts.contains_key(&id) {
            return Err(Error::AccountNotFound(id));
        }

        let removed = self.operations.delete_for_account(id).await?;
        self.store.accounts.remove(&id);
        debug!("Deleted account {} and {} operations", id, removed);
        Ok(())
    }
}

/// PostgreSQL repository for account data
pub struct PostgresAccountRepository {
    session: Arc<PgSession>,
    operations: PostgresOperationLog,
}

const SELECT_ACCOUNT: &str =
    "SELECT id, client_id, account_type, balance,
            EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at,
            has_passbook, bonus_rate
     FROM accounts";

impl PostgresAccountRepository {
    /// Create a new PostgreSQL account repository over a session
    pub fn new(session: Arc<PgSession>) -> Self {
        Self {
            operations: PostgresOperationLog::new(session.clone()),
            session,
        }
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    fn transaction_manager(&self) -> &dyn TransactionManager {
        &*self.session
    }

    fn operation_log(&self) -> &dyn OperationLog {
        &self.operations
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        debug!("Getting account from database: {}", id);

        let sql = format!("{} WHERE id = $1", SELECT_ACCOUNT);
        let row = self.session.fetch_optional(
            sqlx::query_as::<_, DbAccount>(&sql).bind(id)
        ).await?;

        match row {
            Some(row) => Ok(Some(reconstruct(row, &self.operations).await?)),
            None => Ok(None),
        }
    }

    async fn find_all_ids_for_client(&self, client_id: ClientId) -> Result<BTreeSet<AccountId>> {
        debug!("Getting account ids for client: {}", client_id);

        let rows = self.session.fetch_all(
            sqlx::query_as::<_, (AccountId,)>("SELECT id FROM accounts WHERE client_id = $1")
                .bind(client_id)
        ).await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn find_all(&self) -> Result<Vec<Account>> {
        debug!("Getting all accounts from database");

        let sql = format!("{} ORDER BY id", SELECT_ACCOUNT);
        let rows = self.session.fetch_all(sqlx::query_as::<_, DbAccount>(&sql)).await?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            accounts.push(reconstruct(row, &self.operations).await?);
        }
        Ok(accounts)
    }

    async fn create(&self, account: &NewAccount) -> Result<AccountId> {
        debug!("Creating {} account for client {}", account.kind.account_type(), account.owner_id);

        let row = DbAccount::from(&account.clone().assign_id(0));
        let (id,) = self.session.fetch_one(
            sqlx::query_as::<_, (AccountId,)>(
                "INSERT INTO accounts (client_id, account_type, balance, created_at, has_passbook, bonus_rate)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id"
            )
            .bind(row.client_id)
            .bind(&row.account_type)
            .bind(row.balance)
            .bind(account.created_at)
            .bind(row.has_passbook)
            .bind(row.bonus_rate)
        ).await?;

        Ok(id)
    }

    async fn update(&self, account: &Account) -> Result<()> {
        debug!("Updating account in database: {}", account.id);

        let row = DbAccount::from(account);
        let affected = self.session.execute(
            sqlx::query(
                "UPDATE accounts SET balance = $2, has_passbook = $3, bonus_rate = $4 WHERE id = $1"
            )
            .bind(row.id)
            .bind(row.balance)
            .bind(row.has_passbook)
            .bind(row.bonus_rate)
        ).await?;

        if affected == 0 {
            return Err(Error::AccountNotFound(account.id));
        }
        Ok(())
    }

    async fn delete(&self, id: AccountId) -> Result<()> {
        debug!("Deleting account from database: {}", id);

        let removed = self.operations.delete_for_account(id).await?;
        let affected = self.session.execute(
            sqlx::query("DELETE FROM accounts WHERE id = $1").bind(id)
        ).await?;

        if affected == 0 {
            return Err(Error::AccountNotFound(id));
        }
        debug!("Deleted account {} and {} operations", id, removed);
        Ok(())
    }
}
