//! Operation log: the persisted history of deposits and debits

use std::sync::Arc;

use async_trait::async_trait;
use common::db::models::DbOperation;
use common::error::{Error, Result};
use common::model::{AccountId, Operation, OperationId};
use common::PgSession;
use tracing::debug;

use crate::store::InMemoryStore;

/// Operation log trait defining the interface for operation storage
#[async_trait]
pub trait OperationLog: Send + Sync {
    /// Record an operation and return its id. The account must exist.
    async fn create(&self, operation: &Operation) -> Result<OperationId>;

    /// Operations of an account, in creation order
    async fn find_by_account_id(&self, account_id: AccountId) -> Result<Vec<Operation>>;

    /// Delete a single operation
    async fn delete(&self, id: OperationId) -> Result<()>;

    /// Delete every operation of an account, returning how many were removed
    async fn delete_for_account(&self, account_id: AccountId) -> Result<u64>;
}

/// In-memory operation log
pub struct InMemoryOperationLog {
    store: Arc<InMemoryStore>,
}

impl InMemoryOperationLog {
    /// Create a new in-memory operation log over a store
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OperationLog for InMemoryOperationLog {
    async fn create(&self, operation: &Operation) -> Result<OperationId> {
        if !self.store.accounts.contains_key(&operation.account_id) {
            return Err(Error::AccountNotFound(operation.account_id));
        }

        let id = self.store.next_operation_id();
        self.store.operations.insert(id, DbOperation::recorded(id, operation));
        Ok(id)
    }

    async fn find_by_account_id(&self, account_id: AccountId) -> Result<Vec<Operation>> {
        let mut rows: Vec<DbOperation> = self.store.operations
            .iter()
            .filter(|entry| entry.value().account_id == account_id)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.id);

        rows.into_iter().map(DbOperation::into_operation).collect()
    }

    async fn delete(&self, id: OperationId) -> Result<()> {
        self.store.operations
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::Persistence(format!("Operation not found: {}", id)))
    }

    async fn delete_for_account(&self, account_id: AccountId) -> Result<u64> {
        let before = self.store.operations.len();
        self.store.operations.retain(|_, row| row.account_id != account_id);
        Ok((before - self.store.operations.len()) as u64)
    }
}

/// PostgreSQL operation log
pub struct PostgresOperationLog {
    session: Arc<PgSession>,
}

impl PostgresOperationLog {
    /// Create a new PostgreSQL operation log over a session
    pub fn new(session: Arc<PgSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl OperationLog for PostgresOperationLog {
    async fn create(&self, operation: &Operation) -> Result<OperationId> {
        debug!("Recording {} of {} on account {}", operation.kind, operation.amount, operation.account_id);

        let (id,) = self.session.fetch_one(
            sqlx::query_as::<_, (OperationId,)>(
                "INSERT INTO operations (account_id, kind, amount, description, created_at)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id"
            )
            .bind(operation.account_id)
            .bind(operation.kind.as_str())
            .bind(operation.amount)
            .bind(&operation.description)
            .bind(operation.created_at)
        ).await?;

        Ok(id)
    }

    async fn find_by_account_id(&self, account_id: AccountId) -> Result<Vec<Operation>> {
        debug!("Loading operations for account: {}", account_id);

        let rows = self.session.fetch_all(
            sqlx::query_as::<_, DbOperation>(
                "SELECT id, account_id, kind, amount, description,
                        EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at
                 FROM operations
                 WHERE account_id = $1
                 ORDER BY id"
            )
            .bind(account_id)
        ).await?;

        rows.into_iter().map(DbOperation::into_operation).collect()
    }

    async fn delete(&self, id: OperationId) -> Result<()> {
        let affected = self.session.execute(
            sqlx::query("DELETE FROM operations WHERE id = $1").bind(id)
        ).await?;

        if affected == 0 {
            return Err(Error::Persistence(format!("Operation not found: {}", id)));
        }
        Ok(())
    }

    async fn delete_for_account(&self, account_id: AccountId) -> Result<u64> {
        debug!("Deleting operations of account: {}", account_id);

        self.session.execute(
            sqlx::query("DELETE FROM operations WHERE account_id = $1").bind(account_id)
        ).await
    }
}
