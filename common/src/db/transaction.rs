//! Transaction handling for database operations
//!
//! A bank instance owns exactly one transactional session. The repositories
//! built on top of it share that session, so every write issued while a
//! transaction is active belongs to it. Only one transaction may be active at
//! a time; nested `begin` calls are rejected.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::{Query, QueryAs};
use sqlx::{FromRow, PgPool, Postgres, Transaction as SqlxTransaction};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Transaction control shared by every repository of a session
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Begin a new transaction; fails if one is already active
    async fn begin(&self) -> Result<()>;

    /// Commit the active transaction
    async fn commit(&self) -> Result<()>;

    /// Roll back the active transaction
    async fn rollback(&self) -> Result<()>;

    /// Close the transactional scope, rolling back anything left open
    async fn end(&self) -> Result<()>;

    /// Whether a transaction is currently active
    async fn is_active(&self) -> bool;
}

fn already_active() -> Error {
    Error::TransactionState("A transaction is already active".to_string())
}

fn not_active() -> Error {
    Error::TransactionState("No active transaction".to_string())
}

/// A PostgreSQL session: the pool plus the single active transaction, if any.
/// Queries go through the transaction while one is active.
pub struct PgSession {
    pool: PgPool,
    transaction: Mutex<Option<SqlxTransaction<'static, Postgres>>>,
}

impl PgSession {
    /// Create a new session over a pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            transaction: Mutex::new(None),
        }
    }

    /// The underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Execute a statement, returning the number of affected rows
    pub async fn execute(&self, query: Query<'_, Postgres, PgArguments>) -> Result<u64> {
        let mut guard = self.transaction.lock().await;
        let result = match guard.as_mut() {
            Some(tx) => query.execute(&mut **tx).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(result.rows_affected())
    }

    /// Fetch at most one row
    pub async fn fetch_optional<'q, O>(&self, query: QueryAs<'q, Postgres, O, PgArguments>) -> Result<Option<O>>
    where
        O: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        let mut guard = self.transaction.lock().await;
        let row = match guard.as_mut() {
            Some(tx) => query.fetch_optional(&mut **tx).await?,
            None => query.fetch_optional(&self.pool).await?,
        };
        Ok(row)
    }

    /// Fetch exactly one row
    pub async fn fetch_one<'q, O>(&self, query: QueryAs<'q, Postgres, O, PgArguments>) -> Result<O>
    where
        O: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        let mut guard = self.transaction.lock().await;
        let row = match guard.as_mut() {
            Some(tx) => query.fetch_one(&mut **tx).await?,
            None => query.fetch_one(&self.pool).await?,
        };
        Ok(row)
    }

    /// Fetch every row
    pub async fn fetch_all<'q, O>(&self, query: QueryAs<'q, Postgres, O, PgArguments>) -> Result<Vec<O>>
    where
        O: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        let mut guard = self.transaction.lock().await;
        let rows = match guard.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await?,
            None => query.fetch_all(&self.pool).await?,
        };
        Ok(rows)
    }
}

#[async_trait]
impl TransactionManager for PgSession {
    async fn begin(&self) -> Result<()> {
        let mut guard = self.transaction.lock().await;
        if guard.is_some() {
            return Err(already_active());
        }
        *guard = Some(self.pool.begin().await?);
        debug!("Transaction started");
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let tx = self.transaction.lock().await.take().ok_or_else(not_active)?;
        tx.commit().await?;
        debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let tx = self.transaction.lock().await.take().ok_or_else(not_active)?;
        tx.rollback().await?;
        debug!("Transaction rolled back");
        Ok(())
    }

    async fn end(&self) -> Result<()> {
        let open = self.transaction.lock().await.take();
        if let Some(tx) = open {
            warn!("Transaction still open at end of scope, rolling back");
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn is_active(&self) -> bool {
        self.transaction.lock().await.is_some()
    }
}

/// State that can be captured and restored wholesale, used by the in-memory
/// transaction manager
pub trait Snapshot: Send + Sync {
    /// Captured copy of the state
    type State: Send;

    /// Copy the current state
    fn capture(&self) -> Self::State;

    /// Replace the current state with a captured copy
    fn restore(&self, state: Self::State);
}

/// In-memory transaction manager: `begin` snapshots the store, `rollback`
/// restores it, `commit` discards the snapshot.
pub struct InMemoryTransactionManager<S: Snapshot> {
    store: Arc<S>,
    saved: Mutex<Option<S::State>>,
}

impl<S: Snapshot> InMemoryTransactionManager<S> {
    /// Create a new in-memory transaction manager over a store
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            saved: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<S> TransactionManager for InMemoryTransactionManager<S>
where
    S: Snapshot + 'static,
{
    async fn begin(&self) -> Result<()> {
        let mut saved = self.saved.lock().await;
        if saved.is_some() {
            return Err(already_active());
        }
        *saved = Some(self.store.capture());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.saved.lock().await.take().ok_or_else(not_active)?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let state = self.saved.lock().await.take().ok_or_else(not_active)?;
        self.store.restore(state);
        Ok(())
    }

    async fn end(&self) -> Result<()> {
        let open = self.saved.lock().await.take();
        if let Some(state) = open {
            warn!("Transaction still open at end of scope, rolling back");
            self.store.restore(state);
        }
        Ok(())
    }

    async fn is_active(&self) -> bool {
        self.saved.lock().await.is_some()
    }
}
