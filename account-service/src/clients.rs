//! Client directory: registration and lookup of bank clients

use std::sync::Arc;

use async_trait::async_trait;
use common::db::models::DbClient;
use common::error::{Error, Result};
use common::model::{Client, ClientId, NewClient};
use common::PgSession;
use tracing::debug;

use crate::store::InMemoryStore;

/// Client directory trait
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// Register a client and return its generated ID
    async fn create(&self, client: &NewClient) -> Result<ClientId>;

    /// Get a client by ID
    async fn find_by_id(&self, id: ClientId) -> Result<Option<Client>>;

    /// Get a client by national id
    async fn find_by_national_id(&self, national_id: &str) -> Result<Option<Client>>;

    /// Every client, ordered by ID
    async fn find_all(&self) -> Result<Vec<Client>>;

    /// Remove a client record
    async fn delete(&self, id: ClientId) -> Result<()>;

    /// Whether a client is registered
    async fn exists(&self, id: ClientId) -> Result<bool> {
        Ok(self.find_by_id(id).await?.is_some())
    }
}

/// In-memory client directory
pub struct InMemoryClientDirectory {
    store: Arc<InMemoryStore>,
}

impl InMemoryClientDirectory {
    /// Create a new in-memory client directory over a store
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ClientDirectory for InMemoryClientDirectory {
    async fn create(&self, client: &NewClient) -> Result<ClientId> {
        let id = self.store.next_client_id();
        let client = client.clone().assign_id(id);
        self.store.clients.insert(id, DbClient::from(&client));
        Ok(id)
    }

    async fn find_by_id(&self, id: ClientId) -> Result<Option<Client>> {
        let row = self.store.clients.get(&id).map(|r| r.clone());
        row.map(DbClient::into_client).transpose()
    }

    async fn find_by_national_id(&self, national_id: &str) -> Result<Option<Client>> {
        let row = self.store.clients
            .iter()
            .find(|entry| entry.value().national_id == national_id)
            .map(|entry| entry.value().clone());
        row.map(DbClient::into_client).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Client>> {
        let mut rows: Vec<DbClient> = self.store.clients
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.id);

        rows.into_iter().map(DbClient::into_client).collect()
    }

    async fn delete(&self, id: ClientId) -> Result<()> {
        self.store.clients
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::ClientNotFound(id))
    }
}

/// PostgreSQL client directory
pub struct PostgresClientDirectory {
    session: Arc<PgSession>,
}

const SELECT_CLIENT: &str =
    "SELECT id, national_id, first_name, last_name, phone, birth_date,
            EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at
     FROM clients";

impl PostgresClientDirectory {
    /// Create a new PostgreSQL client directory over a session
    pub fn new(session: Arc<PgSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ClientDirectory for PostgresClientDirectory {
    async fn create(&self, client: &NewClient) -> Result<ClientId> {
        debug!("Registering client: {}", client.national_id);

        let (id,) = self.session.fetch_one(
            sqlx::query_as::<_, (ClientId,)>(
                "INSERT INTO clients (national_id, first_name, last_name, phone, birth_date)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id"
            )
            .bind(&client.national_id)
            .bind(&client.first_name)
            .bind(&client.last_name)
            .bind(&client.phone)
            .bind(client.birth_date)
        ).await?;

        Ok(id)
    }

    async fn find_by_id(&self, id: ClientId) -> Result<Option<Client>> {
        let sql = format!("{} WHERE id = $1", SELECT_CLIENT);
        let row = self.session.fetch_optional(
            sqlx::query_as::<_, DbClient>(&sql).bind(id)
        ).await?;

        row.map(DbClient::into_client).transpose()
    }

    async fn find_by_national_id(&self, national_id: &str) -> Result<Option<Client>> {
        let sql = format!("{} WHERE national_id = $1", SELECT_CLIENT);
        let row = self.session.fetch_optional(
            sqlx::query_as::<_, DbClient>(&sql).bind(national_id)
        ).await?;

        row.map(DbClient::into_client).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Client>> {
        let sql = format!("{} ORDER BY id", SELECT_CLIENT);
        let rows = self.session.fetch_all(sqlx::query_as::<_, DbClient>(&sql)).await?;

        rows.into_iter().map(DbClient::into_client).collect()
    }

    async fn delete(&self, id: ClientId) -> Result<()> {
        let affected = self.session.execute(
            sqlx::query("DELETE FROM clients WHERE id = $1").bind(id)
        ).await?;

        if affected == 0 {
            return Err(Error::ClientNotFound(id));
        }
        Ok(())
    }
}
