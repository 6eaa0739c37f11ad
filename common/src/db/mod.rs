use std::path::Path;

use sqlx::{postgres::PgPoolOptions, PgPool, Pool, Postgres};
use tracing::info;

use crate::error::{Error, Result};

pub mod models;
pub mod transaction;

// Re-export transaction types
pub use transaction::{
    TransactionManager, PgSession,
    InMemoryTransactionManager, Snapshot,
};

/// Database pool type
pub type DbPool = Pool<Postgres>;

/// Initialize the database connection pool
pub async fn init_db_pool(database_url: &str, max_connections: u32) -> Result<DbPool> {
    if database_url.is_empty() {
        return Err(Error::ConfigurationError("DATABASE_URL must be set".to_string()));
    }

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    info!("Connected to PostgreSQL database (pool size {})", max_connections);
    Ok(pool)
}

/// Run migrations on the database
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrations_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .ok_or_else(|| Error::ConfigurationError("Cannot locate workspace root".to_string()))?
        .join("migrations");

    sqlx::migrate::Migrator::new(migrations_path)
        .await?
        .run(pool)
        .await?;

    info!("Database migrations applied");
    Ok(())
}
