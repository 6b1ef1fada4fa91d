//! Database Module
//!
//! PostgreSQL pool construction and schema migrations for the `postgres`
//! backend.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::DatabaseSettings;

/// Open a pool sized from `settings`.
pub async fn create_pool(settings: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout))
        .connect(&settings.url)
        .await
}

/// Apply the embedded `migrations/` directory.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Open the pool and bring the schema up to date.
pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<PgPool> {
    let pool = create_pool(settings).await?;
    info!(
        max_connections = settings.max_connections,
        "Database pool established"
    );
    run_migrations(&pool).await?;
    info!("Database migrations applied");
    Ok(pool)
}
