use std::time::Duration;

use sqlx::migrate::MigrateError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use shared_config::AppConfig;

fn pool_options(config: &AppConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(config.database_acquire_timeout_secs))
}

/// Opens the pool and verifies a connection can be made.
pub async fn connect(config: &AppConfig) -> Result<PgPool, sqlx::Error> {
    let pool = pool_options(config).connect(&config.database_url).await?;
    info!(
        "Connected to Postgres (max {} connections)",
        config.database_max_connections
    );
    Ok(pool)
}

/// Builds the pool without connecting; connections are opened on first use.
pub fn connect_lazy(config: &AppConfig) -> Result<PgPool, sqlx::Error> {
    pool_options(config).connect_lazy(&config.database_url)
}

/// Applies the versioned schema. Runs once at startup, never from a request.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}
