use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use tif_core::config::PostgresConfig;

/// Connect to PostgreSQL when it is configured. Returns `None` (and logs why)
/// so callers can fall back to in-memory services.
pub async fn init_pg_pool(config: &PostgresConfig) -> Option<PgPool> {
    if !config.is_configured() {
        warn!("PG_USERNAME not configured, durable stores disabled");
        return None;
    }

    match PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await
    {
        Ok(pool) => {
            info!(host = %config.host, database = %config.database, "PostgreSQL connected");
            Some(pool)
        }
        Err(e) => {
            warn!("Failed to connect to PostgreSQL: {}, durable stores disabled", e);
            None
        }
    }
}
