use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::PostgresConfig;
use crate::utils::{retry_with_backoff, RetryConfig};

/// Open a pool, retrying the initial connection `conn_attempts` times.
pub async fn connect(config: &PostgresConfig, name: &'static str) -> anyhow::Result<PgPool> {
    let options = PgPoolOptions::new()
        .max_connections(config.max_pool_size)
        .acquire_timeout(config.conn_timeout());
    let url = config.url.as_str();

    let pool = retry_with_backoff(name, RetryConfig::connect(config.conn_attempts), |attempt| {
        let options = options.clone();
        async move {
            tracing::info!(pool = name, attempt, "Connecting to Postgres");
            options.connect(url).await
        }
    })
    .await
    .into_result()?;

    tracing::info!(pool = name, max_connections = config.max_pool_size, "✅ Postgres pool ready");
    Ok(pool)
}

pub async fn migrate_command(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations/command").run(pool).await?;
    tracing::info!("Command schema migrated");
    Ok(())
}

pub async fn migrate_query(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations/query").run(pool).await?;
    tracing::info!("Query schema migrated");
    Ok(())
}
