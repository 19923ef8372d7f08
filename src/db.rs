use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;

use crate::config::Config;

fn pool_options(config: &Config) -> MySqlPoolOptions {
    MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
}

pub async fn init_db(config: &Config) -> Result<MySqlPool> {
    pool_options(config)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")
}

/// Applies the embedded schema migrations.
pub async fn run_migrations(pool: &MySqlPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run migrations")
}

/// Pool that connects on first use; lets HTTP tests exercise rejections that
/// never reach the store.
#[cfg(test)]
pub(crate) fn lazy_pool(config: &Config) -> MySqlPool {
    pool_options(config)
        .connect_lazy(&config.database_url)
        .expect("valid test database url")
}
