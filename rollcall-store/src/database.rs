use rollcall_core::StoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::app_config::DatabaseConfig;

// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Maps driver errors onto the store taxonomy.
pub(crate) fn map_db_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut => return StoreError::PoolExhausted,
        sqlx::Error::Database(db_err) => {
            if db_err.is_unique_violation() {
                return StoreError::Duplicate {
                    constraint: db_err.constraint().unwrap_or_default().to_string(),
                };
            }
            if db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE) {
                return StoreError::Busy;
            }
        }
        _ => {}
    }
    StoreError::Database(err.to_string())
}
