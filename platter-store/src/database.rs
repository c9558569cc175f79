use platter_core::CoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Infrastructure failures keep their detail for the log; the API boundary hides it.
pub(crate) fn storage_error(e: sqlx::Error) -> CoreError {
    CoreError::StorageError(e.to_string())
}

pub(crate) fn version_to_db(version: u64) -> Result<i64, CoreError> {
    i64::try_from(version)
        .map_err(|_| CoreError::StorageError(format!("version {} out of range", version)))
}

pub(crate) fn version_from_db(version: i64) -> Result<u64, CoreError> {
    u64::try_from(version)
        .map_err(|_| CoreError::StorageError(format!("negative version {}", version)))
}

/// Serde name of a unit enum variant, e.g. `PaymentStatus::Completed` -> `COMPLETED`
pub(crate) fn status_label<T: serde::Serialize>(status: &T) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
