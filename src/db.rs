use anyhow::{Context, Result};
use article_sync_core::{StoreKind, SyncError};
use sqlx::error::ErrorKind;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

/// Opens the mirror pool. Used for the process lifetime.
pub async fn connect_mirror(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.mirror.max_connections)
        .connect(&config.mirror.url)
        .await
        .with_context(|| "Failed to connect to the mirror database")?;
    Ok(pool)
}

/// Maps a driver error onto the sync error taxonomy.
///
/// Transport failures are connectivity; constraint and data errors
/// reported by the server are integrity; the rest is a plain store error.
pub fn classify(store: StoreKind, err: sqlx::Error) -> SyncError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => SyncError::connectivity(store, err.to_string()),
        sqlx::Error::Database(db) => {
            let sqlstate_integrity = db
                .code()
                .map(|c| c.starts_with("22") || c.starts_with("23"))
                .unwrap_or(false);
            if sqlstate_integrity || !matches!(db.kind(), ErrorKind::Other) {
                SyncError::integrity(store, db.message())
            } else {
                SyncError::store(store, db.message())
            }
        }
        _ => SyncError::store(store, err.to_string()),
    }
}
