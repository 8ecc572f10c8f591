//! Metric storage backends
//!
//! [`MemoryStorage`] keeps everything in process; [`SqliteStorage`] persists
//! to a relational database through `rusqlite`.

mod aggregate;
mod database;
mod memory;
mod traits;

pub use aggregate::merge_batch;
pub use database::SqliteStorage;
pub use memory::MemoryStorage;
pub use traits::MetricStorage;

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors raised by storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Metric not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Open the relational backend when a DSN is configured, memory otherwise
pub async fn open_storage(database_dsn: &str) -> Result<Arc<dyn MetricStorage>, StorageError> {
    if database_dsn.is_empty() {
        info!("Using in-memory metric storage");
        return Ok(Arc::new(MemoryStorage::new()));
    }
    let storage = SqliteStorage::open(database_dsn).await?;
    info!("Using relational metric storage at {}", database_dsn);
    Ok(Arc::new(storage))
}
