// ABOUTME: Data layer for Vantage: SQLite pool bootstrap, migrations, storage errors
// ABOUTME: Domain crates build their stores on top of the pool this package hands out

use thiserror::Error;

pub mod pool;

pub use pool::{connect, connect_memory, run_migrations};

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Record not found")]
    NotFound,
    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
