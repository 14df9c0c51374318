//! Persistence backends for SensorGate
//!
//! ## Backends
//!
//! | backend    | storage                                   | use            |
//! |------------|-------------------------------------------|----------------|
//! | `sqlite`   | one relational file, pooled connections   | production     |
//! | `document` | JSON collections in a directory           | no SQL on host |
//! | `memory`   | process memory                            | tests, dev     |
//!
//! All three implement [`SensorStore`] with the same contract: readings come
//! back oldest first and the requested range is closed at both ends.
//! Timestamps are stored as fixed-width UTC strings, so every backend can
//! compare them as text.
//!
//! ## Selection
//!
//! ```no_run
//! # async fn run() -> sensorgate_core::GatewayResult<()> {
//! use sensorgate_core::GatewayConfig;
//!
//! let config = GatewayConfig::load_from_file("sensorgate.toml")?;
//! let store = sensorgate_store::open_store(&config.storage).await?;
//! log::info!("using {} store", store.backend());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod document;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use thiserror::Error;

use sensorgate_core::{GatewayError, SensorStore, StorageBackend, StorageConfig};

pub use document::DocumentStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Backend failures, folded into [`GatewayError::Storage`] at the trait boundary
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        GatewayError::Storage(err.to_string())
    }
}

/// Open the backend named in the configuration
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn SensorStore>, GatewayError> {
    let store: Arc<dyn SensorStore> = match config.backend {
        StorageBackend::Sqlite => {
            Arc::new(SqliteStore::open(&config.sqlite_path, config.max_connections).await?)
        }
        StorageBackend::Document => Arc::new(DocumentStore::open(&config.document_dir).await?),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    };
    log::info!("opened {} store", store.backend());
    Ok(store)
}
