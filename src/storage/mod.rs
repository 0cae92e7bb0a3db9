//! Storage backends
//!
//! The engine talks to its relational store only through [`StorageBackend`].
//!
//! ## Backends
//!
//! - **SQLite** (default): embedded database with migrations under `migrations/`
//! - **In-Memory**: no persistence, used for storage-less runs and tests
//!
//! ## Usage
//!
//! ```no_run
//! use linkwatch::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./linkwatch.db").await?;
//!     let targets = backend.load_targets().await?;
//!     println!("{} targets", targets.len());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use schema::{DailyPeak, InsightRow, PingHistoryRow, Severity, StatusUpdate, TelemetryRow};

use crate::config::StorageConfig;

/// Open the backend selected by the configuration
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::None => {
            info!("storage disabled, using in-memory backend");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path, .. } => {
            Ok(Arc::new(sqlite::SqliteBackend::new(path).await?))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::ConnectionFailed(
            "built without the storage-sqlite feature".to_string(),
        )),
    }
}
