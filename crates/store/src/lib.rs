//! Store backends for salesdesk.
//!
//! All backends implement `salesdesk_core::Store`. [`open_from_config`]
//! opens the backend named in `[store]` and seeds it when asked to.

pub mod catalog;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use catalog::seed_catalog;
pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use salesdesk_config::{StoreBackend, StoreConfig};
use salesdesk_core::Store;
use salesdesk_core::error::StoreError;
use std::sync::Arc;

/// Open the configured store. Created once at startup and shared.
pub async fn open_from_config(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    let store: Arc<dyn Store> = match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        #[cfg(feature = "sqlite")]
        StoreBackend::Sqlite => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| StoreError::Unavailable("store.path is not set".into()))?;
            Arc::new(SqliteStore::new(path).await?)
        }
        #[cfg(not(feature = "sqlite"))]
        StoreBackend::Sqlite => {
            return Err(StoreError::Unavailable(
                "built without the sqlite feature".into(),
            ));
        }
    };

    if config.seed_on_start {
        let count = store.upsert_products(&seed_catalog()).await?;
        tracing::debug!(backend = store.name(), count, "Seeded catalog");
    }

    Ok(store)
}
