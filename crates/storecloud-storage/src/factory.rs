#[cfg(feature = "storage-filesystem")]
use crate::FilesystemDriver;
#[cfg(feature = "storage-memory")]
use crate::MemoryDriver;
use crate::{StorageDriver, StorageError, StorageResult, StoreType};
use std::sync::Arc;
use storecloud_core::StoreConfig;

/// Create a storage driver based on configuration
pub async fn create_driver(config: &StoreConfig) -> StorageResult<Arc<dyn StorageDriver>> {
    match config.store_type {
        #[cfg(feature = "storage-filesystem")]
        StoreType::Filesystem => {
            let driver = FilesystemDriver::new(&config.filesystem_root).await?;
            tracing::info!(root = %config.filesystem_root, "Using filesystem storage driver");
            Ok(Arc::new(driver))
        }

        #[cfg(not(feature = "storage-filesystem"))]
        StoreType::Filesystem => Err(StorageError::Config(
            "Filesystem driver not available (storage-filesystem feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-memory")]
        StoreType::Memory => {
            tracing::info!("Using in-memory storage driver");
            Ok(Arc::new(MemoryDriver::new()))
        }

        #[cfg(not(feature = "storage-memory"))]
        StoreType::Memory => Err(StorageError::Config(
            "Memory driver not available (storage-memory feature not enabled)".to_string(),
        )),

        StoreType::Cmis | StoreType::Azure | StoreType::S3 => Err(StorageError::Config(format!(
            "{} storage driver is not bundled; provide a StorageDriver implementation",
            config.store_type
        ))),
    }
}
