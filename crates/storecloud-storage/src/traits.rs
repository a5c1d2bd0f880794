//! Storage driver trait
//!
//! This module defines the `StorageDriver` trait that every backend adapter
//! must implement.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use storecloud_core::{Metadata, StorageError, StorageObject, StorageResult, StoreType};
use tokio::io::AsyncRead;

/// Content handed to a driver for writing. Consumed until EOF.
pub type ContentReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Content read back from a driver, as `Bytes` chunks.
///
/// Dropping the stream releases the underlying backend resource.
pub type ContentStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Wrap an in-memory buffer as a `ContentReader`.
pub fn reader_from_bytes(data: impl Into<Vec<u8>>) -> ContentReader {
    Box::pin(std::io::Cursor::new(data.into()))
}

/// Storage driver trait
///
/// One implementation per backend family. Drivers translate every native
/// failure into `StorageError`; a key or path that does not resolve is
/// reported as `Ok(None)` by the resolve methods and as
/// `StorageError::NotFound` by everything else.
///
/// Metadata passed in may carry `cmis:name` (the node name), `cm:title`,
/// `cm:description` and arbitrary custom properties. System properties
/// (`cmis:objectId`, `cmis:contentStreamLength`, ...) are computed by the
/// driver and ignored on input.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Get the backend family of this driver
    fn store_type(&self) -> StoreType;

    async fn resolve_by_key(&self, key: &str) -> StorageResult<Option<StorageObject>>;

    async fn resolve_by_path(&self, path: &str) -> StorageResult<Option<StorageObject>>;

    /// Create a folder named `name` under `parent_path` and return its key.
    ///
    /// Fails with `AlreadyExists` when a node with that name is already there.
    async fn create_folder(
        &self,
        parent_path: &str,
        name: &str,
        metadata: Metadata,
    ) -> StorageResult<String>;

    /// Create a document under `parent_path`. The name comes from `cmis:name`.
    async fn store_document(
        &self,
        content: ContentReader,
        content_type: &str,
        parent_path: &str,
        metadata: Metadata,
    ) -> StorageResult<StorageObject>;

    /// Merge `properties` into the node identified by `target.key()`.
    ///
    /// A `cmis:name` entry renames the node. Returns the node as resolved
    /// after the update.
    async fn update_properties(
        &self,
        properties: Metadata,
        target: &StorageObject,
    ) -> StorageResult<StorageObject>;

    /// Replace the content of a document.
    async fn update_stream(
        &self,
        key: &str,
        content: ContentReader,
        content_type: &str,
    ) -> StorageResult<StorageObject>;

    /// Delete a node, recursively for folders. `Ok(false)` when the key does not resolve.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Copy `source` (with its subtree) into the folder at `target.path()`.
    async fn copy_node(
        &self,
        source: &StorageObject,
        target: &StorageObject,
    ) -> StorageResult<StorageObject>;

    /// Stream the content of a document.
    async fn get_resource(&self, key: &str) -> StorageResult<ContentStream>;

    /// Direct children of a folder; empty for documents.
    async fn get_children(&self, key: &str) -> StorageResult<Vec<StorageObject>>;
}
