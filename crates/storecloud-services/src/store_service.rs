//! Backend-agnostic store service.
//!
//! `StoreService` holds exactly one driver, chosen at construction. It keeps
//! no state between calls: every lookup goes back to the driver, so callers
//! must re-resolve after a mutation to observe current metadata.

use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use storecloud_core::{
    LogLevel, Metadata, PropertyValue, StorageError, StorageFile, StorageObject,
    StoragePropertyNames, StorageResult, StoreConfig, StoreType,
};
use storecloud_storage::{create_driver, paths, ContentReader, ContentStream, StorageDriver};
use uuid::Uuid;

fn log_failure(operation: &'static str, err: &StorageError) {
    match err.log_level() {
        LogLevel::Debug => tracing::debug!(
            operation,
            error = %err,
            error_code = err.error_code(),
            "Storage operation failed"
        ),
        LogLevel::Warn => tracing::warn!(
            operation,
            error = %err,
            error_code = err.error_code(),
            "Storage operation rejected"
        ),
        LogLevel::Error => tracing::error!(
            operation,
            error = %err,
            error_code = err.error_code(),
            "Storage backend failure"
        ),
    }
}

fn folder_metadata(title: &str, description: &str) -> Metadata {
    let mut metadata = Metadata::new();
    if !title.is_empty() {
        metadata.insert(StoragePropertyNames::Title.value().to_string(), title.into());
    }
    if !description.is_empty() {
        metadata.insert(
            StoragePropertyNames::Description.value().to_string(),
            description.into(),
        );
    }
    metadata
}

#[derive(Clone)]
pub struct StoreService {
    driver: Arc<dyn StorageDriver>,
}

impl StoreService {
    pub fn new(driver: Arc<dyn StorageDriver>) -> Self {
        StoreService { driver }
    }

    /// Build the service with the driver selected by `config`.
    pub async fn from_config(config: &StoreConfig) -> StorageResult<Self> {
        let driver = create_driver(config).await?;
        Ok(StoreService::new(driver))
    }

    pub fn store_type(&self) -> StoreType {
        self.driver.store_type()
    }

    async fn require(&self, key: &str) -> StorageResult<StorageObject> {
        self.driver
            .resolve_by_key(key)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    /// Create a folder under `parent_path` unless one with that name is already there.
    ///
    /// Returns the key of the new or existing folder. `""` and `"/"` both
    /// denote the repository root; `None` is rejected.
    #[tracing::instrument(skip(self))]
    pub async fn create_folder_if_not_present(
        &self,
        parent_path: Option<&str>,
        name: &str,
        title: &str,
        description: &str,
    ) -> StorageResult<String> {
        let result = async {
            let parent_path = parent_path.ok_or_else(|| {
                StorageError::InvalidArgument("Parent path is required".to_string())
            })?;
            let parent = paths::normalize(parent_path)?;
            let path = paths::join(&parent, name)?;

            if let Some(existing) = self.driver.resolve_by_path(&path).await? {
                if existing.is_folder() {
                    tracing::debug!(key = %existing.key(), "Folder already present");
                    return Ok(existing.key().to_string());
                }
                return Err(StorageError::AlreadyExists(format!(
                    "{} exists and is not a folder",
                    path
                )));
            }

            self.driver
                .create_folder(&parent, name, folder_metadata(title, description))
                .await
        }
        .await;
        result.inspect_err(|e| log_failure("create_folder_if_not_present", e))
    }

    /// Make sure every folder along `path` exists and return the last one.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_folder(&self, path: &str) -> StorageResult<StorageObject> {
        let result = async {
            let path = paths::normalize(path)?;
            let mut current = paths::ROOT.to_string();
            for segment in paths::segments(&path) {
                let key = self
                    .create_folder_if_not_present(Some(current.as_str()), segment, "", "")
                    .await?;
                current = self.require(&key).await?.path().to_string();
            }
            self.driver
                .resolve_by_path(&current)
                .await?
                .ok_or_else(|| StorageError::NotFound(current.clone()))
        }
        .await;
        result.inspect_err(|e| log_failure("ensure_folder", e))
    }

    /// Store a new document under `path`.
    ///
    /// The document name comes from `cmis:name` in `metadata`; a random name is
    /// generated when it is missing. Folders along `path` are created on demand.
    #[tracing::instrument(skip(self, content, metadata))]
    pub async fn store_simple_document(
        &self,
        content: ContentReader,
        content_type: &str,
        path: &str,
        metadata: Metadata,
    ) -> StorageResult<StorageObject> {
        let result = async {
            let folder = self.ensure_folder(path).await?;

            let mut metadata = metadata;
            let name_key = StoragePropertyNames::Name.value();
            let has_name = metadata
                .get(name_key)
                .and_then(PropertyValue::as_str)
                .map(|name| !name.is_empty())
                .unwrap_or(false);
            if !has_name {
                metadata.insert(name_key.to_string(), Uuid::new_v4().to_string().into());
            }

            self.driver
                .store_document(content, content_type, folder.path(), metadata)
                .await
        }
        .await;
        result.inspect_err(|e| log_failure("store_simple_document", e))
    }

    /// Store a document described by a `StorageFile` under `path`.
    #[tracing::instrument(skip(self, file, content), fields(file_name = %file.file_name))]
    pub async fn store_file(
        &self,
        file: &StorageFile,
        content: ContentReader,
        path: &str,
    ) -> StorageResult<StorageObject> {
        self.store_simple_document(content, &file.content_type, path, file.to_metadata())
            .await
    }

    /// Create or replace the document named `title` under `path`.
    ///
    /// With `overwrite`, an existing document keeps its key and gets the new
    /// content and title. Without it, an existing node is an `AlreadyExists` error.
    #[tracing::instrument(skip(self, file, content), fields(file_name = %file.file_name))]
    pub async fn restore_simple_document(
        &self,
        file: &StorageFile,
        content: ContentReader,
        content_type: &str,
        title: &str,
        path: &str,
        overwrite: bool,
    ) -> StorageResult<StorageObject> {
        let result = async {
            paths::validate_name(title)?;
            let folder = self.ensure_folder(path).await?;
            let document_path = paths::join(folder.path(), title)?;

            let mut properties = file.to_metadata();
            properties.insert(
                StoragePropertyNames::Title.value().to_string(),
                file.title.as_deref().unwrap_or(title).into(),
            );

            match self.driver.resolve_by_path(&document_path).await? {
                Some(existing) if overwrite => {
                    if !existing.is_document() {
                        return Err(StorageError::InvalidArgument(format!(
                            "Cannot overwrite folder {}",
                            existing.path()
                        )));
                    }
                    let updated = self
                        .driver
                        .update_stream(existing.key(), content, content_type)
                        .await?;
                    properties.remove(StoragePropertyNames::Name.value());
                    let restored = self
                        .driver
                        .update_properties(properties, &updated)
                        .await
                        .inspect_err(|e| {
                            tracing::error!(
                                key = %updated.key(),
                                path = %updated.path(),
                                error = %e,
                                "Content replaced but properties were not updated"
                            )
                        })?;
                    tracing::info!(key = %restored.key(), "Document restored in place");
                    Ok(restored)
                }
                Some(existing) => Err(StorageError::AlreadyExists(existing.path().to_string())),
                None => {
                    properties.insert(
                        StoragePropertyNames::Name.value().to_string(),
                        title.into(),
                    );
                    self.driver
                        .store_document(content, content_type, folder.path(), properties)
                        .await
                }
            }
        }
        .await;
        result.inspect_err(|e| log_failure("restore_simple_document", e))
    }

    pub async fn get_storage_object_by_key(&self, key: &str) -> StorageResult<Option<StorageObject>> {
        self.driver
            .resolve_by_key(key)
            .await
            .inspect_err(|e| log_failure("get_storage_object_by_key", e))
    }

    pub async fn get_storage_object_by_path(
        &self,
        path: &str,
    ) -> StorageResult<Option<StorageObject>> {
        self.driver
            .resolve_by_path(path)
            .await
            .inspect_err(|e| log_failure("get_storage_object_by_path", e))
    }

    pub async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.get_storage_object_by_path(path).await?.is_some())
    }

    /// Stream the content of a document. The stream must be consumed or dropped by the caller.
    #[tracing::instrument(skip(self))]
    pub async fn get_resource(&self, key: &str) -> StorageResult<ContentStream> {
        self.driver
            .get_resource(key)
            .await
            .inspect_err(|e| log_failure("get_resource", e))
    }

    /// Collect the whole content of a document into memory.
    pub async fn get_resource_bytes(&self, key: &str) -> StorageResult<Bytes> {
        let mut stream = self.get_resource(key).await?;
        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk.inspect_err(|e| log_failure("get_resource", e))?);
        }
        Ok(Bytes::from(data))
    }

    /// Merge `new_properties` into `target`. A `cmis:name` entry renames the node.
    #[tracing::instrument(skip(self, new_properties, target), fields(key = %target.key()))]
    pub async fn update_properties(
        &self,
        new_properties: Metadata,
        target: &StorageObject,
    ) -> StorageResult<StorageObject> {
        let result = if new_properties.is_empty() {
            self.require(target.key()).await
        } else {
            self.driver.update_properties(new_properties, target).await
        };
        result.inspect_err(|e| log_failure("update_properties", e))
    }

    #[tracing::instrument(skip(self, content))]
    pub async fn update_stream(
        &self,
        key: &str,
        content: ContentReader,
        content_type: &str,
    ) -> StorageResult<StorageObject> {
        self.driver
            .update_stream(key, content, content_type)
            .await
            .inspect_err(|e| log_failure("update_stream", e))
    }

    /// Delete a node and, for folders, everything below it.
    ///
    /// Returns `false` when the key does not resolve.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.driver
            .delete(key)
            .await
            .inspect_err(|e| log_failure("delete", e))
    }

    pub async fn get_children(&self, key: &str) -> StorageResult<Vec<StorageObject>> {
        self.driver
            .get_children(key)
            .await
            .inspect_err(|e| log_failure("get_children", e))
    }

    /// Copy `source` into the folder at `target.path()`. `source` is left untouched.
    #[tracing::instrument(skip(self, source, target), fields(from = %source.path(), to = %target.path()))]
    pub async fn copy_node(
        &self,
        source: &StorageObject,
        target: &StorageObject,
    ) -> StorageResult<StorageObject> {
        self.driver
            .copy_node(source, target)
            .await
            .inspect_err(|e| log_failure("copy_node", e))
    }

    async fn set_aspects(
        &self,
        target: &StorageObject,
        aspects: Vec<String>,
    ) -> StorageResult<StorageObject> {
        let mut properties = Metadata::new();
        properties.insert(
            StoragePropertyNames::SecondaryObjectTypeIds.value().to_string(),
            aspects.into(),
        );
        self.driver.update_properties(properties, target).await
    }

    pub async fn add_aspect(
        &self,
        target: &StorageObject,
        aspect: &str,
    ) -> StorageResult<StorageObject> {
        let result = async {
            let current = self.require(target.key()).await?;
            let mut aspects = current.aspects();
            if aspects.iter().any(|a| a == aspect) {
                return Ok(current);
            }
            aspects.push(aspect.to_string());
            self.set_aspects(&current, aspects).await
        }
        .await;
        result.inspect_err(|e| log_failure("add_aspect", e))
    }

    pub async fn remove_aspect(
        &self,
        target: &StorageObject,
        aspect: &str,
    ) -> StorageResult<StorageObject> {
        let result = async {
            let current = self.require(target.key()).await?;
            let aspects = current.aspects();
            if !aspects.iter().any(|a| a == aspect) {
                return Ok(current);
            }
            let remaining = aspects.into_iter().filter(|a| a != aspect).collect();
            self.set_aspects(&current, remaining).await
        }
        .await;
        result.inspect_err(|e| log_failure("remove_aspect", e))
    }

    pub async fn has_aspect(&self, key: &str, aspect: &str) -> StorageResult<bool> {
        let current = self.require(key).await?;
        Ok(current.aspects().iter().any(|a| a == aspect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use storecloud_core::ErrorKind;
    use storecloud_storage::{reader_from_bytes, MemoryDriver};

    /// Memory driver whose property updates always fail.
    struct ReadOnlyProperties(MemoryDriver);

    #[async_trait]
    impl StorageDriver for ReadOnlyProperties {
        fn store_type(&self) -> StoreType {
            self.0.store_type()
        }

        async fn resolve_by_key(&self, key: &str) -> StorageResult<Option<StorageObject>> {
            self.0.resolve_by_key(key).await
        }

        async fn resolve_by_path(&self, path: &str) -> StorageResult<Option<StorageObject>> {
            self.0.resolve_by_path(path).await
        }

        async fn create_folder(
            &self,
            parent_path: &str,
            name: &str,
            metadata: Metadata,
        ) -> StorageResult<String> {
            self.0.create_folder(parent_path, name, metadata).await
        }

        async fn store_document(
            &self,
            content: ContentReader,
            content_type: &str,
            parent_path: &str,
            metadata: Metadata,
        ) -> StorageResult<StorageObject> {
            self.0
                .store_document(content, content_type, parent_path, metadata)
                .await
        }

        async fn update_properties(
            &self,
            _properties: Metadata,
            _target: &StorageObject,
        ) -> StorageResult<StorageObject> {
            Err(StorageError::backend("properties are read-only"))
        }

        async fn update_stream(
            &self,
            key: &str,
            content: ContentReader,
            content_type: &str,
        ) -> StorageResult<StorageObject> {
            self.0.update_stream(key, content, content_type).await
        }

        async fn delete(&self, key: &str) -> StorageResult<bool> {
            self.0.delete(key).await
        }

        async fn copy_node(
            &self,
            source: &StorageObject,
            target: &StorageObject,
        ) -> StorageResult<StorageObject> {
            self.0.copy_node(source, target).await
        }

        async fn get_resource(&self, key: &str) -> StorageResult<ContentStream> {
            self.0.get_resource(key).await
        }

        async fn get_children(&self, key: &str) -> StorageResult<Vec<StorageObject>> {
            self.0.get_children(key).await
        }
    }

    fn service() -> StoreService {
        StoreService::new(Arc::new(MemoryDriver::new()))
    }

    #[tokio::test]
    async fn test_missing_parent_is_invalid_argument() {
        let svc = service();
        let result = svc
            .create_folder_if_not_present(None, "due", "Titolo", "Descrizione")
            .await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_folder_name_clash_with_document() {
        let svc = service();
        let mut metadata = Metadata::new();
        metadata.insert("cmis:name".to_string(), "uno".into());
        svc.store_simple_document(reader_from_bytes("x"), "text/plain", "/", metadata)
            .await
            .unwrap();

        let result = svc
            .create_folder_if_not_present(Some("/"), "uno", "", "")
            .await;
        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_generated_name_when_missing() {
        let svc = service();
        let so = svc
            .store_simple_document(reader_from_bytes("x"), "text/plain", "", Metadata::new())
            .await
            .unwrap();
        let name = so.name().unwrap();
        assert!(Uuid::parse_str(name).is_ok());
        assert_eq!(so.path(), format!("/{}", name));
    }

    #[tokio::test]
    async fn test_empty_update_returns_current_node() {
        let svc = service();
        let key = svc
            .create_folder_if_not_present(Some("/"), "uno", "Titolo", "")
            .await
            .unwrap();
        let so = svc.get_storage_object_by_key(&key).await.unwrap().unwrap();
        let same = svc.update_properties(Metadata::new(), &so).await.unwrap();
        assert_eq!(same, so);

        let gone = StorageObject::new("missing", "/missing", None);
        let result = svc.update_properties(Metadata::new(), &gone).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_aspects_are_idempotent() {
        let svc = service();
        let key = svc
            .create_folder_if_not_present(Some("/"), "uno", "", "")
            .await
            .unwrap();
        let so = svc.get_storage_object_by_key(&key).await.unwrap().unwrap();

        let so = svc.add_aspect(&so, "P:cm:titled").await.unwrap();
        let so = svc.add_aspect(&so, "P:cm:titled").await.unwrap();
        assert_eq!(so.aspects(), vec!["P:cm:titled"]);
        assert!(svc.has_aspect(&key, "P:cm:titled").await.unwrap());

        let so = svc.remove_aspect(&so, "P:cm:titled").await.unwrap();
        assert!(so.aspects().is_empty());
        assert!(!svc.has_aspect(&key, "P:cm:titled").await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_reports_failed_property_update() {
        let svc = StoreService::new(Arc::new(ReadOnlyProperties(MemoryDriver::new())));
        let file = StorageFile::new("Titolo", "text/plain");
        svc.restore_simple_document(&file, reader_from_bytes("pippo"), "text/plain", "Titolo", "/c", false)
            .await
            .unwrap();

        let err = svc
            .restore_simple_document(&file, reader_from_bytes("pluto"), "text/plain", "Titolo", "/c", true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendFailure);

        let so = svc.get_storage_object_by_path("/c/Titolo").await.unwrap().unwrap();
        assert_eq!(svc.get_resource_bytes(so.key()).await.unwrap().as_ref(), b"pluto");
    }
}
