//! In-memory repository driver.
//!
//! Behaves like a content repository: every node gets an opaque object id as
//! its key, and the key survives renames and moves. Useful for tests and for
//! running the service without a backend.

use crate::paths;
use crate::traits::{ContentReader, ContentStream, StorageDriver};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use storecloud_core::{
    BaseType, Metadata, PropertyValue, StorageError, StorageObject, StoragePropertyNames,
    StorageResult, StoreType,
};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Node {
    parent: Option<String>,
    name: String,
    base: BaseType,
    properties: Metadata,
    content: Option<Bytes>,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

#[derive(Debug)]
struct Tree {
    root: String,
    nodes: HashMap<String, Node>,
}

impl Tree {
    fn new() -> Self {
        let root = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut nodes = HashMap::new();
        nodes.insert(
            root.clone(),
            Node {
                parent: None,
                name: String::new(),
                base: BaseType::Folder,
                properties: Metadata::new(),
                content: None,
                created: now,
                modified: now,
            },
        );
        Tree { root, nodes }
    }

    fn path_of(&self, key: &str) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = self.nodes.get(key)?;
        while let Some(parent) = &current.parent {
            segments.push(current.name.as_str());
            current = self.nodes.get(parent)?;
        }
        segments.reverse();
        Some(format!("/{}", segments.join("/")))
    }

    fn child_named(&self, parent: &str, name: &str) -> Option<&str> {
        self.nodes
            .iter()
            .find(|(_, node)| node.parent.as_deref() == Some(parent) && node.name == name)
            .map(|(key, _)| key.as_str())
    }

    fn children_of(&self, parent: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.parent.as_deref() == Some(parent))
            .map(|(key, _)| key.as_str())
            .collect()
    }

    fn key_for_path(&self, path: &str) -> Option<String> {
        let mut current = self.root.as_str();
        for segment in paths::segments(path) {
            current = self.child_named(current, segment)?;
        }
        Some(current.to_string())
    }

    /// `key` followed by all of its descendants.
    fn subtree(&self, key: &str) -> Vec<String> {
        let mut keys = vec![key.to_string()];
        let mut i = 0;
        while i < keys.len() {
            let children: Vec<String> = self
                .children_of(&keys[i])
                .into_iter()
                .map(str::to_string)
                .collect();
            keys.extend(children);
            i += 1;
        }
        keys
    }

    fn object(&self, key: &str) -> Option<StorageObject> {
        let node = self.nodes.get(key)?;
        let path = self.path_of(key)?;

        let mut metadata = node.properties.clone();
        if node.parent.is_some() {
            metadata.insert(
                StoragePropertyNames::Name.value().to_string(),
                node.name.clone().into(),
            );
        }
        metadata.insert(
            StoragePropertyNames::ObjectId.value().to_string(),
            key.into(),
        );
        metadata.insert(
            StoragePropertyNames::BaseTypeId.value().to_string(),
            node.base.value().into(),
        );
        metadata
            .entry(StoragePropertyNames::ObjectTypeId.value().to_string())
            .or_insert_with(|| node.base.value().into());
        metadata.insert(
            StoragePropertyNames::CreationDate.value().to_string(),
            node.created.into(),
        );
        metadata.insert(
            StoragePropertyNames::LastModificationDate.value().to_string(),
            node.modified.into(),
        );
        if let Some(content) = &node.content {
            metadata.insert(
                StoragePropertyNames::ContentStreamLength.value().to_string(),
                (content.len() as u64).into(),
            );
        }

        Some(StorageObject::new(key, path, Some(metadata)))
    }

    fn require_folder(&self, path: &str) -> StorageResult<String> {
        let path = paths::normalize(path)?;
        let key = self
            .key_for_path(&path)
            .ok_or_else(|| StorageError::NotFound(format!("Folder not found: {}", path)))?;
        match self.nodes.get(&key) {
            Some(node) if node.base == BaseType::Folder => Ok(key),
            _ => Err(StorageError::InvalidArgument(format!("Not a folder: {}", path))),
        }
    }

    fn insert(
        &mut self,
        parent: &str,
        name: &str,
        base: BaseType,
        properties: Metadata,
        content: Option<Bytes>,
    ) -> StorageResult<String> {
        paths::validate_name(name)?;
        if self.child_named(parent, name).is_some() {
            let path = self.path_of(parent).unwrap_or_default();
            return Err(StorageError::AlreadyExists(paths::join(&path, name)?));
        }
        let key = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.nodes.insert(
            key.clone(),
            Node {
                parent: Some(parent.to_string()),
                name: name.to_string(),
                base,
                properties: user_properties(properties),
                content,
                created: now,
                modified: now,
            },
        );
        Ok(key)
    }
}

fn user_properties(mut metadata: Metadata) -> Metadata {
    metadata.retain(|name, _| {
        name.as_str() != StoragePropertyNames::Name.value() && !StoragePropertyNames::is_system(name)
    });
    metadata
}

async fn read_content(mut content: ContentReader) -> StorageResult<Bytes> {
    let mut data = Vec::new();
    content
        .read_to_end(&mut data)
        .await
        .map_err(|e| StorageError::backend_with_source(format!("Failed to read content: {}", e), e))?;
    Ok(Bytes::from(data))
}

/// In-memory storage driver
#[derive(Debug)]
pub struct MemoryDriver {
    tree: RwLock<Tree>,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    pub fn new() -> Self {
        MemoryDriver {
            tree: RwLock::new(Tree::new()),
        }
    }

    /// Key of the repository root folder.
    pub fn root_key(&self) -> StorageResult<String> {
        Ok(self.read()?.root.clone())
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Tree>> {
        self.tree
            .read()
            .map_err(|_| StorageError::backend("Lock poisoned"))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Tree>> {
        self.tree
            .write()
            .map_err(|_| StorageError::backend("Lock poisoned"))
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    fn store_type(&self) -> StoreType {
        StoreType::Memory
    }

    async fn resolve_by_key(&self, key: &str) -> StorageResult<Option<StorageObject>> {
        Ok(self.read()?.object(key))
    }

    async fn resolve_by_path(&self, path: &str) -> StorageResult<Option<StorageObject>> {
        let path = paths::normalize(path)?;
        let tree = self.read()?;
        Ok(tree.key_for_path(&path).and_then(|key| tree.object(&key)))
    }

    async fn create_folder(
        &self,
        parent_path: &str,
        name: &str,
        metadata: Metadata,
    ) -> StorageResult<String> {
        let mut tree = self.write()?;
        let parent = tree.require_folder(parent_path)?;
        let key = tree.insert(&parent, name, BaseType::Folder, metadata, None)?;

        tracing::info!(key = %key, parent = %parent_path, name = %name, "Memory folder created");

        Ok(key)
    }

    async fn store_document(
        &self,
        content: ContentReader,
        content_type: &str,
        parent_path: &str,
        metadata: Metadata,
    ) -> StorageResult<StorageObject> {
        let name = metadata
            .get(StoragePropertyNames::Name.value())
            .and_then(PropertyValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                StorageError::InvalidArgument("Document metadata must carry cmis:name".to_string())
            })?;
        let data = read_content(content).await?;
        let size = data.len();

        let mut properties = metadata;
        properties.insert(
            StoragePropertyNames::ContentStreamMimeType.value().to_string(),
            content_type.into(),
        );

        let mut tree = self.write()?;
        let parent = tree.require_folder(parent_path)?;
        let key = tree.insert(&parent, &name, BaseType::Document, properties, Some(data))?;

        tracing::info!(key = %key, size_bytes = size, "Memory document stored");

        tree.object(&key)
            .ok_or_else(|| StorageError::backend("Document vanished after write"))
    }

    async fn update_properties(
        &self,
        properties: Metadata,
        target: &StorageObject,
    ) -> StorageResult<StorageObject> {
        let key = target.key();
        let mut tree = self.write()?;
        let (parent, current_name) = match tree.nodes.get(key) {
            Some(node) => (node.parent.clone(), node.name.clone()),
            None => return Err(StorageError::NotFound(key.to_string())),
        };

        let mut renamed = None;
        let mut updates = Metadata::new();
        for (name, value) in properties {
            if name == StoragePropertyNames::Name.value() {
                let new_name = value.as_str().ok_or_else(|| StorageError::TypeMismatch {
                    name: name.clone(),
                    expected: "string",
                    found: value.type_name(),
                })?;
                if new_name != current_name {
                    renamed = Some(new_name.to_string());
                }
            } else if !StoragePropertyNames::is_system(&name) {
                updates.insert(name, value);
            }
        }

        if let Some(new_name) = &renamed {
            let parent = parent.as_deref().ok_or_else(|| {
                StorageError::InvalidArgument("The root folder cannot be renamed".to_string())
            })?;
            paths::validate_name(new_name)?;
            if tree.child_named(parent, new_name).is_some() {
                let parent_path = tree.path_of(parent).unwrap_or_default();
                return Err(StorageError::AlreadyExists(paths::join(&parent_path, new_name)?));
            }
        }

        let node = tree
            .nodes
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        if let Some(new_name) = renamed {
            node.name = new_name;
        }
        node.properties.extend(updates);
        node.modified = Utc::now();

        tracing::info!(key = %key, "Memory properties updated");

        tree.object(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn update_stream(
        &self,
        key: &str,
        content: ContentReader,
        content_type: &str,
    ) -> StorageResult<StorageObject> {
        {
            let tree = self.read()?;
            match tree.nodes.get(key) {
                None => return Err(StorageError::NotFound(key.to_string())),
                Some(node) if node.base != BaseType::Document => {
                    return Err(StorageError::InvalidArgument(format!(
                        "Not a document: {}",
                        key
                    )))
                }
                Some(_) => {}
            }
        }

        let data = read_content(content).await?;
        let size = data.len();

        let mut tree = self.write()?;
        let node = tree
            .nodes
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        node.content = Some(data);
        node.properties.insert(
            StoragePropertyNames::ContentStreamMimeType.value().to_string(),
            content_type.into(),
        );
        node.modified = Utc::now();

        tracing::info!(key = %key, size_bytes = size, "Memory stream update successful");

        tree.object(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut tree = self.write()?;
        if key == tree.root {
            return Err(StorageError::InvalidArgument(
                "The root folder cannot be deleted".to_string(),
            ));
        }
        if !tree.nodes.contains_key(key) {
            return Ok(false);
        }

        let doomed = tree.subtree(key);
        for k in &doomed {
            tree.nodes.remove(k);
        }

        tracing::info!(key = %key, removed = doomed.len(), "Memory delete successful");

        Ok(true)
    }

    async fn copy_node(
        &self,
        source: &StorageObject,
        target: &StorageObject,
    ) -> StorageResult<StorageObject> {
        let mut tree = self.write()?;
        let source_key = source.key();
        let source_node = tree
            .nodes
            .get(source_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(source_key.to_string()))?;
        if source_node.parent.is_none() {
            return Err(StorageError::InvalidArgument(
                "The root folder cannot be copied".to_string(),
            ));
        }

        let dest_parent = tree.require_folder(target.path())?;
        let subtree = tree.subtree(source_key);
        if subtree.contains(&dest_parent) {
            return Err(StorageError::InvalidArgument(format!(
                "Cannot copy {} into its own subtree",
                source.path()
            )));
        }
        if tree.child_named(&dest_parent, &source_node.name).is_some() {
            let parent_path = tree.path_of(&dest_parent).unwrap_or_default();
            return Err(StorageError::AlreadyExists(paths::join(
                &parent_path,
                &source_node.name,
            )?));
        }

        // Subtree lists parents before children, so remapped parents always exist.
        let mut remapped: HashMap<String, String> = HashMap::new();
        let now = Utc::now();
        for old_key in &subtree {
            let Some(node) = tree.nodes.get(old_key).cloned() else {
                continue;
            };
            let new_parent = if old_key == source_key {
                dest_parent.clone()
            } else {
                match node.parent.as_ref().and_then(|p| remapped.get(p)) {
                    Some(p) => p.clone(),
                    None => continue,
                }
            };
            let new_key = Uuid::new_v4().to_string();
            tree.nodes.insert(
                new_key.clone(),
                Node {
                    parent: Some(new_parent),
                    created: now,
                    modified: now,
                    ..node
                },
            );
            remapped.insert(old_key.clone(), new_key);
        }

        let copy_key = remapped
            .get(source_key)
            .cloned()
            .ok_or_else(|| StorageError::backend("Copy produced no root node"))?;

        tracing::info!(from_key = %source_key, to_key = %copy_key, nodes = remapped.len(), "Memory copy successful");

        tree.object(&copy_key)
            .ok_or_else(|| StorageError::backend("Copy vanished after write"))
    }

    async fn get_resource(&self, key: &str) -> StorageResult<ContentStream> {
        let tree = self.read()?;
        let data = tree
            .nodes
            .get(key)
            .and_then(|node| node.content.clone())
            .ok_or_else(|| StorageError::NotFound(format!("{} has no content stream", key)))?;
        let stream = futures::stream::iter(std::iter::once(Ok::<Bytes, StorageError>(data)));
        Ok(Box::pin(stream))
    }

    async fn get_children(&self, key: &str) -> StorageResult<Vec<StorageObject>> {
        let tree = self.read()?;
        if !tree.nodes.contains_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let mut children: Vec<StorageObject> = tree
            .children_of(key)
            .into_iter()
            .filter_map(|k| tree.object(k))
            .collect();
        children.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::reader_from_bytes;

    fn named(name: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(StoragePropertyNames::Name.value().to_string(), name.into());
        metadata
    }

    #[tokio::test]
    async fn test_keys_are_opaque_and_survive_rename() {
        let driver = MemoryDriver::new();
        let key = driver.create_folder("/", "uno", Metadata::new()).await.unwrap();
        assert_ne!(key, "/uno");

        let so = driver.resolve_by_key(&key).await.unwrap().unwrap();
        assert_eq!(so.path(), "/uno");

        let renamed = driver.update_properties(named("due"), &so).await.unwrap();
        assert_eq!(renamed.key(), key);
        assert_eq!(renamed.path(), "/due");
        assert!(driver.resolve_by_path("/uno").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rename_of_folder_moves_descendant_paths() {
        let driver = MemoryDriver::new();
        let parent = driver.create_folder("/", "parent", Metadata::new()).await.unwrap();
        let doc = driver
            .store_document(reader_from_bytes("x"), "text/plain", "/parent", named("a.txt"))
            .await
            .unwrap();

        let folder = driver.resolve_by_key(&parent).await.unwrap().unwrap();
        driver.update_properties(named("renamed"), &folder).await.unwrap();

        let moved = driver.resolve_by_key(doc.key()).await.unwrap().unwrap();
        assert_eq!(moved.path(), "/renamed/a.txt");
    }

    #[tokio::test]
    async fn test_delete_is_recursive() {
        let driver = MemoryDriver::new();
        let parent = driver.create_folder("/", "parent", Metadata::new()).await.unwrap();
        let child = driver.create_folder("/parent", "child", Metadata::new()).await.unwrap();

        assert!(driver.delete(&parent).await.unwrap());
        assert!(driver.resolve_by_key(&child).await.unwrap().is_none());
        assert!(!driver.delete(&parent).await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_assigns_new_keys() {
        let driver = MemoryDriver::new();
        driver.create_folder("/", "src", Metadata::new()).await.unwrap();
        driver.create_folder("/", "dst", Metadata::new()).await.unwrap();
        let doc = driver
            .store_document(reader_from_bytes("pippo"), "text/plain", "/src", named("a.txt"))
            .await
            .unwrap();

        let src = driver.resolve_by_path("/src").await.unwrap().unwrap();
        let dst = driver.resolve_by_path("/dst").await.unwrap().unwrap();
        let copy = driver.copy_node(&src, &dst).await.unwrap();
        assert_eq!(copy.path(), "/dst/src");
        assert_ne!(copy.key(), src.key());

        let copied_doc = driver.resolve_by_path("/dst/src/a.txt").await.unwrap().unwrap();
        assert_ne!(copied_doc.key(), doc.key());
        assert_eq!(copied_doc.content_length(), Some(5));
        assert!(driver.resolve_by_key(doc.key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_root_is_protected() {
        let driver = MemoryDriver::new();
        let root = driver.root_key().unwrap();
        assert!(matches!(
            driver.delete(&root).await,
            Err(StorageError::InvalidArgument(_))
        ));
        let so = driver.resolve_by_path("/").await.unwrap().unwrap();
        assert_eq!(so.key(), root);
        assert!(so.is_folder());
    }
}
