use crate::paths;
use crate::traits::{ContentReader, ContentStream, StorageDriver};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storecloud_core::{
    BaseType, Metadata, PropertyValue, StorageError, StorageObject, StoragePropertyNames,
    StorageResult, StoreType,
};
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

const SIDECAR_SUFFIX: &str = ".meta.json";
const UPLOAD_SUFFIX: &str = ".upload.tmp";
const INDEX_NAME: &str = ".storecloud.index.json";
const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Keys of nodes that no longer live at the path they were created under.
type KeyIndex = BTreeMap<String, String>;

/// Per-node record kept in the hidden `.<name>.meta.json` file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    object_id: Option<String>,
    #[serde(default)]
    properties: Metadata,
}

/// Filesystem storage driver
///
/// A node's key is the path it was created under and stays the same when the
/// node (or one of its ancestors) is renamed. Keys of relocated nodes are
/// tracked in a hidden index file at the root. Properties that the filesystem
/// cannot hold natively live in a hidden sidecar `.<name>.meta.json` next to
/// the node.
#[derive(Clone, Debug)]
pub struct FilesystemDriver {
    root: PathBuf,
    index_lock: Arc<Mutex<()>>,
}

fn sidecar_name(name: &str) -> String {
    format!(".{}{}", name, SIDECAR_SUFFIX)
}

fn upload_name(name: &str) -> String {
    format!(".{}{}", name, UPLOAD_SUFFIX)
}

/// Driver bookkeeping files, never exposed as nodes.
fn is_internal(name: &str) -> bool {
    name == INDEX_NAME
        || (name.starts_with('.') && (name.ends_with(SIDECAR_SUFFIX) || name.ends_with(UPLOAD_SUFFIX)))
}

/// A lookup that failed because nothing lives at the path, including paths
/// that run through a document.
fn is_missing(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

fn validate_node_name(name: &str) -> StorageResult<()> {
    paths::validate_name(name)?;
    if is_internal(name) {
        return Err(StorageError::InvalidArgument(format!(
            "Node name is reserved: {}",
            name
        )));
    }
    Ok(())
}

/// Key for a node created at `path`. The path itself unless a relocated node
/// already owns it.
fn assign_key(index: &KeyIndex, path: &str) -> String {
    if index.contains_key(path) {
        format!("{}#{}", path, Uuid::new_v4())
    } else {
        path.to_string()
    }
}

fn record_location(index: &mut KeyIndex, key: String, path: String) {
    if key == path {
        index.remove(&key);
    } else {
        index.insert(key, path);
    }
}

/// Strip everything the driver computes itself before persisting.
fn user_properties(metadata: &Metadata) -> Metadata {
    metadata
        .iter()
        .filter(|(name, _)| {
            name.as_str() != StoragePropertyNames::Name.value()
                && !StoragePropertyNames::is_system(name)
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn io_failure(action: &str, path: &Path, err: io::Error) -> StorageError {
    if is_missing(&err) {
        return StorageError::NotFound(path.display().to_string());
    }
    StorageError::backend_with_source(
        format!("Failed to {} {}: {}", action, path.display(), err),
        err,
    )
}

impl FilesystemDriver {
    /// Create a new FilesystemDriver rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();

        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::Config(format!(
                "Failed to create storage root {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(FilesystemDriver {
            root,
            index_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a canonical path onto the filesystem.
    fn fs_path(&self, path: &str) -> PathBuf {
        let mut fs_path = self.root.clone();
        for segment in paths::segments(path) {
            fs_path.push(segment);
        }
        fs_path
    }

    fn sidecar_path(&self, path: &str) -> Option<PathBuf> {
        let (parent, name) = paths::split(path)?;
        Some(self.fs_path(parent).join(sidecar_name(name)))
    }

    async fn read_sidecar(&self, path: &str) -> StorageResult<Sidecar> {
        let Some(sidecar) = self.sidecar_path(path) else {
            return Ok(Sidecar::default());
        };
        match fs::read(&sidecar).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if is_missing(&e) => Ok(Sidecar::default()),
            Err(e) => Err(io_failure("read metadata", &sidecar, e)),
        }
    }

    async fn write_sidecar(&self, path: &str, record: &Sidecar) -> StorageResult<()> {
        let Some(sidecar) = self.sidecar_path(path) else {
            return Ok(());
        };
        let stored = Sidecar {
            object_id: record.object_id.clone(),
            properties: user_properties(&record.properties),
        };
        let data = serde_json::to_vec_pretty(&stored)?;
        fs::write(&sidecar, data)
            .await
            .map_err(|e| io_failure("write metadata", &sidecar, e))
    }

    async fn move_sidecar(&self, from: &str, to: &str) -> StorageResult<()> {
        if let (Some(from), Some(to)) = (self.sidecar_path(from), self.sidecar_path(to)) {
            match fs::rename(&from, &to).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_failure("move metadata", &from, e)),
            }
        }
        Ok(())
    }

    async fn load_index(&self) -> StorageResult<KeyIndex> {
        let file = self.root.join(INDEX_NAME);
        match fs::read(&file).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(KeyIndex::new()),
            Err(e) => Err(io_failure("read key index", &file, e)),
        }
    }

    async fn save_index(&self, index: &KeyIndex) -> StorageResult<()> {
        let file = self.root.join(INDEX_NAME);
        let tmp = self.root.join(upload_name(INDEX_NAME));
        let data = serde_json::to_vec_pretty(index)?;
        fs::write(&tmp, data)
            .await
            .map_err(|e| io_failure("write key index", &tmp, e))?;
        fs::rename(&tmp, &file)
            .await
            .map_err(|e| io_failure("move key index into", &file, e))
    }

    /// Visible entry names of a directory, sorted.
    async fn child_names(&self, dir: &Path) -> StorageResult<Vec<String>> {
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| io_failure("list", dir, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_internal(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// `path` followed by every node below it, parents before children.
    async fn subtree_paths(&self, path: &str) -> StorageResult<Vec<String>> {
        let mut found = vec![path.to_string()];
        let mut i = 0;
        while i < found.len() {
            let current = found[i].clone();
            i += 1;
            let fs_path = self.fs_path(&current);
            let meta = fs::metadata(&fs_path)
                .await
                .map_err(|e| io_failure("stat", &fs_path, e))?;
            if !meta.is_dir() {
                continue;
            }
            for name in self.child_names(&fs_path).await? {
                if let Ok(child) = paths::join(&current, &name) {
                    found.push(child);
                }
            }
        }
        Ok(found)
    }

    async fn resolve(&self, path: &str) -> StorageResult<Option<StorageObject>> {
        let path = paths::normalize(path)?;
        if let Some((_, name)) = paths::split(&path) {
            if is_internal(name) {
                return Ok(None);
            }
        }

        let fs_path = self.fs_path(&path);
        let meta = match fs::metadata(&fs_path).await {
            Ok(meta) => meta,
            Err(e) if is_missing(&e) => return Ok(None),
            Err(e) => return Err(io_failure("stat", &fs_path, e)),
        };

        let base = if meta.is_dir() {
            BaseType::Folder
        } else {
            BaseType::Document
        };

        let sidecar = self.read_sidecar(&path).await?;
        let key = sidecar.object_id.unwrap_or_else(|| path.clone());
        let mut metadata = sidecar.properties;
        if let Some((_, name)) = paths::split(&path) {
            metadata.insert(StoragePropertyNames::Name.value().to_string(), name.into());
        }
        metadata.insert(
            StoragePropertyNames::ObjectId.value().to_string(),
            key.as_str().into(),
        );
        metadata.insert(
            StoragePropertyNames::BaseTypeId.value().to_string(),
            base.value().into(),
        );
        metadata
            .entry(StoragePropertyNames::ObjectTypeId.value().to_string())
            .or_insert_with(|| base.value().into());
        if let Ok(created) = meta.created() {
            metadata.insert(
                StoragePropertyNames::CreationDate.value().to_string(),
                DateTime::<Utc>::from(created).into(),
            );
        }
        if let Ok(modified) = meta.modified() {
            metadata.insert(
                StoragePropertyNames::LastModificationDate.value().to_string(),
                DateTime::<Utc>::from(modified).into(),
            );
        }

        let mime_type = StoragePropertyNames::ContentStreamMimeType.value().to_string();
        match base {
            BaseType::Document => {
                metadata.insert(
                    StoragePropertyNames::ContentStreamLength.value().to_string(),
                    meta.len().into(),
                );
                metadata
                    .entry(mime_type)
                    .or_insert_with(|| DEFAULT_MIME_TYPE.into());
            }
            BaseType::Folder => {
                metadata.remove(&mime_type);
            }
        }

        Ok(Some(StorageObject::new(key, path, Some(metadata))))
    }

    async fn resolve_existing(&self, path: &str) -> StorageResult<StorageObject> {
        self.resolve(path)
            .await?
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    /// Find the node currently holding `key`.
    async fn locate(&self, key: &str) -> StorageResult<Option<StorageObject>> {
        let index = self.load_index().await?;
        let (key, path) = match index.get(key) {
            Some(path) => (key.to_string(), path.clone()),
            None => {
                let canonical = paths::normalize(key)?;
                (canonical.clone(), canonical)
            }
        };
        Ok(self.resolve(&path).await?.filter(|so| so.key() == key))
    }

    async fn locate_existing(&self, key: &str) -> StorageResult<StorageObject> {
        self.locate(key)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    /// Resolve `path` and require it to be a folder; returns its canonical path.
    async fn require_folder(&self, path: &str) -> StorageResult<String> {
        let folder = self
            .resolve(path)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("Folder not found: {}", path)))?;
        if !folder.is_folder() {
            return Err(StorageError::InvalidArgument(format!(
                "Not a folder: {}",
                folder.path()
            )));
        }
        Ok(folder.path().to_string())
    }

    /// Persist the record of a node created at `path` and return its key.
    async fn register(&self, path: &str, properties: Metadata) -> StorageResult<String> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index().await?;
        let key = assign_key(&index, path);
        let record = Sidecar {
            object_id: Some(key.clone()),
            properties,
        };
        self.write_sidecar(path, &record).await?;
        if key != path {
            index.insert(key.clone(), path.to_string());
            self.save_index(&index).await?;
        }
        Ok(key)
    }

    /// Write `content` next to `target` and move it into place once complete.
    async fn write_content(
        &self,
        target: &Path,
        name: &str,
        mut content: ContentReader,
    ) -> StorageResult<u64> {
        let tmp = target.with_file_name(upload_name(name));

        let written = async {
            let mut file = fs::File::create(&tmp).await?;
            let bytes_copied = tokio::io::copy(&mut content, &mut file).await?;
            file.sync_all().await?;
            Ok::<u64, io::Error>(bytes_copied)
        }
        .await;

        match written {
            Ok(bytes_copied) => {
                fs::rename(&tmp, target)
                    .await
                    .map_err(|e| io_failure("move content into", target, e))?;
                Ok(bytes_copied)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&tmp).await {
                    tracing::warn!(path = %tmp.display(), error = %cleanup, "Failed to remove partial upload");
                }
                Err(io_failure("write content to", target, e))
            }
        }
    }

    async fn rename(&self, path: &str, new_name: &str) -> StorageResult<String> {
        validate_node_name(new_name)?;
        let (parent, _) = paths::split(path).ok_or_else(|| {
            StorageError::InvalidArgument("The root folder cannot be renamed".to_string())
        })?;
        let new_path = paths::join(parent, new_name)?;
        let to = self.fs_path(&new_path);

        if fs::try_exists(&to).await? {
            return Err(StorageError::AlreadyExists(new_path));
        }

        let from = self.fs_path(path);
        fs::rename(&from, &to)
            .await
            .map_err(|e| io_failure("rename", &from, e))?;
        self.move_sidecar(path, &new_path).await?;
        self.reindex_moved(path, &new_path).await?;

        tracing::info!(from = %path, to = %new_path, "Filesystem rename successful");

        Ok(new_path)
    }

    /// Point every key in the subtree now at `new` to its current path.
    async fn reindex_moved(&self, old: &str, new: &str) -> StorageResult<()> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index().await?;
        for node_path in self.subtree_paths(new).await? {
            let mut record = self.read_sidecar(&node_path).await?;
            let key = match &record.object_id {
                Some(key) => key.clone(),
                None => {
                    let former = format!("{}{}", old, &node_path[new.len()..]);
                    record.object_id = Some(former.clone());
                    self.write_sidecar(&node_path, &record).await?;
                    former
                }
            };
            record_location(&mut index, key, node_path);
        }
        self.save_index(&index).await
    }

    /// Give every node of a freshly copied subtree its own key.
    async fn rekey_copy(&self, dest: &str) -> StorageResult<()> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index().await?;
        for node_path in self.subtree_paths(dest).await? {
            let key = assign_key(&index, &node_path);
            let mut record = self.read_sidecar(&node_path).await?;
            record.object_id = Some(key.clone());
            self.write_sidecar(&node_path, &record).await?;
            record_location(&mut index, key, node_path);
        }
        self.save_index(&index).await
    }

    async fn copy_tree(from: &Path, to: &Path) -> StorageResult<()> {
        let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
        while let Some((src, dst)) = pending.pop() {
            fs::create_dir(&dst)
                .await
                .map_err(|e| io_failure("create folder", &dst, e))?;
            let mut entries = fs::read_dir(&src)
                .await
                .map_err(|e| io_failure("list", &src, e))?;
            while let Some(entry) = entries.next_entry().await? {
                let file_name = entry.file_name();
                let target = dst.join(&file_name);
                if entry.file_type().await?.is_dir() {
                    pending.push((entry.path(), target));
                } else if !file_name.to_string_lossy().ends_with(UPLOAD_SUFFIX) {
                    fs::copy(entry.path(), &target)
                        .await
                        .map_err(|e| io_failure("copy", &entry.path(), e))?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for FilesystemDriver {
    fn store_type(&self) -> StoreType {
        StoreType::Filesystem
    }

    async fn resolve_by_key(&self, key: &str) -> StorageResult<Option<StorageObject>> {
        self.locate(key).await
    }

    async fn resolve_by_path(&self, path: &str) -> StorageResult<Option<StorageObject>> {
        self.resolve(path).await
    }

    async fn create_folder(
        &self,
        parent_path: &str,
        name: &str,
        metadata: Metadata,
    ) -> StorageResult<String> {
        validate_node_name(name)?;
        let parent = self.require_folder(parent_path).await?;
        let path = paths::join(&parent, name)?;
        let fs_path = self.fs_path(&path);

        if let Err(e) = fs::create_dir(&fs_path).await {
            if e.kind() == io::ErrorKind::AlreadyExists {
                return Err(StorageError::AlreadyExists(path));
            }
            return Err(io_failure("create folder", &fs_path, e));
        }
        let key = self.register(&path, metadata).await?;

        tracing::info!(path = %fs_path.display(), key = %key, "Filesystem folder created");

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
        validate_node_name(&name)?;

        let parent = self.require_folder(parent_path).await?;
        let path = paths::join(&parent, &name)?;
        let fs_path = self.fs_path(&path);

        if fs::try_exists(&fs_path).await? {
            return Err(StorageError::AlreadyExists(path));
        }

        let start = std::time::Instant::now();
        let size = self.write_content(&fs_path, &name, content).await?;

        let mut properties = metadata;
        properties.insert(
            StoragePropertyNames::ContentStreamMimeType.value().to_string(),
            content_type.into(),
        );
        let key = self.register(&path, properties).await?;

        tracing::info!(
            path = %fs_path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Filesystem document stored"
        );

        self.resolve_existing(&path).await
    }

    async fn update_properties(
        &self,
        properties: Metadata,
        target: &StorageObject,
    ) -> StorageResult<StorageObject> {
        let current = self.locate_existing(target.key()).await?;
        let mut path = current.path().to_string();
        if paths::is_root(&path) {
            return Err(StorageError::InvalidArgument(
                "The root folder has no updatable properties".to_string(),
            ));
        }

        let mut record = self.read_sidecar(&path).await?;
        let mut new_name = None;
        for (name, value) in properties {
            if name == StoragePropertyNames::Name.value() {
                let renamed = value.as_str().ok_or_else(|| StorageError::TypeMismatch {
                    name: name.clone(),
                    expected: "string",
                    found: value.type_name(),
                })?;
                new_name = Some(renamed.to_string());
            } else if StoragePropertyNames::is_system(&name) {
                tracing::debug!(property = %name, key = %current.key(), "Ignoring update of system property");
            } else {
                record.properties.insert(name, value);
            }
        }

        if let Some(new_name) = new_name {
            if current.name() != Some(new_name.as_str()) {
                path = self.rename(&path, &new_name).await?;
            }
        }
        record.object_id = Some(current.key().to_string());
        self.write_sidecar(&path, &record).await?;

        tracing::info!(key = %current.key(), path = %path, "Filesystem properties updated");

        self.resolve_existing(&path).await
    }

    async fn update_stream(
        &self,
        key: &str,
        content: ContentReader,
        content_type: &str,
    ) -> StorageResult<StorageObject> {
        let current = self.locate_existing(key).await?;
        if !current.is_document() {
            return Err(StorageError::InvalidArgument(format!(
                "Not a document: {}",
                current.path()
            )));
        }
        let path = current.path();
        let (_, name) = paths::split(path)
            .ok_or_else(|| StorageError::InvalidArgument(format!("Not a document: {}", path)))?;

        let start = std::time::Instant::now();
        let fs_path = self.fs_path(path);
        let size = self.write_content(&fs_path, name, content).await?;

        let mut record = self.read_sidecar(path).await?;
        record.object_id = Some(current.key().to_string());
        record.properties.insert(
            StoragePropertyNames::ContentStreamMimeType.value().to_string(),
            content_type.into(),
        );
        self.write_sidecar(path, &record).await?;

        tracing::info!(
            path = %fs_path.display(),
            key = %current.key(),
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Filesystem stream update successful"
        );

        self.resolve_existing(path).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let Some(current) = self.locate(key).await? else {
            return Ok(false);
        };
        let path = current.path();
        if paths::is_root(path) {
            return Err(StorageError::InvalidArgument(
                "The root folder cannot be deleted".to_string(),
            ));
        }

        let start = std::time::Instant::now();
        let mut doomed = Vec::new();
        for node_path in self.subtree_paths(path).await? {
            let record = self.read_sidecar(&node_path).await?;
            doomed.push(record.object_id.unwrap_or(node_path));
        }

        let fs_path = self.fs_path(path);
        let removed = if current.is_folder() {
            fs::remove_dir_all(&fs_path).await
        } else {
            fs::remove_file(&fs_path).await
        };
        removed.map_err(|e| io_failure("delete", &fs_path, e))?;

        if let Some(sidecar) = self.sidecar_path(path) {
            match fs::remove_file(&sidecar).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_failure("delete metadata", &sidecar, e)),
            }
        }

        {
            let _guard = self.index_lock.lock().await;
            let mut index = self.load_index().await?;
            let before = index.len();
            for doomed_key in &doomed {
                index.remove(doomed_key);
            }
            if index.len() != before {
                self.save_index(&index).await?;
            }
        }

        tracing::info!(
            path = %fs_path.display(),
            key = %current.key(),
            removed = doomed.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Filesystem delete successful"
        );

        Ok(true)
    }

    async fn copy_node(
        &self,
        source: &StorageObject,
        target: &StorageObject,
    ) -> StorageResult<StorageObject> {
        let source = self.locate_existing(source.key()).await?;
        let (_, name) = paths::split(source.path()).ok_or_else(|| {
            StorageError::InvalidArgument("The root folder cannot be copied".to_string())
        })?;
        let dest_parent = self.require_folder(target.path()).await?;

        if source.is_folder() && paths::is_within(&dest_parent, source.path()) {
            return Err(StorageError::InvalidArgument(format!(
                "Cannot copy {} into its own subtree {}",
                source.path(),
                dest_parent
            )));
        }

        let dest = paths::join(&dest_parent, name)?;
        let to = self.fs_path(&dest);
        if fs::try_exists(&to).await? {
            return Err(StorageError::AlreadyExists(dest));
        }

        let from = self.fs_path(source.path());
        if source.is_folder() {
            Self::copy_tree(&from, &to).await?;
        } else {
            fs::copy(&from, &to)
                .await
                .map_err(|e| io_failure("copy", &from, e))?;
        }

        if let (Some(from_sidecar), Some(to_sidecar)) =
            (self.sidecar_path(source.path()), self.sidecar_path(&dest))
        {
            match fs::copy(&from_sidecar, &to_sidecar).await {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_failure("copy metadata", &from_sidecar, e)),
            }
        }
        self.rekey_copy(&dest).await?;

        let copy = self.resolve_existing(&dest).await?;

        tracing::info!(
            from_key = %source.key(),
            to_key = %copy.key(),
            from_path = %from.display(),
            to_path = %to.display(),
            "Filesystem copy successful"
        );

        Ok(copy)
    }

    async fn get_resource(&self, key: &str) -> StorageResult<ContentStream> {
        let current = self.locate_existing(key).await?;
        if !current.is_document() {
            return Err(StorageError::NotFound(format!(
                "{} has no content stream",
                current.path()
            )));
        }

        let fs_path = self.fs_path(current.path());
        let file = fs::File::open(&fs_path)
            .await
            .map_err(|e| io_failure("open", &fs_path, e))?;

        let reader = tokio_util::io::ReaderStream::new(file);

        let path_display = fs_path.display().to_string();
        let stream = reader.map(move |result| {
            result.map_err(|e| {
                tracing::error!(path = %path_display, error = %e, "Filesystem stream read error");
                StorageError::backend_with_source(format!("Failed to read chunk: {}", e), e)
            })
        });

        Ok(Box::pin(stream))
    }

    async fn get_children(&self, key: &str) -> StorageResult<Vec<StorageObject>> {
        let current = self.locate_existing(key).await?;
        if !current.is_folder() {
            return Ok(Vec::new());
        }

        let fs_path = self.fs_path(current.path());
        let mut children = Vec::new();
        for name in self.child_names(&fs_path).await? {
            let child_path = match paths::join(current.path(), &name) {
                Ok(child_path) => child_path,
                Err(e) => {
                    tracing::warn!(name = %name, error = %e, "Skipping entry with unsupported name");
                    continue;
                }
            };
            if let Some(child) = self.resolve(&child_path).await? {
                children.push(child);
            }
        }

        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::reader_from_bytes;
    use tempfile::tempdir;

    async fn read_all(mut stream: ContentStream) -> Vec<u8> {
        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk.unwrap());
        }
        data
    }

    fn named(name: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(StoragePropertyNames::Name.value().to_string(), name.into());
        metadata
    }

    #[tokio::test]
    async fn test_store_and_read_document() {
        let dir = tempdir().unwrap();
        let driver = FilesystemDriver::new(dir.path()).await.unwrap();

        let so = driver
            .store_document(reader_from_bytes("pippo"), "text/plain", "/", named("a.txt"))
            .await
            .unwrap();

        assert_eq!(so.key(), "/a.txt");
        assert_eq!(so.path(), "/a.txt");
        assert_eq!(so.content_length(), Some(5));
        assert_eq!(so.mime_type(), Some("text/plain"));
        assert!(so.is_document());

        let data = read_all(driver.get_resource(so.key()).await.unwrap()).await;
        assert_eq!(data, b"pippo");
        assert!(dir.path().join(".a.txt.meta.json").exists());
    }

    #[tokio::test]
    async fn test_sidecars_are_hidden() {
        let dir = tempdir().unwrap();
        let driver = FilesystemDriver::new(dir.path()).await.unwrap();

        let so = driver
            .store_document(reader_from_bytes("x"), "text/plain", "/", named("a.txt"))
            .await
            .unwrap();
        driver.update_properties(named("b.txt"), &so).await.unwrap();

        let children = driver.get_children("/").await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].path(), "/b.txt");

        assert!(driver.resolve_by_path("/.b.txt.meta.json").await.unwrap().is_none());
        assert!(driver.resolve_by_path("/.storecloud.index.json").await.unwrap().is_none());
        let reserved = driver
            .store_document(reader_from_bytes("x"), "text/plain", "/", named(".c.meta.json"))
            .await;
        assert!(matches!(reserved, Err(StorageError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_store_requires_existing_parent() {
        let dir = tempdir().unwrap();
        let driver = FilesystemDriver::new(dir.path()).await.unwrap();

        let result = driver
            .store_document(reader_from_bytes("x"), "text/plain", "/nope", named("a.txt"))
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_paths_through_a_document_do_not_resolve() {
        let dir = tempdir().unwrap();
        let driver = FilesystemDriver::new(dir.path()).await.unwrap();
        driver
            .store_document(reader_from_bytes("x"), "text/plain", "/", named("a.txt"))
            .await
            .unwrap();

        assert!(driver.resolve_by_path("/a.txt/child").await.unwrap().is_none());
        assert!(driver.resolve_by_key("/a.txt/child").await.unwrap().is_none());
        assert!(!driver.delete("/a.txt/child").await.unwrap());

        let result = driver.create_folder("/a.txt", "child", Metadata::new()).await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let driver = FilesystemDriver::new(dir.path()).await.unwrap();

        let result = driver.resolve_by_path("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));

        let result = driver.create_folder("/", "..", Metadata::new()).await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_create_folder_twice_conflicts() {
        let dir = tempdir().unwrap();
        let driver = FilesystemDriver::new(dir.path()).await.unwrap();

        let key = driver.create_folder("/", "uno", Metadata::new()).await.unwrap();
        assert_eq!(key, "/uno");

        let again = driver.create_folder("/", "uno", Metadata::new()).await;
        assert!(matches!(again, Err(StorageError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_rename_keeps_key_and_moves_sidecar() {
        let dir = tempdir().unwrap();
        let driver = FilesystemDriver::new(dir.path()).await.unwrap();

        let mut metadata = named("old.txt");
        metadata.insert("pluto".to_string(), "paperino".into());
        let so = driver
            .store_document(reader_from_bytes("x"), "text/plain", "/", metadata)
            .await
            .unwrap();

        let updated = driver
            .update_properties(named("new.txt"), &so)
            .await
            .unwrap();

        assert_eq!(updated.key(), "/old.txt");
        assert_eq!(updated.path(), "/new.txt");
        assert_eq!(updated.property::<String>("pluto").unwrap().as_deref(), Some("paperino"));
        assert!(!dir.path().join(".old.txt.meta.json").exists());
        assert!(driver.resolve_by_path("/old.txt").await.unwrap().is_none());

        let by_key = driver.resolve_by_key("/old.txt").await.unwrap().unwrap();
        assert_eq!(by_key.path(), "/new.txt");
    }

    #[tokio::test]
    async fn test_new_node_at_vacated_path_gets_its_own_key() {
        let dir = tempdir().unwrap();
        let driver = FilesystemDriver::new(dir.path()).await.unwrap();

        let first = driver
            .store_document(reader_from_bytes("uno"), "text/plain", "/", named("a.txt"))
            .await
            .unwrap();
        driver.update_properties(named("b.txt"), &first).await.unwrap();

        let second = driver
            .store_document(reader_from_bytes("due"), "text/plain", "/", named("a.txt"))
            .await
            .unwrap();
        assert_eq!(second.path(), "/a.txt");
        assert_ne!(second.key(), first.key());

        let moved = driver.resolve_by_key(first.key()).await.unwrap().unwrap();
        assert_eq!(moved.path(), "/b.txt");
        let fresh = driver.resolve_by_key(second.key()).await.unwrap().unwrap();
        assert_eq!(fresh.path(), "/a.txt");
        assert_eq!(read_all(driver.get_resource(second.key()).await.unwrap()).await, b"due");
    }

    #[tokio::test]
    async fn test_folder_rename_keeps_descendant_keys() {
        let dir = tempdir().unwrap();
        let driver = FilesystemDriver::new(dir.path()).await.unwrap();

        let parent = driver.create_folder("/", "parent", Metadata::new()).await.unwrap();
        let doc = driver
            .store_document(reader_from_bytes("x"), "text/plain", "/parent", named("a.txt"))
            .await
            .unwrap();

        let folder = driver.resolve_by_key(&parent).await.unwrap().unwrap();
        driver.update_properties(named("renamed"), &folder).await.unwrap();

        let moved = driver.resolve_by_key(doc.key()).await.unwrap().unwrap();
        assert_eq!(moved.path(), "/renamed/a.txt");

        assert!(driver.delete(&parent).await.unwrap());
        assert!(driver.resolve_by_key(doc.key()).await.unwrap().is_none());
        assert!(driver.load_index().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_system_properties_are_not_persisted() {
        let dir = tempdir().unwrap();
        let driver = FilesystemDriver::new(dir.path()).await.unwrap();

        let so = driver
            .store_document(reader_from_bytes("abc"), "text/plain", "/", named("a.txt"))
            .await
            .unwrap();

        let mut update = Metadata::new();
        update.insert(
            StoragePropertyNames::ContentStreamLength.value().to_string(),
            999i64.into(),
        );
        let updated = driver.update_properties(update, &so).await.unwrap();
        assert_eq!(updated.content_length(), Some(3));
    }

    #[tokio::test]
    async fn test_copy_folder_into_itself_rejected() {
        let dir = tempdir().unwrap();
        let driver = FilesystemDriver::new(dir.path()).await.unwrap();

        let parent = driver.create_folder("/", "parent", Metadata::new()).await.unwrap();
        let child = driver.create_folder(&parent, "child", Metadata::new()).await.unwrap();

        let source = driver.resolve_by_key(&parent).await.unwrap().unwrap();
        let target = driver.resolve_by_key(&child).await.unwrap().unwrap();
        let result = driver.copy_node(&source, &target).await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_copy_assigns_keys_of_its_own() {
        let dir = tempdir().unwrap();
        let driver = FilesystemDriver::new(dir.path()).await.unwrap();

        driver.create_folder("/", "src", Metadata::new()).await.unwrap();
        let dst = driver.create_folder("/", "dst", Metadata::new()).await.unwrap();
        let doc = driver
            .store_document(reader_from_bytes("x"), "text/plain", "/src", named("a.txt"))
            .await
            .unwrap();

        let source = driver.resolve_by_path("/src").await.unwrap().unwrap();
        let target = driver.resolve_by_key(&dst).await.unwrap().unwrap();
        let copy = driver.copy_node(&source, &target).await.unwrap();
        assert_eq!(copy.key(), "/dst/src");

        let copied_doc = driver.resolve_by_path("/dst/src/a.txt").await.unwrap().unwrap();
        assert_eq!(copied_doc.key(), "/dst/src/a.txt");
        assert_eq!(
            driver.resolve_by_key(doc.key()).await.unwrap().unwrap().path(),
            "/src/a.txt"
        );
    }

    #[tokio::test]
    async fn test_root_cannot_be_deleted() {
        let dir = tempdir().unwrap();
        let driver = FilesystemDriver::new(dir.path()).await.unwrap();

        let result = driver.delete("/").await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
        assert!(!driver.delete("/missing").await.unwrap());
    }
}
