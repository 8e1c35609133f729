//! Storage backend abstraction for documents and uploaded images.
//!
//! Schedules are stored as JSON documents and uploads as raw image bytes, both
//! behind the same small object-store contract:
//! - Keys are `/`-separated relative paths (`schedules/{id}.json`, `uploads/{file}`)
//! - Writes may carry a `DoesNotExist` precondition so creates never clobber
//! - Object metadata includes size, an opaque version token and `last_modified`
//!
//! Two backends ship with the crate: [`MemoryBackend`] for tests and debug
//! runs, and [`LocalFsBackend`] which keeps objects under a directory root.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// Precondition for conditional writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePrecondition {
    /// Write only if object does not exist.
    DoesNotExist,
    /// Write unconditionally (last writer wins).
    None,
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// Write succeeded, returns new version token.
    Success {
        /// The new version token after the write.
        version: String,
    },
    /// Precondition failed; the object already exists.
    PreconditionFailed,
}

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Object path (key).
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
    /// Opaque object version token.
    pub version: String,
    /// Last modification timestamp.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Storage backend trait for object storage.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Reads entire object.
    ///
    /// Returns `Error::NotFound` if object doesn't exist.
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Writes with optional precondition.
    ///
    /// Returns `WriteResult::PreconditionFailed` if precondition not met.
    /// Never returns error for precondition failure - that's a normal result.
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult>;

    /// Deletes an object.
    ///
    /// Succeeds even if object doesn't exist (idempotent).
    async fn delete(&self, path: &str) -> Result<()>;

    /// Lists objects with the given prefix.
    ///
    /// **Ordering**: arbitrary. Callers requiring deterministic order should
    /// sort the results.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Gets object metadata without reading content.
    ///
    /// Returns `None` if object doesn't exist.
    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>>;
}

/// Rejects keys that could escape a storage root.
///
/// # Errors
///
/// Returns `Error::InvalidInput` for empty, absolute, or traversing keys.
pub fn validate_key(path: &str) -> Result<()> {
    if path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(Error::InvalidInput(format!("invalid storage key: {path:?}")));
    }
    Ok(())
}

// ============================================================================
// In-memory backend
// ============================================================================

/// In-memory storage backend for testing.
///
/// Thread-safe via `RwLock`. Not suitable for production.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    version: i64,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn meta(&self, path: &str) -> ObjectMeta {
        ObjectMeta {
            path: path.to_string(),
            size: self.data.len() as u64,
            version: self.version.to_string(),
            last_modified: Some(self.last_modified),
        }
    }
}

impl MemoryBackend {
    /// Creates a new empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the modification time of an object.
    ///
    /// Lets tests age uploads past a sweep grace period.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the object doesn't exist.
    pub fn set_last_modified(&self, path: &str, at: DateTime<Utc>) -> Result<()> {
        let mut objects = self.objects.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        let obj = objects
            .get_mut(path)
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))?;
        obj.last_modified = at;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        objects
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        validate_key(path)?;
        let mut objects = self.objects.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        let current = objects.get(path);
        if precondition == WritePrecondition::DoesNotExist && current.is_some() {
            return Ok(WriteResult::PreconditionFailed);
        }

        let new_version = current.map_or(1, |o| o.version + 1);
        objects.insert(
            path.to_string(),
            StoredObject {
                data,
                version: new_version,
                last_modified: Utc::now(),
            },
        );
        drop(objects);

        Ok(WriteResult::Success {
            version: new_version.to_string(),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(path, obj)| obj.meta(path))
            .collect())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects.get(path).map(|obj| obj.meta(path)))
    }
}

// ============================================================================
// Local filesystem backend
// ============================================================================

/// Filesystem storage backend rooted at a directory.
///
/// Each key maps to a file below the root. Unconditional writes go through a
/// temporary file and a rename so readers never observe a half-written object.
#[derive(Debug, Clone)]
pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    /// Creates a backend rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            Error::storage_with_source(format!("create storage root {}", root.display()), e)
        })?;
        Ok(Self { root })
    }

    /// Returns the storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        validate_key(path)?;
        Ok(self.root.join(path))
    }

    fn key_for(&self, file: &Path) -> Option<String> {
        let rel = file.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

fn meta_from_fs(path: String, meta: &std::fs::Metadata) -> ObjectMeta {
    let last_modified = meta.modified().ok().map(DateTime::<Utc>::from);
    let version = last_modified
        .and_then(|t| t.timestamp_nanos_opt())
        .unwrap_or_default()
        .to_string();
    ObjectMeta {
        path,
        size: meta.len(),
        version,
        last_modified,
    }
}

#[async_trait]
impl StorageBackend for LocalFsBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let file = self.resolve(path)?;
        match tokio::fs::read(&file).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("object not found: {path}")))
            }
            Err(e) => Err(Error::storage_with_source(format!("read {path}"), e)),
        }
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage_with_source(format!("create dir for {path}"), e))?;
        }

        // the final key only ever appears fully written
        let tmp = file.with_extension(format!("tmp-{}", ulid::Ulid::new()));
        if let Err(e) = tokio::fs::write(&tmp, &data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::storage_with_source(format!("write {path}"), e));
        }

        match precondition {
            WritePrecondition::DoesNotExist => {
                let linked = tokio::fs::hard_link(&tmp, &file).await;
                let _ = tokio::fs::remove_file(&tmp).await;
                match linked {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                        return Ok(WriteResult::PreconditionFailed);
                    }
                    Err(e) => return Err(Error::storage_with_source(format!("create {path}"), e)),
                }
            }
            WritePrecondition::None => {
                if let Err(e) = tokio::fs::rename(&tmp, &file).await {
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(Error::storage_with_source(format!("rename {path}"), e));
                }
            }
        }

        let meta = tokio::fs::metadata(&file)
            .await
            .map_err(|e| Error::storage_with_source(format!("stat {path}"), e))?;
        Ok(WriteResult::Success {
            version: meta_from_fs(path.to_string(), &meta).version,
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let file = self.resolve(path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage_with_source(format!("delete {path}"), e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let mut out = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(Error::storage_with_source(
                        format!("list {}", dir.display()),
                        e,
                    ));
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::storage_with_source("list entry", e))?
            {
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| Error::storage_with_source("stat entry", e))?;
                let path = entry.path();
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Some(key) = self.key_for(&path) else {
                    continue;
                };
                // in-flight temp files from concurrent writers
                if key.contains(".tmp-") {
                    continue;
                }
                if key.starts_with(prefix) {
                    out.push(meta_from_fs(key, &meta));
                }
            }
        }

        Ok(out)
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let file = self.resolve(path)?;
        match tokio::fs::metadata(&file).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta_from_fs(path.to_string(), &meta))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage_with_source(format!("stat {path}"), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        let data = Bytes::from("hello world");

        let result = backend
            .put("test/file.txt", data.clone(), WritePrecondition::None)
            .await
            .expect("put should succeed");

        assert!(matches!(result, WriteResult::Success { ref version } if version == "1"));

        let retrieved = backend
            .get("test/file.txt")
            .await
            .expect("get should succeed");
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_object_meta_has_required_fields() {
        let backend = MemoryBackend::new();
        backend
            .put("test.txt", Bytes::from("data"), WritePrecondition::None)
            .await
            .expect("put should succeed");

        let meta = backend
            .head("test.txt")
            .await
            .expect("head should succeed")
            .expect("object should exist");

        assert_eq!(meta.path, "test.txt");
        assert_eq!(meta.size, 4);
        assert!(!meta.version.is_empty(), "must have version");
        assert!(meta.last_modified.is_some(), "must have last_modified");
    }

    #[tokio::test]
    async fn test_precondition_does_not_exist() {
        let backend = MemoryBackend::new();

        let result = backend
            .put(
                "new.txt",
                Bytes::from("data"),
                WritePrecondition::DoesNotExist,
            )
            .await
            .expect("should succeed");
        assert!(matches!(result, WriteResult::Success { .. }));

        let result = backend
            .put(
                "new.txt",
                Bytes::from("data2"),
                WritePrecondition::DoesNotExist,
            )
            .await
            .expect("should succeed");
        assert_eq!(result, WriteResult::PreconditionFailed);
        assert_eq!(backend.get("new.txt").await.unwrap(), Bytes::from("data"));
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let backend = MemoryBackend::new();

        backend
            .put("a/1.txt", Bytes::from("a1"), WritePrecondition::None)
            .await
            .unwrap();
        backend
            .put("a/2.txt", Bytes::from("a2"), WritePrecondition::None)
            .await
            .unwrap();
        backend
            .put("b/1.txt", Bytes::from("b1"), WritePrecondition::None)
            .await
            .unwrap();

        assert_eq!(backend.list("a/").await.unwrap().len(), 2);
        assert_eq!(backend.list("b/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let backend = MemoryBackend::new();

        backend
            .put("del.txt", Bytes::from("data"), WritePrecondition::None)
            .await
            .unwrap();
        assert!(backend.head("del.txt").await.unwrap().is_some());

        backend.delete("del.txt").await.expect("should succeed");
        backend.delete("del.txt").await.expect("second delete is a no-op");
        assert!(backend.head("del.txt").await.unwrap().is_none());
    }

    #[test]
    fn validate_key_rejects_traversal() {
        assert!(validate_key("uploads/a.png").is_ok());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("uploads/../../x").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("a\\b").is_err());
        assert!(validate_key("").is_err());
    }

    #[tokio::test]
    async fn test_local_fs_roundtrip_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path()).unwrap();

        backend
            .put(
                "schedules/a.json",
                Bytes::from("{}"),
                WritePrecondition::DoesNotExist,
            )
            .await
            .unwrap();
        backend
            .put(
                "uploads/x.png",
                Bytes::from_static(b"\x89PNG"),
                WritePrecondition::None,
            )
            .await
            .unwrap();

        assert_eq!(
            backend.get("schedules/a.json").await.unwrap(),
            Bytes::from("{}")
        );

        let schedules = backend.list("schedules/").await.unwrap();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].path, "schedules/a.json");

        let all = backend.list("").await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_local_fs_precondition_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path()).unwrap();

        let first = backend
            .put("k.json", Bytes::from("1"), WritePrecondition::DoesNotExist)
            .await
            .unwrap();
        assert!(matches!(first, WriteResult::Success { .. }));
        let second = backend
            .put("k.json", Bytes::from("2"), WritePrecondition::DoesNotExist)
            .await
            .unwrap();
        assert_eq!(second, WriteResult::PreconditionFailed);

        backend
            .put("k.json", Bytes::from("3"), WritePrecondition::None)
            .await
            .unwrap();
        assert_eq!(backend.get("k.json").await.unwrap(), Bytes::from("3"));

        backend.delete("k.json").await.unwrap();
        assert!(backend.head("k.json").await.unwrap().is_none());
        assert!(backend.get("k.json").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_local_fs_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path()).unwrap();

        backend
            .put("uploads/a.png", Bytes::from("first"), WritePrecondition::DoesNotExist)
            .await
            .unwrap();
        let collided = backend
            .put("uploads/a.png", Bytes::from("second"), WritePrecondition::DoesNotExist)
            .await
            .unwrap();
        assert_eq!(collided, WriteResult::PreconditionFailed);
        backend
            .put("uploads/b.png", Bytes::from("b"), WritePrecondition::None)
            .await
            .unwrap();

        let mut on_disk = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path().join("uploads")).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            on_disk.push(entry.file_name().to_string_lossy().into_owned());
        }
        on_disk.sort();
        assert_eq!(on_disk, vec!["a.png", "b.png"]);
        assert_eq!(backend.get("uploads/a.png").await.unwrap(), Bytes::from("first"));
    }

    #[tokio::test]
    async fn test_local_fs_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path()).unwrap();
        let result = backend
            .put("../outside", Bytes::from("x"), WritePrecondition::None)
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
