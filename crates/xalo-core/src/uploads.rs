//! Image upload storage.
//!
//! Uploaded images are stored as opaque objects under `uploads/` and served
//! back at `{public_base_url}/api/v1/uploads/{name}`. The object name is
//! `{ulid}-{sanitized stem}.{ext}`, where the extension is derived from the
//! content type, so serving needs no sidecar metadata.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::gallery::{ImageUploader, PendingFile, UploadError};
use crate::id::UploadId;
use crate::storage::{ObjectMeta, StorageBackend, WritePrecondition, WriteResult};

/// Storage prefix for uploaded objects.
pub const UPLOAD_PREFIX: &str = "uploads/";

/// Public route prefix under which uploads are served.
pub const UPLOAD_ROUTE: &str = "/api/v1/uploads/";

/// Default upload size limit (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const MAX_STEM_LEN: usize = 48;

/// Supported image types and their canonical extensions.
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/avif", "avif"),
    ("image/bmp", "bmp"),
    ("image/svg+xml", "svg"),
    ("image/tiff", "tiff"),
];

/// Returns the extension for a supported image content type.
#[must_use]
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    IMAGE_TYPES
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(essence))
        .map(|(_, ext)| *ext)
}

/// Returns the content type for an object name, by extension.
#[must_use]
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpeg") => "image/jpeg",
        Some(ext) => IMAGE_TYPES
            .iter()
            .find(|(_, e)| *e == ext)
            .map_or("application/octet-stream", |(mime, _)| *mime),
        None => "application/octet-stream",
    }
}

/// Picks the content type for a pending file.
///
/// The declared type wins when it is a supported image type; otherwise the
/// file name's extension is consulted (browsers sometimes send
/// `application/octet-stream`).
fn resolve_image_type(file: &PendingFile) -> std::result::Result<&'static str, UploadError> {
    if let Some(ext) = extension_for(&file.content_type) {
        return Ok(ext);
    }
    let declared = file.content_type.trim();
    if declared.is_empty() || declared.eq_ignore_ascii_case("application/octet-stream") {
        if let Some(ext) = extension_for(content_type_for(&file.name)) {
            return Ok(ext);
        }
    }
    Err(UploadError::Rejected(format!(
        "only image uploads are accepted (got '{declared}')"
    )))
}

/// Reduces a file name to a short, URL-safe stem.
#[must_use]
pub fn sanitize_stem(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let stem = base.rsplit_once('.').map_or(base, |(stem, _)| stem);

    let mut out = String::with_capacity(stem.len().min(MAX_STEM_LEN));
    for c in stem.chars() {
        if out.len() >= MAX_STEM_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A stored upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Public object name (`{ulid}-{stem}.{ext}`).
    pub name: String,
    /// Public URL.
    pub url: String,
    /// Size in bytes.
    pub size: usize,
}

/// Upload storage over a [`StorageBackend`].
#[derive(Clone)]
pub struct UploadStore {
    backend: Arc<dyn StorageBackend>,
    public_base_url: String,
    max_bytes: usize,
}

impl std::fmt::Debug for UploadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadStore")
            .field("public_base_url", &self.public_base_url)
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}

impl UploadStore {
    /// Creates an upload store with the default size limit.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, public_base_url: impl Into<String>) -> Self {
        Self {
            backend,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Overrides the size limit.
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Configured size limit.
    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Public URL for an object name.
    #[must_use]
    pub fn url_for(&self, name: &str) -> String {
        format!("{}{UPLOAD_ROUTE}{name}", self.public_base_url)
    }

    /// Extracts the object name from an upload URL.
    ///
    /// Matches on the `/api/v1/uploads/{name}` path whatever the host, so URLs
    /// issued under an earlier base URL still resolve. Root-relative paths are
    /// accepted. URLs with any other path return `None`.
    #[must_use]
    pub fn name_from_url(url: &str) -> Option<String> {
        let path = match url.split_once("://") {
            Some((_, rest)) => &rest[rest.find('/')?..],
            None => url,
        };
        let name = path.strip_prefix(UPLOAD_ROUTE)?;
        let name = name.split(['?', '#']).next().unwrap_or(name);
        (!name.is_empty() && !name.contains('/')).then(|| name.to_string())
    }

    fn object_path(name: &str) -> Result<String> {
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(Error::NotFound(name.to_string()));
        }
        Ok(format!("{UPLOAD_PREFIX}{name}"))
    }

    /// Validates and stores one file.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::Rejected` for empty or non-image files,
    /// `UploadError::TooLarge` above the limit, and `UploadError::Failed` for
    /// storage errors.
    pub async fn store(&self, file: &PendingFile) -> std::result::Result<StoredUpload, UploadError> {
        if file.is_empty() {
            return Err(UploadError::Rejected(format!("'{}' is empty", file.name)));
        }
        if file.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                size: file.len(),
                limit: self.max_bytes,
            });
        }
        let ext = resolve_image_type(file)?;

        let name = format!("{}-{}.{ext}", UploadId::generate(), sanitize_stem(&file.name));
        let path = Self::object_path(&name)?;
        match self
            .backend
            .put(&path, file.bytes.clone(), WritePrecondition::DoesNotExist)
            .await?
        {
            WriteResult::Success { .. } => {}
            WriteResult::PreconditionFailed => {
                return Err(UploadError::Failed(format!("upload name collision: {name}")));
            }
        }

        let url = self.url_for(&name);
        tracing::info!(name = %name, size = file.len(), "Image uploaded");
        Ok(StoredUpload {
            name,
            url,
            size: file.len(),
        })
    }

    /// Loads an upload and its content type.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for unknown or malformed names.
    pub async fn fetch(&self, name: &str) -> Result<(Bytes, &'static str)> {
        let path = Self::object_path(name)?;
        let bytes = self.backend.get(&path).await?;
        Ok((bytes, content_type_for(name)))
    }

    /// Lists stored uploads. `ObjectMeta::path` is the full storage key.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the backend.
    pub async fn list(&self) -> Result<Vec<ObjectMeta>> {
        self.backend.list(UPLOAD_PREFIX).await
    }

    /// Deletes an upload by public name.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the backend.
    pub async fn delete(&self, name: &str) -> Result<()> {
        self.backend.delete(&Self::object_path(name)?).await
    }
}

/// [`ImageUploader`] that writes straight into an [`UploadStore`].
#[derive(Debug, Clone)]
pub struct StoreUploader {
    store: Arc<UploadStore>,
}

impl StoreUploader {
    /// Wraps a store.
    #[must_use]
    pub const fn new(store: Arc<UploadStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ImageUploader for StoreUploader {
    async fn upload(&self, file: &PendingFile) -> std::result::Result<String, UploadError> {
        self.store.store(file).await.map(|stored| stored.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::reconcile;
    use crate::storage::MemoryBackend;

    fn store() -> UploadStore {
        UploadStore::new(Arc::new(MemoryBackend::new()), "http://localhost:5000/")
    }

    fn jpeg(name: &str) -> PendingFile {
        PendingFile::new(name, "image/jpeg", vec![0xff, 0xd8, 0xff])
    }

    #[tokio::test]
    async fn store_then_fetch() {
        let store = store();
        let stored = store.store(&jpeg("Lịch Tháng 6.JPG")).await.unwrap();

        assert!(stored.url.starts_with("http://localhost:5000/api/v1/uploads/"));
        assert!(stored.name.ends_with("-l-ch-th-ng-6.jpg"), "{}", stored.name);

        let (bytes, content_type) = store.fetch(&stored.name).await.unwrap();
        assert_eq!(bytes.as_ref(), &[0xff, 0xd8, 0xff]);
        assert_eq!(content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn rejects_non_images_and_empty_files() {
        let store = store();
        let pdf = PendingFile::new("doc.pdf", "application/pdf", vec![1]);
        assert!(matches!(store.store(&pdf).await, Err(UploadError::Rejected(_))));

        let empty = PendingFile::new("a.png", "image/png", Vec::<u8>::new());
        assert!(matches!(store.store(&empty).await, Err(UploadError::Rejected(_))));
    }

    #[tokio::test]
    async fn falls_back_to_extension_for_octet_stream() {
        let store = store();
        let file = PendingFile::new("photo.webp", "application/octet-stream", vec![1, 2]);
        let stored = store.store(&file).await.unwrap();
        assert!(stored.name.ends_with(".webp"));
    }

    #[tokio::test]
    async fn enforces_size_limit() {
        let store = store().with_max_bytes(2);
        let err = store.store(&jpeg("big.jpg")).await.unwrap_err();
        assert_eq!(err, UploadError::TooLarge { size: 3, limit: 2 });
    }

    #[tokio::test]
    async fn fetch_rejects_traversal() {
        let store = store();
        assert!(store.fetch("../schedules/x.json").await.unwrap_err().is_not_found());
        assert!(store.fetch("missing.jpg").await.unwrap_err().is_not_found());
    }

    #[test]
    fn name_from_url_matches_upload_paths() {
        let store = store();
        let url = store.url_for("01J-a.jpg");
        assert_eq!(UploadStore::name_from_url(&url).as_deref(), Some("01J-a.jpg"));
        assert_eq!(
            UploadStore::name_from_url("/api/v1/uploads/01J-b.png").as_deref(),
            Some("01J-b.png")
        );
        assert_eq!(UploadStore::name_from_url("https://cdn.example.com/a.jpg"), None);
        assert_eq!(UploadStore::name_from_url("https://cdn.example.com"), None);
        assert_eq!(UploadStore::name_from_url("/api/v1/uploads/"), None);
        assert_eq!(UploadStore::name_from_url("/api/v1/uploads/a/b.png"), None);
    }

    #[test]
    fn name_from_url_ignores_host_and_query() {
        for url in [
            "http://localhost:5000/api/v1/uploads/01J-c.webp",
            "https://api.xalo.edu.vn/api/v1/uploads/01J-c.webp?v=2",
            "https://old-host.example/api/v1/uploads/01J-c.webp#top",
        ] {
            assert_eq!(UploadStore::name_from_url(url).as_deref(), Some("01J-c.webp"), "{url}");
        }
    }

    #[test]
    fn sanitize_handles_odd_names() {
        assert_eq!(sanitize_stem("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_stem("  .png"), "image");
        assert_eq!(sanitize_stem("My Photo (1).jpeg"), "my-photo-1");
    }

    #[test]
    fn content_type_mapping() {
        assert_eq!(extension_for("image/PNG"), Some("png"));
        assert_eq!(extension_for("image/jpeg; charset=binary"), Some("jpg"));
        assert_eq!(extension_for("text/plain"), None);
        assert_eq!(content_type_for("x.svg"), "image/svg+xml");
        assert_eq!(content_type_for("x.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("x"), "application/octet-stream");
    }

    #[tokio::test]
    async fn store_uploader_feeds_reconcile() {
        let store = Arc::new(store());
        let uploader = StoreUploader::new(store.clone());
        let pending = vec![
            PendingFile::new("notes.txt", "text/plain", vec![1]),
            jpeg("june.jpg"),
        ];

        let out = reconcile(&[], &pending, &uploader).await.unwrap();
        assert_eq!(out.images.len(), 1);
        assert_eq!(out.failed[0].name, "notes.txt");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
