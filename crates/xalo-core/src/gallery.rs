//! Ordered gallery reconciliation.
//!
//! An edit to a schedule's images has two halves: URLs already stored that the
//! editor kept (possibly reordered or trimmed), and new files staged for
//! upload. [`reconcile`] turns both into the final ordered list:
//!
//! ```text
//!   images = retained ++ [url(f) for f in pending if upload(f) succeeds]
//! ```
//!
//! Uploads run one at a time in staging order. A file's final position
//! depends only on its position in `pending`, so overlapping uploads that
//! finish out of order must never be allowed to reshuffle the gallery.
//!
//! [`GalleryDraft`] is the editor-side value object: it holds the retained list
//! and the staged files, applies reorder/remove edits, and hands both to
//! [`reconcile`] on submit.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::Instrument;

use crate::error::Error;
use crate::observability::gallery_span;

/// A new image staged for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingFile {
    /// Original file name (used for logging and key derivation).
    pub name: String,
    /// MIME type reported by the producer.
    pub content_type: String,
    /// File contents.
    pub bytes: Bytes,
}

impl PendingFile {
    /// Creates a pending file.
    #[must_use]
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true for a zero-byte file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for PendingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingFile")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A single upload failed. Non-fatal to reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// The upload service refused the file (wrong type, empty, ...).
    #[error("upload rejected: {0}")]
    Rejected(String),

    /// The file exceeds the configured size limit.
    #[error("upload too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Actual size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Transport or storage failure.
    #[error("upload failed: {0}")]
    Failed(String),
}

impl From<Error> for UploadError {
    fn from(value: Error) -> Self {
        match value {
            Error::Validation { message } | Error::InvalidInput(message) => Self::Rejected(message),
            other => Self::Failed(other.to_string()),
        }
    }
}

/// Reconciliation failed as a whole.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GalleryError {
    /// Nothing was retained and no upload succeeded.
    #[error("no images available: {attempted} upload(s) attempted, none succeeded, none retained")]
    NoImagesAvailable {
        /// Number of uploads attempted.
        attempted: usize,
    },
}

impl From<GalleryError> for Error {
    fn from(value: GalleryError) -> Self {
        Self::NoImagesAvailable {
            message: value.to_string(),
        }
    }
}

/// Turns a binary image into a stable URL.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Uploads one file and returns its URL.
    async fn upload(&self, file: &PendingFile) -> Result<String, UploadError>;
}

/// A pending file that did not make it into the gallery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpload {
    /// Position in the pending list.
    pub index: usize,
    /// File name.
    pub name: String,
    /// Why it failed.
    pub error: UploadError,
}

/// Outcome of a successful reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    /// Final ordered list: retained first, then successful uploads.
    pub images: Vec<String>,
    /// URLs produced by this pass, in upload order.
    pub uploaded: Vec<String>,
    /// Uploads that were skipped.
    pub failed: Vec<FailedUpload>,
}

/// Merges retained URLs with freshly uploaded files.
///
/// Each pending file is uploaded and awaited before the next one starts.
/// Failed uploads are logged and skipped; nothing is retried.
///
/// # Errors
///
/// Returns [`GalleryError::NoImagesAvailable`] when the merged list would be
/// empty.
pub async fn reconcile<U>(
    retained: &[String],
    pending: &[PendingFile],
    uploader: &U,
) -> Result<Reconciled, GalleryError>
where
    U: ImageUploader + ?Sized,
{
    async move {
        let mut uploaded = Vec::with_capacity(pending.len());
        let mut failed = Vec::new();

        for (index, file) in pending.iter().enumerate() {
            match uploader.upload(file).await {
                Ok(url) => {
                    tracing::debug!(index, name = %file.name, url = %url, "upload succeeded");
                    uploaded.push(url);
                }
                Err(error) => {
                    tracing::warn!(index, name = %file.name, error = %error, "upload failed, skipping");
                    failed.push(FailedUpload {
                        index,
                        name: file.name.clone(),
                        error,
                    });
                }
            }
        }

        let mut images = Vec::with_capacity(retained.len() + uploaded.len());
        images.extend_from_slice(retained);
        images.extend(uploaded.iter().cloned());

        if images.is_empty() {
            return Err(GalleryError::NoImagesAvailable {
                attempted: pending.len(),
            });
        }

        Ok(Reconciled {
            images,
            uploaded,
            failed,
        })
    }
    .instrument(gallery_span(retained.len(), pending.len()))
    .await
}

// ============================================================================
// Editing sub-operations
// ============================================================================

/// Direction for a reorder step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards index 0 (offset -1).
    Up,
    /// Towards the end (offset +1).
    Down,
}

impl Direction {
    /// Target index for a move from `index`, if it does not underflow.
    #[must_use]
    pub const fn target(self, index: usize) -> Option<usize> {
        match self {
            Self::Up => index.checked_sub(1),
            Self::Down => index.checked_add(1),
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "-1" => Ok(Self::Up),
            "down" | "+1" | "1" => Ok(Self::Down),
            other => Err(Error::InvalidInput(format!(
                "direction must be 'up' or 'down' (got '{other}')"
            ))),
        }
    }
}

/// Swaps `items[index]` with its neighbour in `direction`.
///
/// Out-of-bounds source or target leaves the slice untouched. Returns whether
/// a swap happened.
pub fn move_item<T>(items: &mut [T], index: usize, direction: Direction) -> bool {
    match direction.target(index) {
        Some(target) if index < items.len() && target < items.len() => {
            items.swap(index, target);
            true
        }
        _ => false,
    }
}

/// Removes `items[index]`, shifting later elements down by one.
pub fn remove_item<T>(items: &mut Vec<T>, index: usize) -> Option<T> {
    (index < items.len()).then(|| items.remove(index))
}

/// Editor state for one gallery edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GalleryDraft {
    existing: Vec<String>,
    staged: Vec<PendingFile>,
}

impl GalleryDraft {
    /// Empty draft (creating a new schedule).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Draft seeded with a schedule's current images.
    #[must_use]
    pub fn from_existing(images: impl IntoIterator<Item = String>) -> Self {
        Self {
            existing: images.into_iter().collect(),
            staged: Vec::new(),
        }
    }

    /// Retained URLs in current order.
    #[must_use]
    pub fn existing(&self) -> &[String] {
        &self.existing
    }

    /// Staged files in upload order.
    #[must_use]
    pub fn staged(&self) -> &[PendingFile] {
        &self.staged
    }

    /// Returns true when neither retained nor staged images remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.existing.is_empty() && self.staged.is_empty()
    }

    /// Moves a retained URL one slot in `direction`.
    pub fn move_existing(&mut self, index: usize, direction: Direction) -> bool {
        move_item(&mut self.existing, index, direction)
    }

    /// Drops a retained URL.
    pub fn remove_existing(&mut self, index: usize) -> Option<String> {
        remove_item(&mut self.existing, index)
    }

    /// Drops a staged file.
    pub fn remove_staged(&mut self, index: usize) -> Option<PendingFile> {
        remove_item(&mut self.staged, index)
    }

    /// Stages a file after any already staged.
    pub fn stage(&mut self, file: PendingFile) {
        self.staged.push(file);
    }

    /// Stages several files, preserving their order.
    pub fn stage_all(&mut self, files: impl IntoIterator<Item = PendingFile>) {
        self.staged.extend(files);
    }

    /// Uploads staged files and merges them after the retained list.
    ///
    /// # Errors
    ///
    /// See [`reconcile`].
    pub async fn submit<U>(&self, uploader: &U) -> Result<Reconciled, GalleryError>
    where
        U: ImageUploader + ?Sized,
    {
        reconcile(&self.existing, &self.staged, uploader).await
    }
}
