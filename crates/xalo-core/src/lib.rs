//! # xalo-core
//!
//! Core primitives for the Xalo English site backend.
//!
//! - **Schedules**: the monthly schedule entity, its document store, and the
//!   create/read/update/delete handler
//! - **Gallery**: ordered reconciliation of retained image URLs with newly
//!   uploaded files, plus the editor-side draft used to stage edits
//! - **Uploads**: image upload storage and the orphan sweep
//! - **Storage**: a small object-store contract with memory and local
//!   filesystem backends
//!
//! ## Example
//!
//! ```rust
//! use xalo_core::prelude::*;
//!
//! let mut draft = GalleryDraft::from_existing(vec!["a.jpg".to_string(), "b.jpg".to_string()]);
//! draft.move_existing(1, Direction::Up);
//! assert_eq!(draft.existing(), ["b.jpg", "a.jpg"]);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod gallery;
pub mod id;
pub mod month;
pub mod observability;
pub mod schedule;
pub mod storage;
pub mod sweep;
pub mod uploads;

/// Prelude module for convenient imports.
///
/// ```rust
/// use xalo_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::gallery::{
        reconcile, Direction, GalleryDraft, GalleryError, ImageUploader, PendingFile, Reconciled,
        UploadError,
    };
    pub use crate::id::{ScheduleId, UploadId};
    pub use crate::month::ScheduleMonth;
    pub use crate::schedule::{
        ImageList, NewSchedule, Schedule, ScheduleService, ScheduleStore, ScheduleUpdate,
    };
    pub use crate::storage::{LocalFsBackend, MemoryBackend, StorageBackend};
    pub use crate::uploads::{StoreUploader, UploadStore};
}

pub use error::{Error, Result};
pub use gallery::{
    move_item, reconcile, remove_item, Direction, FailedUpload, GalleryDraft, GalleryError,
    ImageUploader, PendingFile, Reconciled, UploadError,
};
pub use id::{ScheduleId, UploadId};
pub use month::ScheduleMonth;
pub use observability::{init_logging, LogFormat};
pub use schedule::{
    ImageList, NewSchedule, Schedule, ScheduleService, ScheduleStore, ScheduleUpdate,
    StorageScheduleStore,
};
pub use storage::{
    LocalFsBackend, MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult,
};
pub use sweep::{sweep_orphans, SweepOptions, SweepReport};
pub use uploads::{StoreUploader, StoredUpload, UploadStore};
