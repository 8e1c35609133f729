//! Schedule entities, the document store adapter, and the resource handler.
//!
//! A schedule is a month, an optional title, and an ordered, non-empty list of
//! image URLs. Image order is display order and is kept exactly as written by
//! the last successful create or update.
//!
//! ## Lifecycle
//!
//! ```text
//!   absent --create--> present --delete--> absent
//!                      present --update--> present   (identity unchanged)
//! ```
//!
//! ## Storage layout
//!
//! One JSON document per schedule at `schedules/{id}.json`. Concurrent updates
//! to the same schedule are last-writer-wins.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::id::ScheduleId;
use crate::month::ScheduleMonth;
use crate::storage::{StorageBackend, WritePrecondition, WriteResult};

/// Storage prefix for schedule documents.
pub const SCHEDULE_PREFIX: &str = "schedules/";

/// Returns the document key for a schedule.
#[must_use]
pub fn schedule_path(id: ScheduleId) -> String {
    format!("{SCHEDULE_PREFIX}{id}.json")
}

/// A persisted schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Store-assigned identifier.
    pub id: ScheduleId,
    /// Calendar month the schedule covers.
    pub month: ScheduleMonth,
    /// Optional display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Ordered image URLs (display order). Never empty.
    #[serde(rename = "scheduleImgURL")]
    pub images: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// An ordered image list that also accepts a single bare URL on input.
///
/// Producers that send `"scheduleImgURL": "a.jpg"` are normalized to a
/// one-element list here so nothing downstream branches on cardinality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ImageList(pub Vec<String>);

impl ImageList {
    /// Unwraps the normalized list.
    #[must_use]
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for ImageList {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for ImageList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
        }

        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(url) => Self(vec![url]),
            OneOrMany::Many(urls) => Self(urls),
        })
    }
}

/// Input for creating a schedule.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    /// Calendar month.
    pub month: ScheduleMonth,
    /// Optional display label.
    pub title: Option<String>,
    /// Already-reconciled image URLs.
    pub images: Vec<String>,
}

/// Partial update. `None` fields leave the stored value unchanged.
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    /// New title. A blank string clears the title.
    pub title: Option<String>,
    /// New month.
    pub month: Option<ScheduleMonth>,
    /// Replacement image list (already merged by the reconciler).
    pub images: Option<Vec<String>>,
}

impl ScheduleUpdate {
    /// Returns true when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.month.is_none() && self.images.is_none()
    }
}

fn normalize_title(title: Option<String>) -> Option<String> {
    title.and_then(|t| {
        let trimmed = t.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn validate_images(images: &[String]) -> Result<()> {
    if images.is_empty() {
        return Err(Error::validation("at least one image is required"));
    }
    if let Some(pos) = images.iter().position(|url| url.trim().is_empty()) {
        return Err(Error::validation(format!("image at position {pos} is blank")));
    }
    Ok(())
}

// ============================================================================
// Document store
// ============================================================================

/// Persistence contract for schedules.
#[async_trait]
pub trait ScheduleStore: Send + Sync + 'static {
    /// Persists a new schedule. Fails if the id is already taken.
    async fn insert(&self, schedule: &Schedule) -> Result<()>;

    /// Loads a schedule by id.
    async fn get(&self, id: ScheduleId) -> Result<Option<Schedule>>;

    /// Overwrites an existing schedule.
    async fn put(&self, schedule: &Schedule) -> Result<()>;

    /// Removes a schedule. Returns whether it existed.
    async fn remove(&self, id: ScheduleId) -> Result<bool>;

    /// Loads every schedule in arbitrary order.
    async fn list(&self) -> Result<Vec<Schedule>>;
}

/// [`ScheduleStore`] backed by JSON documents in a [`StorageBackend`].
#[derive(Clone)]
pub struct StorageScheduleStore {
    backend: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for StorageScheduleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageScheduleStore")
            .field("backend", &"<StorageBackend>")
            .finish()
    }
}

impl StorageScheduleStore {
    /// Creates a store over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    fn encode(schedule: &Schedule) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(schedule)?))
    }
}

#[async_trait]
impl ScheduleStore for StorageScheduleStore {
    async fn insert(&self, schedule: &Schedule) -> Result<()> {
        let path = schedule_path(schedule.id);
        match self
            .backend
            .put(&path, Self::encode(schedule)?, WritePrecondition::DoesNotExist)
            .await?
        {
            WriteResult::Success { .. } => Ok(()),
            WriteResult::PreconditionFailed => Err(Error::Internal {
                message: format!("schedule id collision: {}", schedule.id),
            }),
        }
    }

    async fn get(&self, id: ScheduleId) -> Result<Option<Schedule>> {
        match self.backend.get(&schedule_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put(&self, schedule: &Schedule) -> Result<()> {
        self.backend
            .put(
                &schedule_path(schedule.id),
                Self::encode(schedule)?,
                WritePrecondition::None,
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, id: ScheduleId) -> Result<bool> {
        let path = schedule_path(id);
        if self.backend.head(&path).await?.is_none() {
            return Ok(false);
        }
        self.backend.delete(&path).await?;
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<Schedule>> {
        let mut schedules = Vec::new();
        for meta in self.backend.list(SCHEDULE_PREFIX).await? {
            if !meta.path.ends_with(".json") {
                continue;
            }
            match self.backend.get(&meta.path).await {
                Ok(bytes) => schedules.push(serde_json::from_slice(&bytes)?),
                // deleted between list and get
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(schedules)
    }
}

// ============================================================================
// Resource handler
// ============================================================================

/// Create/read/update/delete operations for schedules.
#[derive(Clone)]
pub struct ScheduleService {
    store: Arc<dyn ScheduleStore>,
}

impl std::fmt::Debug for ScheduleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleService")
            .field("store", &"<ScheduleStore>")
            .finish()
    }
}

impl ScheduleService {
    /// Creates a service over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self { store }
    }

    /// Convenience constructor over a storage backend.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self::new(Arc::new(StorageScheduleStore::new(backend)))
    }

    /// Lists every schedule, most recent month first.
    ///
    /// Schedules sharing a month are ordered newest-created first.
    ///
    /// # Errors
    ///
    /// Returns storage or serialization errors from the store.
    pub async fn list(&self) -> Result<Vec<Schedule>> {
        let mut schedules = self.store.list().await?;
        schedules.sort_by(|a, b| {
            b.month
                .cmp(&a.month)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(schedules)
    }

    /// Loads one schedule.
    ///
    /// # Errors
    ///
    /// Returns `Error::ResourceNotFound` if the id does not resolve.
    pub async fn get(&self, id: ScheduleId) -> Result<Schedule> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::resource_not_found("Schedule", id))
    }

    /// Creates a schedule.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if `images` is empty or contains a blank URL.
    pub async fn create(&self, input: NewSchedule) -> Result<Schedule> {
        validate_images(&input.images)?;

        let id = ScheduleId::generate();
        let now = Utc::now();
        let schedule = Schedule {
            id,
            month: input.month,
            title: normalize_title(input.title),
            images: input.images,
            created_at: now,
            updated_at: now,
        };

        self.store.insert(&schedule).await?;
        tracing::info!(
            schedule_id = %id,
            month = %schedule.month,
            images = schedule.images.len(),
            "Schedule created"
        );
        Ok(schedule)
    }

    /// Applies a partial update.
    ///
    /// An update with no fields returns the stored schedule untouched.
    ///
    /// # Errors
    ///
    /// Returns `Error::ResourceNotFound` if the id does not resolve and
    /// `Error::Validation` if a provided image list is empty.
    pub async fn update(&self, id: ScheduleId, update: ScheduleUpdate) -> Result<Schedule> {
        let mut schedule = self.get(id).await?;
        if update.is_empty() {
            return Ok(schedule);
        }

        if let Some(images) = update.images.as_deref() {
            validate_images(images)?;
        }

        if let Some(title) = update.title {
            schedule.title = normalize_title(Some(title));
        }
        if let Some(month) = update.month {
            schedule.month = month;
        }
        if let Some(images) = update.images {
            schedule.images = images;
        }
        schedule.updated_at = Utc::now();

        self.store.put(&schedule).await?;
        tracing::info!(
            schedule_id = %id,
            images = schedule.images.len(),
            "Schedule updated"
        );
        Ok(schedule)
    }

    /// Deletes a schedule.
    ///
    /// # Errors
    ///
    /// Returns `Error::ResourceNotFound` if the id does not resolve.
    pub async fn delete(&self, id: ScheduleId) -> Result<()> {
        if !self.store.remove(id).await? {
            return Err(Error::resource_not_found("Schedule", id));
        }
        tracing::info!(schedule_id = %id, "Schedule deleted");
        Ok(())
    }

    /// Returns every image URL referenced by any schedule.
    ///
    /// # Errors
    ///
    /// Returns storage or serialization errors from the store.
    pub async fn referenced_images(&self) -> Result<HashSet<String>> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .flat_map(|s| s.images)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn month(s: &str) -> ScheduleMonth {
        s.parse().unwrap()
    }

    fn service() -> (ScheduleService, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (ScheduleService::with_backend(backend.clone()), backend)
    }

    fn new_schedule(m: &str, images: &[&str]) -> NewSchedule {
        NewSchedule {
            month: month(m),
            title: None,
            images: images.iter().map(ToString::to_string).collect(),
        }
    }

    #[tokio::test]
    async fn create_then_list_preserves_image_order() {
        let (service, _) = service();
        let created = service
            .create(new_schedule("2024-06", &["urlA"]))
            .await
            .unwrap();

        let listed = service.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].images, vec!["urlA"]);

        service
            .update(
                created.id,
                ScheduleUpdate {
                    images: Some(vec!["urlA".into(), "urlB".into()]),
                    ..ScheduleUpdate::default()
                },
            )
            .await
            .unwrap();

        let listed = service.list().await.unwrap();
        assert_eq!(listed[0].images, vec!["urlA", "urlB"]);
        assert_eq!(listed[0].id, created.id);
    }

    #[tokio::test]
    async fn create_rejects_empty_images() {
        let (service, _) = service();
        let err = service
            .create(new_schedule("2024-06", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_blank_image() {
        let (service, _) = service();
        let err = service
            .create(new_schedule("2024-06", &["a", "  "]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn list_orders_by_month_descending() {
        let (service, _) = service();
        service.create(new_schedule("2024-01", &["a"])).await.unwrap();
        service.create(new_schedule("2024-06", &["b"])).await.unwrap();
        service.create(new_schedule("2023-12", &["c"])).await.unwrap();

        let months: Vec<_> = service
            .list()
            .await
            .unwrap()
            .iter()
            .map(|s| s.month.to_string())
            .collect();
        assert_eq!(months, vec!["2024-06", "2024-01", "2023-12"]);
    }

    #[tokio::test]
    async fn duplicate_months_are_allowed() {
        let (service, _) = service();
        service.create(new_schedule("2024-06", &["a"])).await.unwrap();
        service.create(new_schedule("2024-06", &["b"])).await.unwrap();
        assert_eq!(service.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_update_leaves_document_byte_identical() {
        let (service, backend) = service();
        let created = service
            .create(NewSchedule {
                title: Some("June".into()),
                ..new_schedule("2024-06", &["a", "b"])
            })
            .await
            .unwrap();

        let path = schedule_path(created.id);
        let before = backend.get(&path).await.unwrap();
        let returned = service
            .update(created.id, ScheduleUpdate::default())
            .await
            .unwrap();
        let after = backend.get(&path).await.unwrap();

        assert_eq!(before, after);
        assert_eq!(returned, created);
    }

    #[tokio::test]
    async fn update_changes_only_provided_fields() {
        let (service, _) = service();
        let created = service
            .create(NewSchedule {
                title: Some("June".into()),
                ..new_schedule("2024-06", &["a"])
            })
            .await
            .unwrap();

        let updated = service
            .update(
                created.id,
                ScheduleUpdate {
                    month: Some(month("2024-07")),
                    ..ScheduleUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.month.to_string(), "2024-07");
        assert_eq!(updated.title.as_deref(), Some("June"));
        assert_eq!(updated.images, vec!["a"]);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn update_with_blank_title_clears_it() {
        let (service, _) = service();
        let created = service
            .create(NewSchedule {
                title: Some("June".into()),
                ..new_schedule("2024-06", &["a"])
            })
            .await
            .unwrap();
        let updated = service
            .update(
                created.id,
                ScheduleUpdate {
                    title: Some(String::new()),
                    ..ScheduleUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, None);
    }

    #[tokio::test]
    async fn update_rejects_empty_image_list() {
        let (service, _) = service();
        let created = service.create(new_schedule("2024-06", &["a"])).await.unwrap();
        let err = service
            .update(
                created.id,
                ScheduleUpdate {
                    images: Some(Vec::new()),
                    ..ScheduleUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(service.get(created.id).await.unwrap().images, vec!["a"]);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let (service, _) = service();
        let err = service
            .update(ScheduleId::generate(), ScheduleUpdate::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_then_update_is_not_found() {
        let (service, _) = service();
        let created = service.create(new_schedule("2024-06", &["a"])).await.unwrap();

        service.delete(created.id).await.unwrap();

        let err = service
            .update(
                created.id,
                ScheduleUpdate {
                    title: Some("late".into()),
                    ..ScheduleUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = service.delete(created.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn referenced_images_collects_all_urls() {
        let (service, _) = service();
        service.create(new_schedule("2024-06", &["a", "b"])).await.unwrap();
        service.create(new_schedule("2024-07", &["b", "c"])).await.unwrap();

        let refs = service.referenced_images().await.unwrap();
        assert_eq!(refs.len(), 3);
        assert!(refs.contains("c"));
    }

    #[test]
    fn image_list_accepts_single_value() {
        let one: ImageList = serde_json::from_str("\"a.jpg\"").unwrap();
        let many: ImageList = serde_json::from_str("[\"a.jpg\",\"b.jpg\"]").unwrap();
        assert_eq!(one.into_inner(), vec!["a.jpg"]);
        assert_eq!(many.into_inner(), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn schedule_serializes_wire_field_names() {
        let now = Utc::now();
        let schedule = Schedule {
            id: ScheduleId::generate(),
            month: month("2024-06"),
            title: None,
            images: vec!["a".into()],
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&schedule).unwrap();
        assert_eq!(json["month"], "2024-06");
        assert_eq!(json["scheduleImgURL"][0], "a");
        assert!(json.get("title").is_none());
        assert!(json.get("createdAt").is_some());
    }
}
