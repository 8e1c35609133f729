//! Orphaned upload cleanup.
//!
//! An upload becomes an orphan when the edit that produced it is abandoned
//! (client disconnect, a later upload in the batch failing the whole
//! submission, or an image removed from a schedule). The sweep deletes
//! uploads that no schedule references, once they are older than a grace
//! period long enough for an in-flight edit session to finish.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schedule::ScheduleService;
use crate::uploads::{UploadStore, UPLOAD_PREFIX};

/// Default grace period, in seconds, before an unreferenced upload is removed.
pub const DEFAULT_SWEEP_GRACE_SECS: i64 = 24 * 60 * 60;

/// Sweep settings.
#[derive(Debug, Clone, Copy)]
pub struct SweepOptions {
    /// Uploads younger than this are never removed.
    pub grace: Duration,
    /// Report what would be removed without deleting.
    pub dry_run: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            grace: Duration::seconds(DEFAULT_SWEEP_GRACE_SECS),
            dry_run: false,
        }
    }
}

/// Result of a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Uploads examined.
    pub scanned: usize,
    /// Uploads still referenced by a schedule.
    pub referenced: usize,
    /// URLs of removed (or, in a dry run, removable) uploads.
    pub removed: Vec<String>,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

/// Deletes uploads that no schedule references and that are older than
/// `options.grace`.
///
/// # Errors
///
/// Returns storage errors from listing schedules, listing uploads, or
/// deleting an orphan.
pub async fn sweep_orphans(
    uploads: &UploadStore,
    schedules: &ScheduleService,
    options: SweepOptions,
) -> Result<SweepReport> {
    let referenced: HashSet<String> = schedules
        .referenced_images()
        .await?
        .iter()
        .filter_map(|url| UploadStore::name_from_url(url))
        .collect();

    let cutoff = Utc::now() - options.grace;
    let mut report = SweepReport {
        dry_run: options.dry_run,
        ..SweepReport::default()
    };

    for meta in uploads.list().await? {
        let Some(name) = meta.path.strip_prefix(UPLOAD_PREFIX) else {
            continue;
        };
        report.scanned += 1;

        if referenced.contains(name) {
            report.referenced += 1;
            continue;
        }
        // unknown age counts as fresh
        if meta.last_modified.map_or(true, |at| at > cutoff) {
            tracing::debug!(name = %name, "unreferenced upload within grace period");
            continue;
        }

        if !options.dry_run {
            uploads.delete(name).await?;
        }
        report.removed.push(uploads.url_for(name));
    }

    tracing::info!(
        scanned = report.scanned,
        referenced = report.referenced,
        removed = report.removed.len(),
        dry_run = report.dry_run,
        "Orphan sweep finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::gallery::PendingFile;
    use crate::schedule::NewSchedule;
    use crate::storage::MemoryBackend;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        uploads: UploadStore,
        schedules: ScheduleService,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        Fixture {
            uploads: UploadStore::new(backend.clone(), "http://xalo.test"),
            schedules: ScheduleService::with_backend(backend.clone()),
            backend,
        }
    }

    async fn upload(f: &Fixture, name: &str, age: Duration) -> String {
        let stored = f
            .uploads
            .store(&PendingFile::new(name, "image/png", vec![1, 2, 3]))
            .await
            .unwrap();
        f.backend
            .set_last_modified(&format!("{UPLOAD_PREFIX}{}", stored.name), Utc::now() - age)
            .unwrap();
        stored.url
    }

    #[tokio::test]
    async fn removes_only_old_unreferenced_uploads() {
        let f = fixture();
        let kept = upload(&f, "kept.png", Duration::days(3)).await;
        let orphan = upload(&f, "orphan.png", Duration::days(3)).await;
        let fresh = upload(&f, "fresh.png", Duration::minutes(5)).await;

        f.schedules
            .create(NewSchedule {
                month: "2024-06".parse().unwrap(),
                title: None,
                images: vec![kept.clone(), "https://cdn.example.com/ext.jpg".into()],
            })
            .await
            .unwrap();

        let report = sweep_orphans(&f.uploads, &f.schedules, SweepOptions::default())
            .await
            .unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.referenced, 1);
        assert_eq!(report.removed, vec![orphan.clone()]);

        let remaining: Vec<_> = f
            .uploads
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.path)
            .collect();
        assert_eq!(remaining.len(), 2);
        let fresh_name = UploadStore::name_from_url(&fresh).unwrap();
        assert!(remaining.iter().any(|p| p.ends_with(&fresh_name)));
    }

    #[tokio::test]
    async fn references_survive_a_base_url_change() {
        let backend = Arc::new(MemoryBackend::new());
        let schedules = ScheduleService::with_backend(backend.clone());
        let before = Fixture {
            backend: backend.clone(),
            uploads: UploadStore::new(backend.clone(), "http://localhost:5000"),
            schedules: schedules.clone(),
        };
        let url = upload(&before, "a.png", Duration::days(3)).await;
        schedules
            .create(NewSchedule {
                month: "2024-06".parse().unwrap(),
                title: None,
                images: vec![url],
            })
            .await
            .unwrap();

        let after = UploadStore::new(backend, "https://api.xalo.edu.vn");
        let report = sweep_orphans(&after, &schedules, SweepOptions::default())
            .await
            .unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.referenced, 1);
        assert!(report.removed.is_empty());
        assert_eq!(after.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dry_run_deletes_nothing() {
        let f = fixture();
        let orphan = upload(&f, "orphan.png", Duration::days(2)).await;

        let report = sweep_orphans(
            &f.uploads,
            &f.schedules,
            SweepOptions {
                dry_run: true,
                ..SweepOptions::default()
            },
        )
        .await
        .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.removed, vec![orphan]);
        assert_eq!(f.uploads.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn zero_grace_removes_fresh_orphans() {
        let f = fixture();
        upload(&f, "a.png", Duration::seconds(1)).await;

        let report = sweep_orphans(
            &f.uploads,
            &f.schedules,
            SweepOptions {
                grace: Duration::zero(),
                dry_run: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(report.removed.len(), 1);
        assert!(f.uploads.list().await.unwrap().is_empty());
    }
}
