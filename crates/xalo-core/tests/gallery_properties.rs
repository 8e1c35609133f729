//! Property-based tests for gallery reconciliation and reordering.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Mutex;

use async_trait::async_trait;
use proptest::prelude::*;
use tokio_test::block_on;

use xalo_core::{
    move_item, reconcile, remove_item, Direction, GalleryError, ImageUploader, PendingFile,
    UploadError,
};

/// Succeeds or fails per file according to a `ok:` / `fail:` name prefix.
#[derive(Default)]
struct PrefixUploader {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageUploader for PrefixUploader {
    async fn upload(&self, file: &PendingFile) -> Result<String, UploadError> {
        self.calls.lock().unwrap().push(file.name.clone());
        match file.name.strip_prefix("ok:") {
            Some(rest) => Ok(format!("https://img.test/{rest}")),
            None => Err(UploadError::Failed(format!("scripted failure for {}", file.name))),
        }
    }
}

/// Generates a pending file that will upload successfully or fail.
fn arb_pending() -> impl Strategy<Value = PendingFile> {
    (any::<bool>(), "[a-z0-9]{1,8}").prop_map(|(ok, stem)| {
        let name = if ok { format!("ok:{stem}") } else { format!("fail:{stem}") };
        PendingFile::new(name, "image/png", vec![1u8])
    })
}

fn arb_retained() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("https://cdn\\.test/[a-z]{1,6}\\.jpg", 0..6)
}

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Up), Just(Direction::Down)]
}

proptest! {
    #[test]
    fn output_is_retained_then_successes(
        retained in arb_retained(),
        pending in prop::collection::vec(arb_pending(), 0..6),
    ) {
        let uploader = PrefixUploader::default();
        let result = block_on(reconcile(&retained, &pending, &uploader));

        let successes: Vec<String> = pending
            .iter()
            .filter_map(|f| f.name.strip_prefix("ok:"))
            .map(|rest| format!("https://img.test/{rest}"))
            .collect();
        let mut expected = retained.clone();
        expected.extend(successes.iter().cloned());

        // every file is attempted exactly once, in order
        let calls = uploader.calls.lock().unwrap().clone();
        let names: Vec<String> = pending.iter().map(|f| f.name.clone()).collect();
        prop_assert_eq!(calls, names);

        if expected.is_empty() {
            prop_assert_eq!(
                result.unwrap_err(),
                GalleryError::NoImagesAvailable { attempted: pending.len() }
            );
        } else {
            let out = result.unwrap();
            prop_assert_eq!(out.images, expected);
            prop_assert_eq!(&out.uploaded, &successes);
            prop_assert_eq!(out.failed.len() + out.uploaded.len(), pending.len());
        }
    }

    #[test]
    fn boundary_moves_never_change_the_list(items in prop::collection::vec(any::<u8>(), 0..10)) {
        let mut moved = items.clone();
        for _ in 0..3 {
            prop_assert!(!move_item(&mut moved, 0, Direction::Up));
            if let Some(last) = moved.len().checked_sub(1) {
                prop_assert!(!move_item(&mut moved, last, Direction::Down));
            }
        }
        prop_assert_eq!(moved, items);
    }

    #[test]
    fn move_is_a_permutation(
        items in prop::collection::vec(any::<u8>(), 0..10),
        index in 0usize..12,
        direction in arb_direction(),
    ) {
        let mut moved = items.clone();
        let swapped = move_item(&mut moved, index, direction);

        let mut a = items.clone();
        let mut b = moved.clone();
        a.sort_unstable();
        b.sort_unstable();
        prop_assert_eq!(a, b);
        if !swapped {
            prop_assert_eq!(moved, items);
        }
    }

    #[test]
    fn remove_keeps_relative_order(
        items in prop::collection::vec(any::<u16>(), 0..10),
        index in 0usize..12,
    ) {
        let mut remaining = items.clone();
        let removed = remove_item(&mut remaining, index);

        if index < items.len() {
            prop_assert_eq!(removed, Some(items[index]));
            let mut expected = items.clone();
            expected.remove(index);
            prop_assert_eq!(remaining, expected);
        } else {
            prop_assert_eq!(removed, None);
            prop_assert_eq!(remaining, items);
        }
    }
}
