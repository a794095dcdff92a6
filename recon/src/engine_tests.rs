//! End-to-end scenarios for the reconciliation engine

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::fs;

use crate::checksum::{ChecksumAlgorithm, Checksummer};
use crate::classifier::{MimeClassifier, NullClassifier};
use crate::engine::{ReconOptions, Reconciler, ReportTarget};
use crate::record::FileRecord;
use crate::store::IndexStore;

async fn fingerprint_of(path: &Path) -> String {
    Checksummer::new(ChecksumAlgorithm::Crc32)
        .fingerprint_file(path)
        .await
        .unwrap()
}

fn reconciler(options: ReconOptions) -> Reconciler {
    Reconciler::new(options, Arc::new(NullClassifier))
}

fn file_report(path: &Path) -> ReconOptions {
    ReconOptions {
        report: ReportTarget::File(path.to_path_buf()),
        max_concurrency: 2,
        ..Default::default()
    }
}

fn occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[tokio::test]
async fn index_creates_records_for_new_files() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("primary");
    fs::create_dir(&root).await.unwrap();
    fs::write(root.join("a.txt"), b"alpha").await.unwrap();
    fs::create_dir(root.join("sub")).await.unwrap();
    fs::write(root.join("sub").join("b.txt"), b"beta").await.unwrap();

    let store = Arc::new(IndexStore::open(temp_dir.path().join("recon.db")).unwrap());
    let engine = Reconciler::new(ReconOptions::default(), Arc::new(MimeClassifier));

    let summary = engine.index(&root, Arc::clone(&store)).await.unwrap();

    assert_eq!(summary.files, 2);
    assert_eq!(summary.created, 2);
    assert_eq!(summary.misses, 2);
    assert_eq!(summary.matches, 0);

    let record = store.find_by_key("/a.txt").unwrap().unwrap();
    assert!(record.is_persisted());
    assert_eq!(record.name, "a.txt");
    assert_eq!(record.fingerprint, fingerprint_of(&root.join("a.txt")).await);
    assert_eq!(record.content_type.as_deref(), Some("text/plain"));
    assert!(record.updated_at.is_none());

    assert!(store.find_by_key("/sub/b.txt").unwrap().is_some());
}

#[tokio::test]
async fn index_twice_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("primary");
    fs::create_dir(&root).await.unwrap();
    fs::write(root.join("a.txt"), b"alpha").await.unwrap();
    fs::write(root.join("b.txt"), b"beta").await.unwrap();

    let store = Arc::new(IndexStore::open(temp_dir.path().join("recon.db")).unwrap());
    let engine = reconciler(ReconOptions::default());

    engine.index(&root, Arc::clone(&store)).await.unwrap();
    let second = engine.index(&root, Arc::clone(&store)).await.unwrap();

    assert_eq!(second.diffs, 0);
    assert_eq!(second.misses, 0);
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.matches, 2);
    assert!(second.is_clean());
}

#[tokio::test]
async fn reindexing_changed_content_updates_the_record() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("primary");
    fs::create_dir(&root).await.unwrap();
    fs::write(root.join("a.txt"), b"X").await.unwrap();

    let store = Arc::new(IndexStore::open(temp_dir.path().join("recon.db")).unwrap());
    let engine = reconciler(ReconOptions::default());

    engine.index(&root, Arc::clone(&store)).await.unwrap();
    let before = store.find_by_key("/a.txt").unwrap().unwrap();

    fs::write(root.join("a.txt"), b"Z").await.unwrap();
    let summary = engine.index(&root, Arc::clone(&store)).await.unwrap();

    assert_eq!(summary.diffs, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.created, 0);

    let after = store.find_by_key("/a.txt").unwrap().unwrap();
    assert_ne!(after.fingerprint, before.fingerprint);
    assert!(after.updated_at.is_some());
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.id, before.id);
}

#[tokio::test]
async fn no_update_leaves_changed_records_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("primary");
    fs::create_dir(&root).await.unwrap();
    fs::write(root.join("a.txt"), b"X").await.unwrap();

    let store = Arc::new(IndexStore::open(temp_dir.path().join("recon.db")).unwrap());
    reconciler(ReconOptions::default())
        .index(&root, Arc::clone(&store))
        .await
        .unwrap();
    let before = store.find_by_key("/a.txt").unwrap().unwrap();

    fs::write(root.join("a.txt"), b"Z").await.unwrap();

    let options = ReconOptions {
        no_update: true,
        ..Default::default()
    };
    let summary = reconciler(options)
        .index(&root, Arc::clone(&store))
        .await
        .unwrap();

    assert_eq!(summary.diffs, 0);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.skipped, 1);

    let after = store.find_by_key("/a.txt").unwrap().unwrap();
    assert_eq!(after.fingerprint, before.fingerprint);
    assert!(after.updated_at.is_none());
}

#[tokio::test]
async fn validate_classifies_both_miss_directions_and_matches() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("primary");
    fs::create_dir(&root).await.unwrap();
    fs::write(root.join("a.txt"), b"X").await.unwrap();
    fs::write(root.join("b.txt"), b"Y").await.unwrap();

    // Reference knows a.txt (current content) and c.txt (long gone).
    let store = Arc::new(IndexStore::open(temp_dir.path().join("recon.db")).unwrap());
    let a_fingerprint = fingerprint_of(&root.join("a.txt")).await;
    store
        .insert(&FileRecord::new("/a.txt".into(), a_fingerprint, None))
        .unwrap();
    store
        .insert(&FileRecord::new("/c.txt".into(), "DEADBEEF".into(), None))
        .unwrap();

    let report_path = temp_dir.path().join("report.txt");
    let summary = reconciler(file_report(&report_path))
        .validate(&root, Arc::clone(&store))
        .await
        .unwrap();

    assert_eq!(summary.matches, 1);
    assert_eq!(summary.misses, 2);
    assert_eq!(summary.diffs, 0);
    assert_eq!(summary.extras, 0);

    let report = std::fs::read_to_string(&report_path).unwrap();
    assert_eq!(occurrences(&report, "MISS: /b.txt"), 1);
    assert_eq!(occurrences(&report, "MISS: /c.txt"), 1);
    assert_eq!(occurrences(&report, "EXTRA:"), 0);
    assert_eq!(occurrences(&report, "MATCH:"), 0);

    // Validation never writes to the store.
    assert_eq!(store.count().unwrap(), 2);
}

#[tokio::test]
async fn validate_reports_changed_content_as_diff() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("primary");
    fs::create_dir(&root).await.unwrap();
    fs::write(root.join("a.txt"), b"new content").await.unwrap();

    let store = Arc::new(IndexStore::open(temp_dir.path().join("recon.db")).unwrap());
    store
        .insert(&FileRecord::new("/a.txt".into(), "0BADF00D".into(), None))
        .unwrap();

    let report_path = temp_dir.path().join("report.txt");
    let summary = reconciler(file_report(&report_path))
        .validate(&root, Arc::clone(&store))
        .await
        .unwrap();

    assert_eq!(summary.diffs, 1);
    assert_eq!(summary.matches, 0);

    let report = std::fs::read_to_string(&report_path).unwrap();
    assert_eq!(occurrences(&report, "DIFF: /a.txt"), 1);
}

#[tokio::test]
async fn prune_deletes_never_matched_keys_and_reports_them() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("primary");
    fs::create_dir(&root).await.unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        fs::write(root.join(name), name.as_bytes()).await.unwrap();
    }

    let store = Arc::new(IndexStore::open(temp_dir.path().join("recon.db")).unwrap());
    reconciler(ReconOptions::default())
        .index(&root, Arc::clone(&store))
        .await
        .unwrap();

    fs::remove_file(root.join("b.txt")).await.unwrap();

    let report_path = temp_dir.path().join("report.txt");
    let options = ReconOptions {
        prune_missing: true,
        ..file_report(&report_path)
    };
    let summary = reconciler(options)
        .index(&root, Arc::clone(&store))
        .await
        .unwrap();

    assert_eq!(summary.pruned, 1);
    assert!(store.find_by_key("/b.txt").unwrap().is_none());
    assert!(store.find_by_key("/a.txt").unwrap().is_some());
    assert!(store.find_by_key("/c.txt").unwrap().is_some());

    let report = std::fs::read_to_string(&report_path).unwrap();
    assert_eq!(occurrences(&report, "PRUNED: /b.txt"), 1);
}

#[tokio::test]
async fn compare_classifies_miss_diff_and_extra_exactly_once() {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().join("base");
    let other = temp_dir.path().join("other");
    fs::create_dir_all(base.join("sub")).await.unwrap();
    fs::create_dir_all(other.join("sub")).await.unwrap();

    fs::write(base.join("same.txt"), b"same").await.unwrap();
    fs::write(other.join("same.txt"), b"same").await.unwrap();

    fs::write(base.join("sub").join("changed.txt"), b"one").await.unwrap();
    fs::write(other.join("sub").join("changed.txt"), b"two").await.unwrap();

    fs::write(base.join("only_base.txt"), b"base").await.unwrap();
    fs::write(other.join("only_other.txt"), b"other").await.unwrap();

    let report_path = temp_dir.path().join("report.txt");
    let summary = reconciler(file_report(&report_path))
        .compare(&base, &other)
        .await
        .unwrap();

    assert_eq!(summary.matches, 1);
    assert_eq!(summary.diffs, 1);
    assert_eq!(summary.misses, 1);
    assert_eq!(summary.extras, 1);

    let report = std::fs::read_to_string(&report_path).unwrap();
    assert_eq!(occurrences(&report, "DIFF: /sub/changed.txt"), 1);
    assert_eq!(occurrences(&report, "MISS: /only_base.txt"), 1);
    assert_eq!(occurrences(&report, "EXTRA: /only_other.txt"), 1);
    // Keys present only in the base are never EXTRA.
    assert_eq!(occurrences(&report, "EXTRA: /only_base.txt"), 0);
}

#[tokio::test]
async fn compare_with_copy_on_diff_converges_the_other_side() {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().join("base");
    let other = temp_dir.path().join("other");
    fs::create_dir(&base).await.unwrap();
    fs::create_dir(&other).await.unwrap();

    fs::write(base.join("changed.txt"), b"fresh").await.unwrap();
    fs::write(other.join("changed.txt"), b"stale").await.unwrap();
    fs::create_dir(base.join("new")).await.unwrap();
    fs::write(base.join("new").join("added.txt"), b"added").await.unwrap();

    let options = ReconOptions {
        copy_on_diff: true,
        ..Default::default()
    };
    let summary = reconciler(options).compare(&base, &other).await.unwrap();

    assert_eq!(summary.copied, 2);
    assert_eq!(
        fs::read(other.join("changed.txt")).await.unwrap(),
        b"fresh".to_vec()
    );
    assert_eq!(
        fs::read(other.join("new").join("added.txt")).await.unwrap(),
        b"added".to_vec()
    );

    // A second comparison finds nothing left to reconcile.
    let second = reconciler(ReconOptions::default())
        .compare(&base, &other)
        .await
        .unwrap();
    assert!(second.is_clean());
}

#[tokio::test]
async fn dangling_symlink_is_not_treated_as_a_file() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("primary");
    fs::create_dir(&root).await.unwrap();
    fs::write(root.join("real.txt"), b"real").await.unwrap();

    #[cfg(unix)]
    std::os::unix::fs::symlink(root.join("gone"), root.join("dangling")).unwrap();

    let store = Arc::new(IndexStore::open(temp_dir.path().join("recon.db")).unwrap());
    let summary = reconciler(ReconOptions::default())
        .index(&root, Arc::clone(&store))
        .await
        .unwrap();

    assert_eq!(summary.files, 1);
    assert_eq!(store.count().unwrap(), 1);
}

#[tokio::test]
async fn invalid_root_fails_before_any_traversal() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(IndexStore::open(temp_dir.path().join("recon.db")).unwrap());

    let result = reconciler(ReconOptions::default())
        .index(temp_dir.path().join("missing"), Arc::clone(&store))
        .await;

    assert!(matches!(result, Err(crate::error::ReconError::Config(_))));
    assert_eq!(store.count().unwrap(), 0);
}
