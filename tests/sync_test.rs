// End-to-end pass behavior against the in-memory object store.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

use tether::engine::{ReconciliationEngine, SyncMode};
use tether::rules::{Direction, SyncRule};
use tether::store::memory::MemoryStore;

fn rule(local: &Path, remote: &str, direction: Direction) -> SyncRule {
    SyncRule {
        id: format!("rule_{}", remote),
        name: remote.to_string(),
        local_path: local.to_path_buf(),
        remote_path: remote.to_string(),
        direction,
        filters: Vec::new(),
        enabled: true,
    }
}

#[tokio::test]
async fn full_pass_fills_both_sides() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("local.txt"), "from disk").unwrap();

    let store = Arc::new(MemoryStore::new());
    store.insert_with_mtime("docs/remote.txt", b"from store", SystemTime::now());

    let mut engine = ReconciliationEngine::new(store.clone());
    let rules = vec![rule(temp.path(), "docs", Direction::Bidirectional)];

    let status = engine.run_pass(&rules, SyncMode::Full).await;
    assert!(status.errors.is_empty());
    assert_eq!(status.files_uploaded, 1);
    assert!(status.files_downloaded >= 1);

    assert_eq!(store.object_data("docs/local.txt").unwrap(), b"from disk");
    assert_eq!(
        fs::read(temp.path().join("remote.txt")).unwrap(),
        b"from store"
    );
}

#[tokio::test]
async fn repeated_passes_reach_quiescence() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("local.txt"), "from disk").unwrap();

    let store = Arc::new(MemoryStore::new());
    store.insert_with_mtime("docs/remote.txt", b"from store", SystemTime::now());

    let mut engine = ReconciliationEngine::new(store.clone());
    let rules = vec![rule(temp.path(), "docs", Direction::Bidirectional)];

    engine.run_pass(&rules, SyncMode::Full).await;
    let second = engine.run_pass(&rules, SyncMode::Full).await;

    assert!(second.errors.is_empty());
    assert_eq!(second.files_uploaded, 0);
    assert_eq!(second.files_downloaded, 0);
    assert_eq!(second.conflict_count, 0);
}

#[tokio::test]
async fn upload_only_pass_is_idempotent() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), "a").unwrap();
    fs::write(temp.path().join("b.txt"), "b").unwrap();

    let store = Arc::new(MemoryStore::new());
    let mut engine = ReconciliationEngine::new(store.clone());
    let rules = vec![rule(temp.path(), "docs", Direction::Upload)];

    let first = engine.run_pass(&rules, SyncMode::Full).await;
    assert_eq!(first.files_uploaded, 2);

    let second = engine.run_pass(&rules, SyncMode::Full).await;
    assert_eq!(second.files_uploaded, 0);
    assert!(second.errors.is_empty());
}

#[tokio::test]
async fn nested_directories_are_mapped_to_keys() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("sub/inner")).unwrap();
    fs::write(temp.path().join("sub/inner/deep.txt"), "deep").unwrap();

    let store = Arc::new(MemoryStore::new());
    let mut engine = ReconciliationEngine::new(store.clone());
    let rules = vec![rule(temp.path(), "docs", Direction::Upload)];

    engine.run_pass(&rules, SyncMode::Full).await;
    assert!(store.contains("docs/sub/inner/deep.txt"));
}

#[tokio::test]
async fn downloads_are_stamped_with_the_remote_mtime() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let mtime = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    store.insert_with_mtime("docs/pinned.txt", b"data", mtime);

    let mut engine = ReconciliationEngine::new(store);
    let rules = vec![rule(temp.path(), "docs", Direction::Download)];

    let status = engine.run_pass(&rules, SyncMode::Full).await;
    assert_eq!(status.files_downloaded, 1);

    let on_disk = fs::metadata(temp.path().join("pinned.txt"))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(on_disk, mtime);
}

#[tokio::test]
async fn incremental_transfers_only_changes_since_baseline() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), "a").unwrap();
    fs::write(temp.path().join("b.txt"), "b").unwrap();

    let store = Arc::new(MemoryStore::new());
    let mut engine = ReconciliationEngine::new(store.clone());
    let rules = vec![rule(temp.path(), "docs", Direction::Upload)];

    let first = engine.run_pass(&rules, SyncMode::Incremental).await;
    assert_eq!(first.files_uploaded, 2);

    std::thread::sleep(Duration::from_millis(20));
    let second = engine.run_pass(&rules, SyncMode::Incremental).await;
    assert_eq!(second.files_uploaded, 0);

    std::thread::sleep(Duration::from_millis(20));
    fs::write(temp.path().join("c.txt"), "c").unwrap();
    let third = engine.run_pass(&rules, SyncMode::Incremental).await;
    assert_eq!(third.files_uploaded, 1);
    assert!(store.contains("docs/c.txt"));
}

#[tokio::test]
async fn incremental_skips_remote_objects_older_than_baseline() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let mut engine = ReconciliationEngine::new(store.clone());
    let rules = vec![rule(temp.path(), "docs", Direction::Download)];

    // Advance the baseline past the old object.
    engine.run_pass(&rules, SyncMode::Incremental).await;
    store.insert_with_mtime("docs/ancient.txt", b"old", UNIX_EPOCH + Duration::from_secs(1000));

    std::thread::sleep(Duration::from_millis(20));
    store.insert_with_mtime("docs/fresh.txt", b"new", SystemTime::now());

    let status = engine.run_pass(&rules, SyncMode::Incremental).await;
    assert_eq!(status.files_downloaded, 1);
    assert!(temp.path().join("fresh.txt").exists());
    assert!(!temp.path().join("ancient.txt").exists());
}

#[tokio::test]
async fn rule_filters_apply_to_both_directions() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("keep.txt"), "keep").unwrap();
    fs::write(temp.path().join("debug.log"), "noise").unwrap();

    let store = Arc::new(MemoryStore::new());
    store.insert_with_mtime("docs/other.log", b"noise", SystemTime::now());
    store.insert_with_mtime("docs/data.txt", b"data", SystemTime::now());

    let mut engine = ReconciliationEngine::new(store.clone());
    let r = rule(temp.path(), "docs", Direction::Bidirectional).with_filters(vec!["*.log".into()]);

    let status = engine.run_pass(&[r], SyncMode::Selective).await;
    assert!(status.errors.is_empty());

    assert!(store.contains("docs/keep.txt"));
    assert!(!store.contains("docs/debug.log"));
    assert!(temp.path().join("data.txt").exists());
    assert!(!temp.path().join("other.log").exists());
}

#[tokio::test]
async fn filter_shorthand_prefix_and_exact() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("tmp_scratch.txt"), "x").unwrap();
    fs::write(temp.path().join("Thumbs.db"), "x").unwrap();
    fs::write(temp.path().join("real.txt"), "x").unwrap();

    let store = Arc::new(MemoryStore::new());
    let mut engine = ReconciliationEngine::new(store.clone());
    let r = rule(temp.path(), "docs", Direction::Upload)
        .with_filters(vec!["tmp_*".into(), "Thumbs.db".into()]);

    engine.run_pass(&[r], SyncMode::Selective).await;
    assert_eq!(store.keys(), vec!["docs/real.txt".to_string()]);
}

#[tokio::test]
async fn backup_pass_snapshots_into_a_timestamped_folder() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), "a").unwrap();
    fs::create_dir(temp.path().join("sub")).unwrap();
    fs::write(temp.path().join("sub/b.txt"), "b").unwrap();

    let store = Arc::new(MemoryStore::new());
    let mut engine = ReconciliationEngine::new(store.clone());
    let rules = vec![rule(temp.path(), "docs", Direction::Upload)];

    let status = engine.run_pass(&rules, SyncMode::Backup).await;
    assert!(status.errors.is_empty());
    assert_eq!(status.files_uploaded, 2);

    let keys = store.keys();
    let files: Vec<&String> = keys.iter().filter(|k| !k.ends_with('/')).collect();
    assert_eq!(files.len(), 2);
    for key in &files {
        assert!(
            key.starts_with("docs/backup_"),
            "unexpected key: {}",
            key
        );
    }
    assert!(files.iter().any(|k| k.ends_with("/a.txt")));
    assert!(files.iter().any(|k| k.ends_with("/sub/b.txt")));
}

#[tokio::test]
async fn backup_pass_never_overwrites_previous_snapshots() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), "v1").unwrap();

    let store = Arc::new(MemoryStore::new());
    let mut engine = ReconciliationEngine::new(store.clone());
    let rules = vec![rule(temp.path(), "docs", Direction::Upload)];

    engine.run_pass(&rules, SyncMode::Backup).await;
    let after_first: Vec<String> = store.keys();

    // A later snapshot gets a different folder name.
    std::thread::sleep(Duration::from_millis(1100));
    fs::write(temp.path().join("a.txt"), "v2").unwrap();
    engine.run_pass(&rules, SyncMode::Backup).await;

    let after_second = store.keys();
    assert!(after_second.len() > after_first.len());
    for key in &after_first {
        assert!(after_second.contains(key));
    }
}

#[tokio::test]
async fn broken_rule_does_not_block_other_rules() {
    let temp = TempDir::new().unwrap();
    let good = temp.path().join("good");
    fs::create_dir(&good).unwrap();
    fs::write(good.join("x.txt"), "x").unwrap();

    let store = Arc::new(MemoryStore::new());
    let mut engine = ReconciliationEngine::new(store.clone());

    let rules = vec![
        rule(&temp.path().join("does-not-exist"), "broken", Direction::Upload),
        rule(&good, "good", Direction::Upload),
    ];

    let status = engine.run_pass(&rules, SyncMode::Full).await;
    assert!(!status.errors.is_empty());
    assert_eq!(status.files_uploaded, 1);
    assert!(store.contains("good/x.txt"));
}
