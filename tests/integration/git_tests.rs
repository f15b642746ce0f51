//! Mirror integration tests against a real `git` binary.
//!
//! Each test builds an upstream repository in a temporary directory and
//! mirrors it by path. Tests return early when `git` is not installed.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use image_ladder::error::SyncError;
use image_ladder::ladder::Label;
use image_ladder::scheduler::SyncScheduler;
use image_ladder::store::{DerivativeStore, MemoryStore};
use image_ladder::sync::{GitSyncer, SourceRepository, SourceSyncer};

use super::test_utils::{fast_builder, test_ladder, write_png};

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Create an upstream repository holding one committed image.
fn upstream(root: &Path) -> std::path::PathBuf {
    let upstream = root.join("upstream");
    std::fs::create_dir_all(&upstream).unwrap();

    git(&upstream, &["init", "-q"]);
    write_png(&upstream.join("cat.png"), 100, 80);
    git(&upstream, &["add", "-A"]);
    git(&upstream, &["commit", "-q", "-m", "Add cat"]);

    upstream
}

fn syncer_for(root: &Path, upstream: &Path) -> GitSyncer {
    GitSyncer::new(SourceRepository::new(
        root.join("data/mirror"),
        upstream.to_str().unwrap(),
    ))
}

#[tokio::test]
async fn test_clone_then_noop() {
    if !git_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let upstream = upstream(dir.path());
    let syncer = syncer_for(dir.path(), &upstream);

    assert!(syncer.ensure_mirror().await.unwrap());
    assert!(syncer.mirror_path().join("cat.png").exists());
    assert!(syncer.last_marker().await.is_some());

    // Already mirrored
    assert!(!syncer.ensure_mirror().await.unwrap());

    // Nothing new upstream
    assert!(!syncer.refresh().await.unwrap());
}

#[tokio::test]
async fn test_refresh_detects_new_commit() {
    if !git_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let upstream = upstream(dir.path());
    let syncer = syncer_for(dir.path(), &upstream);
    syncer.ensure_mirror().await.unwrap();
    let first = syncer.last_marker().await;

    write_png(&upstream.join("dog.png"), 30, 30);
    git(&upstream, &["add", "-A"]);
    git(&upstream, &["commit", "-q", "-m", "Add dog"]);

    assert!(syncer.refresh().await.unwrap());
    assert!(syncer.mirror_path().join("dog.png").exists());
    assert_ne!(syncer.last_marker().await, first);

    assert!(!syncer.refresh().await.unwrap());
}

#[tokio::test]
async fn test_failed_clone_is_unavailable_and_cleaned_up() {
    if !git_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let syncer = syncer_for(dir.path(), &dir.path().join("does-not-exist"));

    let result = syncer.ensure_mirror().await;

    assert!(matches!(
        result,
        Err(SyncError::Unavailable {
            operation: "clone",
            ..
        })
    ));
    assert!(!syncer.mirror_path().exists());
    assert!(syncer.last_marker().await.is_none());
}

#[tokio::test]
async fn test_mirror_without_head_is_recloned() {
    if !git_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let upstream = upstream(dir.path());
    let syncer = syncer_for(dir.path(), &upstream);

    // What a clone killed before its first checkout leaves behind
    std::fs::create_dir_all(syncer.mirror_path()).unwrap();
    git(syncer.mirror_path(), &["init", "-q"]);
    assert!(syncer.is_mirrored());

    assert!(syncer.ensure_mirror().await.unwrap());
    assert!(syncer.mirror_path().join("cat.png").exists());
    assert!(syncer.last_marker().await.is_some());

    assert!(!syncer.ensure_mirror().await.unwrap());
    assert!(!syncer.refresh().await.unwrap());
}

#[tokio::test]
async fn test_existing_mirror_reports_marker_after_restart() {
    if !git_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let upstream = upstream(dir.path());
    syncer_for(dir.path(), &upstream)
        .ensure_mirror()
        .await
        .unwrap();

    let restarted = syncer_for(dir.path(), &upstream);
    assert!(!restarted.ensure_mirror().await.unwrap());
    assert!(restarted.last_marker().await.is_some());
}

#[tokio::test]
async fn test_scheduler_populates_from_fresh_clone() {
    if !git_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let upstream = upstream(dir.path());
    let store = Arc::new(MemoryStore::new());
    let scheduler = SyncScheduler::new(
        Arc::new(syncer_for(dir.path(), &upstream)),
        fast_builder(test_ladder()),
        Arc::clone(&store),
        Duration::from_secs(3600),
    );
    let token = CancellationToken::new();

    let report = scheduler.tick(&token).await;
    assert!(report.changed, "a fresh clone counts as a change");
    assert_eq!(report.committed, 1);
    assert!(store
        .get("cat", Label::Original)
        .await
        .unwrap()
        .is_some());

    let report = scheduler.tick(&token).await;
    assert!(!report.changed);
    assert_eq!(report.committed, 0);
}
