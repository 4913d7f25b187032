// ABOUTME: Integration tests for deploy lock functionality.
// ABOUTME: Tests acquisition, holder info, force unlock, and racing acquirers on a local target.

mod support;

use stagehand::deploy::{DeployErrorKind, LockManager, SiteLayout};
use stagehand::types::SiteName;

/// Test: Lock acquired prevents a second acquisition.
#[tokio::test]
async fn lock_acquired_prevents_second_acquisition() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let runner = support::local_runner();
    let layout = SiteLayout::new(dir.path().to_str().unwrap());
    let site = SiteName::new("app.example.com").unwrap();
    let locks = LockManager::new(&runner, &layout, &site);

    let lock = locks.acquire().await.expect("first lock should succeed");
    assert!(dir.path().join(".deploy.lock").exists());

    let err = locks.acquire().await.expect_err("second lock should fail");
    assert_eq!(err.kind(), DeployErrorKind::AlreadyLocked);

    let info = err.lock_holder_info().expect("should have lock holder info");
    assert_eq!(info.site, "app.example.com");
    assert_eq!(info.pid, std::process::id());
    assert!(!info.holder.is_empty(), "holder should be set");

    lock.release().await.expect("release should succeed");
    assert!(!dir.path().join(".deploy.lock").exists());

    let lock = locks
        .acquire()
        .await
        .expect("lock should succeed after release");
    lock.release().await.expect("cleanup release");
}

/// Test: A foreign, unparseable marker still counts as held.
#[tokio::test]
async fn unreadable_marker_is_still_a_lock() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".deploy.lock"), "not json").unwrap();

    let runner = support::local_runner();
    let layout = SiteLayout::new(dir.path().to_str().unwrap());
    let site = SiteName::new("app").unwrap();
    let locks = LockManager::new(&runner, &layout, &site);

    let err = locks.acquire().await.expect_err("marker should block");
    assert_eq!(err.kind(), DeployErrorKind::AlreadyLocked);
    assert!(err.lock_holder_info().is_none());
    assert_eq!(
        std::fs::read_to_string(dir.path().join(".deploy.lock")).unwrap(),
        "not json"
    );
}

/// Test: Acquire creates a missing deploy_path.
#[tokio::test]
async fn acquire_creates_deploy_path() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("srv").join("app");

    let runner = support::local_runner();
    let layout = SiteLayout::new(root.to_str().unwrap());
    let site = SiteName::new("app").unwrap();

    let lock = LockManager::new(&runner, &layout, &site)
        .acquire()
        .await
        .unwrap();
    assert!(root.join(".deploy.lock").is_file());
    lock.release().await.unwrap();
}

/// Test: Force unlock reports whether a marker was removed.
#[tokio::test]
async fn force_unlock_removes_marker() {
    let dir = tempfile::tempdir().unwrap();
    let runner = support::local_runner();
    let layout = SiteLayout::new(dir.path().to_str().unwrap());
    let site = SiteName::new("app").unwrap();
    let locks = LockManager::new(&runner, &layout, &site);

    assert!(!locks.force_unlock().await.unwrap(), "nothing to unlock yet");

    let lock = locks.acquire().await.unwrap();
    // Simulate a crashed run: the marker stays behind.
    std::mem::forget(lock);

    assert!(locks.is_locked().await.unwrap());
    assert!(locks.force_unlock().await.unwrap());
    assert!(!locks.is_locked().await.unwrap());

    let lock = locks.acquire().await.expect("lock should be free again");
    lock.release().await.unwrap();
}

/// Test: Of several racing acquirers exactly one wins.
#[tokio::test]
async fn racing_acquirers_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let runner = support::local_runner();
    let layout = SiteLayout::new(dir.path().to_str().unwrap());
    let site = SiteName::new("app").unwrap();

    let attempts = (0..8).map(|_| {
        let runner = &runner;
        let layout = &layout;
        let site = &site;
        async move { LockManager::new(runner, layout, site).acquire().await }
    });
    let results = futures::future::join_all(attempts).await;

    let mut winners = Vec::new();
    for result in results {
        match result {
            Ok(lock) => winners.push(lock),
            Err(e) => assert_eq!(e.kind(), DeployErrorKind::AlreadyLocked),
        }
    }
    assert_eq!(winners.len(), 1, "exactly one acquirer should win");

    for lock in winners {
        lock.release().await.unwrap();
    }
}
