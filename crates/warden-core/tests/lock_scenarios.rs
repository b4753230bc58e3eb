//! Lock manager scenarios against real processes and real files.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::{
    process::Command,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tempfile::TempDir;
use warden_core::{Error, LockStatus};

#[tokio::test]
async fn killed_holder_is_reclaimed_before_lease_expires() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;

    let mut child = Command::new("sleep").arg("30").spawn()?;
    let doomed = common::lock_manager(dir.path(), "process-p", child.id())?;
    doomed
        .acquire("epic-x", Duration::from_secs(5), Duration::from_secs(1))
        .await?;

    child.kill()?;
    child.wait()?;

    let survivor = common::lock_manager(dir.path(), "process-q", std::process::id())?;
    let started = Instant::now();
    let handle = survivor
        .acquire("epic-x", Duration::from_secs(5), Duration::from_secs(5))
        .await?;

    assert_eq!(handle.record().holder_id, "process-q");
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "reclaim took {:?}",
        started.elapsed()
    );
    Ok(())
}

#[tokio::test]
async fn sweep_reclaims_only_dead_holders() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let mut child = Command::new("true").spawn()?;
    let dead_pid = child.id();
    child.wait()?;

    let ghost = common::lock_manager(dir.path(), "ghost", dead_pid)?;
    ghost
        .acquire("ghost-lock", Duration::from_secs(60), Duration::from_secs(1))
        .await?;
    let live = common::lock_manager(dir.path(), "live", std::process::id())?;
    live.acquire("live-lock", Duration::from_secs(60), Duration::from_secs(1))
        .await?;

    let reclaimed = live.sweep_stale()?;

    assert_eq!(reclaimed, vec!["ghost-lock".to_string()]);
    assert_eq!(live.status("ghost-lock")?, LockStatus::Free);
    assert!(matches!(live.status("live-lock")?, LockStatus::Held(_)));
    Ok(())
}

#[tokio::test]
async fn live_holder_keeps_lock_until_lease_runs_out() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let first = common::lock_manager(dir.path(), "first", std::process::id())?;
    let second = common::lock_manager(dir.path(), "second", std::process::id())?;

    first
        .acquire("build", Duration::from_millis(300), Duration::from_secs(1))
        .await?;

    let blocked = second
        .acquire("build", Duration::from_secs(60), Duration::from_millis(100))
        .await;
    assert!(matches!(blocked, Err(Error::LockTimeout { .. })));

    let handle = second
        .acquire("build", Duration::from_secs(60), Duration::from_secs(5))
        .await?;
    assert_eq!(handle.record().holder_id, "second");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_holders_never_overlap() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let counter = dir.path().join("counter.txt");
    std::fs::write(&counter, "0")?;

    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for n in 0..8 {
        let locks = common::lock_manager(dir.path(), &format!("worker-{n}"), std::process::id())?;
        let counter = counter.clone();
        let inside = inside.clone();
        let max_inside = max_inside.clone();

        tasks.push(tokio::spawn(async move {
            locks
                .with_lock("counter", Duration::from_secs(60), move || async move {
                    let now_inside = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now_inside, Ordering::SeqCst);

                    let value: u32 = std::fs::read_to_string(&counter)
                        .map_err(|e| Error::io(&counter, e))?
                        .trim()
                        .parse()
                        .map_err(|e| Error::parse("counter", e))?;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    std::fs::write(&counter, (value + 1).to_string())
                        .map_err(|e| Error::io(&counter, e))?;

                    inside.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
        }));
    }

    for task in tasks {
        task.await??;
    }

    assert_eq!(std::fs::read_to_string(&counter)?.trim(), "8");
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn drained_release_stack_frees_every_scoped_lock() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let locks = common::lock_manager(dir.path(), "signalled", std::process::id())?;
    let lease = Duration::from_secs(60);
    let timeout = Duration::from_secs(1);

    let first = locks.acquire_guard("one", lease, timeout).await?;
    let second = locks.acquire_guard("two", lease, timeout).await?;

    // What a SIGTERM handler does
    assert_eq!(locks.release_stack().run_all(), 2);

    assert_eq!(locks.list()?.len(), 0);
    drop(second);
    drop(first);
    Ok(())
}
