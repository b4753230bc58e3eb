//! Scoped acquisition and the release stack.
//!
//! Every guard pushes its own release action onto a [`ReleaseStack`] and
//! takes it back off when it drops. A signal handler that drains the stack
//! therefore releases exactly the locks still held, however many
//! acquisitions are nested or interleaved.

use std::{
    collections::BTreeMap,
    future::Future,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tracing::{debug, warn};

use super::{operations::release_owned, types::LockHandle, LockManager};
use crate::Result;

type ReleaseAction = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Actions {
    next: u64,
    pending: BTreeMap<u64, ReleaseAction>,
}

/// Shared stack of deferred release actions.
#[derive(Clone, Default)]
pub struct ReleaseStack {
    inner: Arc<Mutex<Actions>>,
}

/// Identifies one pushed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReleaseToken(u64);

impl std::fmt::Debug for ReleaseStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseStack")
            .field("pending", &self.len())
            .finish()
    }
}

impl ReleaseStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, action: impl FnOnce() + Send + 'static) -> ReleaseToken {
        let mut actions = self.actions();
        let token = actions.next;
        actions.next += 1;
        actions.pending.insert(token, Box::new(action));
        ReleaseToken(token)
    }

    /// Remove an action without running it.
    ///
    /// Returns it if it was still pending.
    pub fn take(&self, token: ReleaseToken) -> Option<Box<dyn FnOnce() + Send>> {
        self.actions().pending.remove(&token.0)
    }

    /// Run every pending action, most recent first.
    pub fn run_all(&self) -> usize {
        let drained: Vec<ReleaseAction> = {
            let mut actions = self.actions();
            std::mem::take(&mut actions.pending)
                .into_values()
                .rev()
                .collect()
        };
        let count = drained.len();
        for action in drained {
            action();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.actions().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn actions(&self) -> std::sync::MutexGuard<'_, Actions> {
        // Actions never panic while the mutex is held
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A held lock that releases itself when dropped.
#[derive(Debug)]
pub struct LockGuard {
    handle: LockHandle,
    stack: ReleaseStack,
    token: Option<ReleaseToken>,
}

impl LockGuard {
    pub fn handle(&self) -> &LockHandle {
        &self.handle
    }

    /// Release now, reporting failures instead of logging them.
    pub fn release(mut self) -> Result<bool> {
        match self.token.take().and_then(|token| self.stack.take(token)) {
            Some(_) => release_owned(&self.handle.path, &self.handle.record.holder_id),
            // Already drained by a signal path
            None => Ok(false),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(action) = self.token.take().and_then(|token| self.stack.take(token)) {
            action();
        }
    }
}

fn release_action(path: PathBuf, holder_id: String, resource: String) -> ReleaseAction {
    Box::new(move || match release_owned(&path, &holder_id) {
        Ok(true) => debug!(resource, "Scoped lock released"),
        Ok(false) => {}
        Err(e) => warn!(resource, error = %e, "Failed to release scoped lock"),
    })
}

impl LockManager {
    /// Acquire `resource` and tie its release to the returned guard.
    pub async fn acquire_guard(
        &self,
        resource: &str,
        lease: Duration,
        timeout: Duration,
    ) -> Result<LockGuard> {
        let handle = self.acquire(resource, lease, timeout).await?;
        let token = self.releases.push(release_action(
            handle.path.clone(),
            handle.record.holder_id.clone(),
            resource.to_string(),
        ));
        Ok(LockGuard {
            handle,
            stack: self.releases.clone(),
            token: Some(token),
        })
    }

    /// Run `body` while holding `resource`.
    ///
    /// The lock is released on success, on error, when the returned future
    /// is dropped, and when the manager's release stack is drained. An error
    /// from `body` takes precedence over a release failure.
    pub async fn with_lock<F, Fut, T>(&self, resource: &str, lease: Duration, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let guard = self
            .acquire_guard(resource, lease, self.config.timeout())
            .await?;
        let outcome = body().await;
        let released = guard.release();
        let value = outcome?;
        released?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;

    use super::*;
    use crate::{
        config::LockConfig,
        liveness::ProcessProbe,
        lock::{Holder, LockStatus},
        Error,
    };

    #[derive(Debug)]
    struct AlwaysAlive;

    impl ProcessProbe for AlwaysAlive {
        fn is_alive(&self, _pid: u32) -> Result<bool> {
            Ok(true)
        }
    }

    fn manager(dir: &TempDir) -> LockManager {
        LockManager::new(
            dir.path(),
            LockConfig::default(),
            Arc::new(AlwaysAlive),
            Holder::new("scoped", 1),
        )
    }

    #[test]
    fn test_stack_runs_latest_first_and_only_once() {
        let stack = ReleaseStack::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            stack.push(move || order.lock().unwrap().push(n));
        }
        let middle = ReleaseToken(1);
        assert!(stack.take(middle).is_some());

        assert_eq!(stack.run_all(), 2);
        assert_eq!(stack.run_all(), 0);
        assert_eq!(*order.lock().unwrap(), vec![2, 0]);
    }

    #[test]
    fn test_taking_one_token_leaves_others() {
        let stack = ReleaseStack::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let first = {
            let ran = ran.clone();
            stack.push(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _second = {
            let ran = ran.clone();
            stack.push(move || {
                ran.fetch_add(10, Ordering::SeqCst);
            })
        };

        drop(stack.take(first));
        stack.run_all();

        assert_eq!(ran.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_with_lock_releases_after_error() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let locks = manager(&dir);

        let result: Result<()> = locks
            .with_lock("r", Duration::from_secs(60), || async {
                Err(Error::NotFound("inside".into()))
            })
            .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(locks.status("r")?, LockStatus::Free);
        assert!(locks.release_stack().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_nested_guards_keep_independent_releases() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let locks = manager(&dir);
        let lease = Duration::from_secs(60);
        let timeout = Duration::from_secs(1);

        let outer = locks.acquire_guard("outer", lease, timeout).await?;
        let inner = locks.acquire_guard("inner", lease, timeout).await?;
        assert_eq!(locks.release_stack().len(), 2);

        drop(inner);
        assert_eq!(locks.status("inner")?, LockStatus::Free);
        assert!(matches!(locks.status("outer")?, LockStatus::Held(_)));

        // A drain after the inner guard is gone still releases the outer lock
        assert_eq!(locks.release_stack().run_all(), 1);
        assert_eq!(locks.status("outer")?, LockStatus::Free);

        assert!(!outer.release()?);
        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_future_releases_lock() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let locks = manager(&dir);

        let pending = locks.with_lock("r", Duration::from_secs(60), || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(50), pending).await;

        assert!(timed_out.is_err());
        assert_eq!(locks.status("r")?, LockStatus::Free);
        Ok(())
    }
}
