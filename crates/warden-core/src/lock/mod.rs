//! Named locks shared between processes.
//!
//! Each lock is one file under `<root>/locks/`, created with an atomic
//! create-if-absent and never modified afterwards. Ownership changes are
//! always create or delete.
//!
//! # Guarantees
//!
//! - **Mutual exclusion**: at most one live, unexpired entry per resource
//! - **Crash reclamation**: an entry whose holder process is gone is removed
//!   by the next contender without waiting for the lease
//! - **Lease expiry**: an entry past its `expires_at` is reclaimable even if
//!   the holder still runs
//! - **Serialized removal**: deleting an entry requires an advisory lock on
//!   its `.reclaim` sidecar, so racing reclaimers cannot remove a successor's
//!   fresh entry
//! - **Scoped release**: [`LockManager::with_lock`] and [`LockGuard`] release
//!   on every exit path, and each acquisition registers its own action on a
//!   shared [`ReleaseStack`] that a signal handler can drain
//!
//! # Example
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use warden_core::{
//!     config::LockConfig,
//!     liveness::SystemProbe,
//!     lock::{Holder, LockManager},
//! };
//!
//! # async fn demo() -> warden_core::Result<()> {
//! let manager = LockManager::new(
//!     ".warden",
//!     LockConfig::default(),
//!     Arc::new(SystemProbe::detect()?),
//!     Holder::current("agent-7").with_operation("sync"),
//! );
//!
//! manager
//!     .with_lock("epic-x", Duration::from_secs(300), || async {
//!         // exclusive section
//!         Ok(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod operations;
mod queries;
mod reclaim;
mod scope;
pub mod types;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

pub use scope::{LockGuard, ReleaseStack, ReleaseToken};
pub use types::{Holder, LockHandle, LockRecord, LockStatus};

use crate::{config::LockConfig, liveness::ProcessProbe};

/// Acquires and releases locks on behalf of one [`Holder`].
#[derive(Debug, Clone)]
pub struct LockManager {
    root: PathBuf,
    config: LockConfig,
    probe: Arc<dyn ProcessProbe>,
    holder: Holder,
    releases: ReleaseStack,
}

impl LockManager {
    pub fn new(
        root: impl Into<PathBuf>,
        config: LockConfig,
        probe: Arc<dyn ProcessProbe>,
        holder: Holder,
    ) -> Self {
        Self {
            root: root.into(),
            config,
            probe,
            holder,
            releases: ReleaseStack::new(),
        }
    }

    /// Share an existing release stack instead of a private one.
    pub fn with_release_stack(mut self, releases: ReleaseStack) -> Self {
        self.releases = releases;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub const fn holder(&self) -> &Holder {
        &self.holder
    }

    pub const fn config(&self) -> &LockConfig {
        &self.config
    }

    /// The stack every guard from this manager registers on.
    pub fn release_stack(&self) -> ReleaseStack {
        self.releases.clone()
    }
}
