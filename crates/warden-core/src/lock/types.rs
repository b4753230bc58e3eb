//! Type definitions for the lock manager.

use std::{path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who is taking locks through a [`super::LockManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holder {
    /// Compared on release to decide ownership
    pub id: String,
    /// Probed for liveness by contenders
    pub pid: u32,
    /// Free-form label stored with each lock for diagnostics
    pub operation: String,
}

impl Holder {
    pub fn new(id: impl Into<String>, pid: u32) -> Self {
        Self {
            id: id.into(),
            pid,
            operation: String::new(),
        }
    }

    /// This process, under the given holder id.
    pub fn current(id: impl Into<String>) -> Self {
        Self::new(id, std::process::id())
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }
}

/// Content of a lock entry. Written once at creation, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub resource: String,
    pub holder_id: String,
    pub holder_pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub operation: String,
}

impl LockRecord {
    pub fn new(resource: &str, holder: &Holder, lease: Duration) -> Self {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::MAX);
        Self {
            resource: resource.to_string(),
            holder_id: holder.id.clone(),
            holder_pid: holder.pid,
            acquired_at: now,
            expires_at: now.checked_add_signed(lease).unwrap_or(DateTime::<Utc>::MAX_UTC),
            operation: holder.operation.clone(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Read-only view of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LockStatus {
    Free,
    Held(LockRecord),
}

/// Proof of a successful acquire.
///
/// Plain data: dropping it does not release anything. Use
/// [`super::LockManager::acquire_guard`] or [`super::LockManager::with_lock`]
/// for scoped release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub(super) record: LockRecord,
    pub(super) path: PathBuf,
}

impl LockHandle {
    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    pub fn resource(&self) -> &str {
        &self.record.resource
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

/// What a contender found when its create-if-absent failed.
#[derive(Debug)]
pub(super) enum Contention {
    /// Entry disappeared before it could be read
    Vanished,
    /// Holder process is gone
    Dead(Vec<u8>),
    /// Lease ran out
    Expired(Vec<u8>),
    /// Holder is alive and within its lease
    Live(LockRecord),
}
