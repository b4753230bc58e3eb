//! Read-only lock operations and pure helpers.

use std::{
    path::Path,
    time::{Duration, SystemTime},
};

use chrono::Utc;
use rand::Rng;
use tracing::warn;

use super::{
    types::{Contention, LockRecord, LockStatus},
    LockManager,
};
use crate::{atomic, config::LockConfig, paths, Error, Result};

impl LockManager {
    /// Current state of one resource.
    pub fn status(&self, resource: &str) -> Result<LockStatus> {
        let path = paths::lock_path(&self.root, resource)?;
        match atomic::read(&path)? {
            None => Ok(LockStatus::Free),
            Some(bytes) => parse_record(&path, &bytes).map(LockStatus::Held),
        }
    }

    /// Every lock entry currently on disk, sorted by resource.
    ///
    /// Entries that fail to parse are skipped with a warning.
    pub fn list(&self) -> Result<Vec<LockRecord>> {
        let mut records: Vec<LockRecord> = self
            .entries()?
            .into_iter()
            .filter_map(|(path, bytes)| {
                parse_record(&path, &bytes)
                    .map_err(|e| {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable lock entry");
                    })
                    .ok()
            })
            .collect();
        records.sort_by(|a, b| a.resource.cmp(&b.resource));
        Ok(records)
    }

    /// Raw `(path, content)` of every lock entry.
    pub(super) fn entries(&self) -> Result<Vec<(std::path::PathBuf, Vec<u8>)>> {
        let dir = paths::locks_dir(&self.root);
        let read_dir = match std::fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&dir, e)),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let path = entry.map_err(|e| Error::io(&dir, e))?.path();
            let is_lock = path
                .extension()
                .is_some_and(|ext| ext == paths::LOCK_EXTENSION);
            if !is_lock {
                continue;
            }
            // Released between listing and reading
            if let Some(bytes) = atomic::read(&path)? {
                entries.push((path, bytes));
            }
        }
        Ok(entries)
    }

    /// Classify an existing entry for a contender with the given lease.
    pub(super) fn inspect(&self, path: &Path, lease: Duration) -> Result<Contention> {
        let Some(bytes) = atomic::read(path)? else {
            return Ok(Contention::Vanished);
        };

        match parse_record(path, &bytes) {
            Ok(record) => {
                if !self.probe.is_alive(record.holder_pid)? {
                    Ok(Contention::Dead(bytes))
                } else if record.is_expired_at(Utc::now()) {
                    Ok(Contention::Expired(bytes))
                } else {
                    Ok(Contention::Live(record))
                }
            }
            Err(e) => {
                // No trustworthy record; fall back to file age against our own lease
                let age = std::fs::metadata(path)
                    .and_then(|meta| meta.modified())
                    .map(|modified| {
                        SystemTime::now()
                            .duration_since(modified)
                            .unwrap_or_default()
                    })
                    .map_err(|io| Error::io(path, io))?;
                if age > lease {
                    Ok(Contention::Expired(bytes))
                } else {
                    Err(e)
                }
            }
        }
    }
}

pub(super) fn parse_record(path: &Path, bytes: &[u8]) -> Result<LockRecord> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::parse(format!("lock entry {}", path.display()), e))
}

/// Delay before retry `attempt` (zero based): `min(max, base * 2^attempt)`
/// plus up to `jitter_ms` of random jitter.
pub(super) fn backoff_delay(config: &LockConfig, attempt: u32) -> Duration {
    let exponential = 2u64
        .checked_pow(attempt)
        .and_then(|factor| config.base_delay_ms.checked_mul(factor))
        .unwrap_or(u64::MAX);
    let capped = exponential.min(config.max_backoff_secs.saturating_mul(1000));
    let jitter = if config.jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=config.jitter_ms)
    };
    Duration::from_millis(capped.saturating_add(jitter))
}
