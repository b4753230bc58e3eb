//! Lock acquisition, release and stale-entry reclamation.

use std::{
    path::Path,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use super::{
    queries::{backoff_delay, parse_record},
    reclaim::{remove_if_unchanged, Removal},
    types::{Contention, LockHandle, LockRecord},
    LockManager,
};
use crate::{atomic, paths, Error, Result};

impl LockManager {
    /// Acquire `resource`, waiting up to `timeout` while a live holder has it.
    ///
    /// Entries left by dead holders or past their lease are reclaimed and
    /// retried immediately. Otherwise the call backs off exponentially with
    /// jitter until `timeout` elapses or `lock.max_retries` backoffs have been
    /// spent, whichever comes first.
    ///
    /// Not reentrant: a holder asking again for a lock it already has waits
    /// like any other contender.
    ///
    /// # Errors
    ///
    /// - [`Error::LockTimeout`] when `timeout` elapses
    /// - [`Error::LockRetriesExhausted`] when the retry budget runs out
    /// - IO, parse and liveness errors from inspecting the existing entry
    pub async fn acquire(
        &self,
        resource: &str,
        lease: Duration,
        timeout: Duration,
    ) -> Result<LockHandle> {
        let path = paths::lock_path(&self.root, resource)?;
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            let record = LockRecord::new(resource, &self.holder, lease);
            let bytes = serde_json::to_vec_pretty(&record)
                .map_err(|e| Error::parse("lock record", e))?;

            if atomic::create_new(&path, &bytes)? {
                info!(resource, holder = %self.holder.id, attempt, "Lock acquired");
                return Ok(LockHandle { record, path });
            }

            match self.inspect(&path, lease)? {
                Contention::Vanished => {}
                Contention::Dead(stale) => {
                    let reason = "holder process is gone";
                    self.reclaim(resource, &path, &stale, reason, started, timeout)
                        .await?;
                }
                Contention::Expired(stale) => {
                    let reason = "lease expired";
                    self.reclaim(resource, &path, &stale, reason, started, timeout)
                        .await?;
                }
                Contention::Live(current) => {
                    if attempt >= self.config.max_retries {
                        return Err(Error::LockRetriesExhausted {
                            resource: resource.to_string(),
                            attempts: attempt.saturating_add(1),
                        });
                    }

                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(Error::LockTimeout {
                            resource: resource.to_string(),
                            waited_ms: waited.as_millis(),
                        });
                    }

                    let delay = backoff_delay(&self.config, attempt).min(timeout - waited);
                    debug!(
                        resource,
                        holder = %current.holder_id,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Lock held, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Remove a stale entry seen by [`Self::acquire`].
    ///
    /// When another contender is already removing it, yields once so the
    /// caller re-inspects, failing only once `timeout` has elapsed.
    async fn reclaim(
        &self,
        resource: &str,
        path: &Path,
        stale: &[u8],
        reason: &str,
        started: Instant,
        timeout: Duration,
    ) -> Result<()> {
        match remove_if_unchanged(path, stale)? {
            Removal::Removed => {
                warn!(resource, reason, "Reclaimed stale lock");
                Ok(())
            }
            Removal::Kept => Ok(()),
            Removal::Busy => {
                let waited = started.elapsed();
                if waited >= timeout {
                    return Err(Error::LockTimeout {
                        resource: resource.to_string(),
                        waited_ms: waited.as_millis(),
                    });
                }
                tokio::task::yield_now().await;
                Ok(())
            }
        }
    }

    /// [`Self::acquire`] with the configured lease and timeout.
    pub async fn acquire_default(&self, resource: &str) -> Result<LockHandle> {
        self.acquire(resource, self.config.lease(), self.config.timeout())
            .await
    }

    /// Release `resource`.
    ///
    /// Returns `false` when there was nothing to remove. A lock held by a
    /// different holder id is refused with [`Error::NotOwner`] unless `force`
    /// is set, in which case it is removed with a warning.
    pub fn release(&self, resource: &str, force: bool) -> Result<bool> {
        let path = paths::lock_path(&self.root, resource)?;
        let Some(bytes) = atomic::read(&path)? else {
            debug!(resource, "Lock already free");
            return Ok(false);
        };

        match parse_record(&path, &bytes) {
            Ok(record) if record.holder_id == self.holder.id => {}
            Ok(record) if force => {
                warn!(
                    resource,
                    owner = %record.holder_id,
                    requester = %self.holder.id,
                    "Force-releasing lock held by another holder"
                );
            }
            Ok(record) => {
                return Err(Error::NotOwner {
                    subject: format!("lock '{resource}'"),
                    owner: record.holder_id,
                    requester: self.holder.id.clone(),
                });
            }
            Err(e) if force => {
                warn!(resource, error = %e, "Force-releasing unreadable lock entry");
            }
            Err(e) => return Err(e),
        }

        let removed = remove_if_unchanged(&path, &bytes)?.removed();
        if removed {
            info!(resource, holder = %self.holder.id, "Lock released");
        }
        Ok(removed)
    }

    /// Remove every entry whose holder process is gone.
    ///
    /// Returns the reclaimed resource names. Expired entries with live
    /// holders are left for contenders to reclaim.
    pub fn sweep_stale(&self) -> Result<Vec<String>> {
        let mut reclaimed = Vec::new();

        for (path, bytes) in self.entries()? {
            let Ok(record) = parse_record(&path, &bytes) else {
                continue;
            };
            if self.probe.is_alive(record.holder_pid)? {
                continue;
            }
            if remove_if_unchanged(&path, &bytes)?.removed() {
                info!(
                    resource = %record.resource,
                    pid = record.holder_pid,
                    "Reclaimed lock from dead holder"
                );
                reclaimed.push(record.resource);
            }
        }

        Ok(reclaimed)
    }
}

/// Remove the entry at `path` if it is still held by `holder_id`.
pub(super) fn release_owned(path: &Path, holder_id: &str) -> Result<bool> {
    let Some(bytes) = atomic::read(path)? else {
        return Ok(false);
    };
    let record = parse_record(path, &bytes)?;
    if record.holder_id != holder_id {
        warn!(
            resource = %record.resource,
            owner = %record.holder_id,
            "Lock changed hands before scoped release, leaving it"
        );
        return Ok(false);
    }
    Ok(remove_if_unchanged(path, &bytes)?.removed())
}
