//! Participant registry and work-stream ownership.
//!
//! One versioned JSON document per coordination domain holds the
//! participants and their work streams. Every mutation holds the domain's
//! lock under `<root>/registry/locks/` for its whole read-modify-publish, so
//! writers going through this API are serialized. The publish itself is
//! still a compare-and-update that bumps the version, which lets readers and
//! writers outside the lock detect the change. Writers that bypass the API
//! can still corrupt the document.
//!
//! Liveness here is heartbeat-only: `stale` means "has not reported in",
//! not "process is dead".

mod participants;
pub mod patterns;
mod streams;
pub mod types;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info};

pub use patterns::patterns_conflict;
pub use types::{Conflict, Participant, ParticipantStatus, Registry, StreamStatus, WorkStream};

use crate::{
    atomic,
    config::{LockConfig, OccConfig, RegistryConfig},
    ids::IdGenerator,
    liveness::ProcessProbe,
    lock::{Holder, LockManager},
    paths,
    version::{version_of, VersionStore},
    Error, Result,
};

#[derive(Debug, Clone)]
pub struct ParticipantRegistry {
    root: PathBuf,
    config: RegistryConfig,
    versions: VersionStore,
    locking: LockConfig,
    probe: Arc<dyn ProcessProbe>,
    ids: Arc<dyn IdGenerator>,
}

impl ParticipantRegistry {
    pub fn new(
        root: impl Into<PathBuf>,
        config: RegistryConfig,
        occ: OccConfig,
        locking: LockConfig,
        probe: Arc<dyn ProcessProbe>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            root: root.into(),
            config,
            versions: VersionStore::new(occ),
            locking,
            probe,
            ids,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_path(&self, domain: &str) -> Result<PathBuf> {
        paths::registry_path(&self.root, domain)
    }

    /// Current registry for `domain`, or `None` if nobody registered yet.
    pub fn snapshot(&self, domain: &str) -> Result<Option<Registry>> {
        let path = self.document_path(domain)?;
        if !path.exists() {
            return Ok(None);
        }
        self.versions.load(&path).map(Some)
    }

    /// Create the domain's document if missing.
    fn ensure(&self, domain: &str) -> Result<PathBuf> {
        let path = self.document_path(domain)?;
        let bytes = serde_json::to_vec_pretty(&Registry::new(domain))
            .map_err(|e| Error::parse("registry", e))?;
        if atomic::create_new(&path, &bytes)? {
            info!(domain, "Registry created");
        }
        Ok(path)
    }

    /// Read, modify and publish the domain's registry while holding its lock.
    ///
    /// `change` may still run several times when a writer outside the lock
    /// bumps the version; it must derive everything from the registry it is
    /// given.
    async fn mutate<F, R>(&self, domain: &str, change: F) -> Result<R>
    where
        F: FnMut(&mut Registry) -> Result<R>,
    {
        let path = self.document_path(domain)?;
        // A fresh holder id per call keeps concurrent tasks of one process apart
        let holder = Holder::current(format!("registry-{}", uuid::Uuid::new_v4()))
            .with_operation(format!("update registry '{domain}'"));
        let locks = LockManager::new(
            self.root.join("registry"),
            self.locking.clone(),
            self.probe.clone(),
            holder,
        );

        locks
            .with_lock(domain, self.locking.lease(), || self.publish(domain, &path, change))
            .await
    }

    async fn publish<F, R>(&self, domain: &str, path: &Path, mut change: F) -> Result<R>
    where
        F: FnMut(&mut Registry) -> Result<R>,
    {
        let mut attempt = 1;
        loop {
            let doc = self.versions.read(path).map_err(|e| match e {
                Error::NotFound(_) => Error::NotFound(format!("registry for domain '{domain}'")),
                other => other,
            })?;
            let expected = version_of(&doc).unwrap_or(0);
            let mut registry: Registry = serde_json::from_value(doc)
                .map_err(|e| Error::parse(format!("registry {}", path.display()), e))?;

            let outcome = change(&mut registry)?;
            let replacement = serde_json::to_value(&registry)
                .map_err(|e| Error::parse("registry", e))?;

            match self
                .versions
                .compare_and_update(path, expected, |doc| {
                    *doc = replacement;
                    Ok(())
                }) {
                Ok(_) => return Ok(outcome),
                Err(Error::VersionConflict { .. }) if attempt < self.config.update_attempts => {
                    let pause = self.versions.backoff();
                    debug!(domain, attempt, "Registry changed underneath, retrying");
                    tokio::time::sleep(pause).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
