//! Versioned JSON documents with optimistic concurrency control.
//!
//! A versioned document is a JSON object with an integer `version` field.
//! [`VersionStore::compare_and_update`] only publishes when the stored
//! version still equals the caller's expectation and bumps it by exactly one.
//!
//! The check and the publish are not one indivisible step: two writers can
//! both pass the check before either publishes, and the later publish wins.
//! OCC here detects most lost updates but cannot prevent them. Callers that
//! need exclusion wrap the update in [`crate::lock::LockManager::with_lock`].

use std::{fs, path::Path, time::Duration};

use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::{atomic, config::OccConfig, Error, Result};

pub const VERSION_FIELD: &str = "version";

#[derive(Debug, Clone, Default)]
pub struct VersionStore {
    occ: OccConfig,
}

impl VersionStore {
    pub const fn new(occ: OccConfig) -> Self {
        Self { occ }
    }

    /// Give the document a version if it has none, returning the version.
    ///
    /// A missing document is created as `{"version": 1}`.
    pub fn ensure_version(&self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let initial = serde_json::to_vec_pretty(&serde_json::json!({ VERSION_FIELD: 1 }))
            .map_err(|e| Error::parse("version document", e))?;
        if atomic::create_new(path, &initial)? {
            return Ok(1);
        }

        let mut assigned = None;
        atomic::update(path, |working| {
            let mut doc = read_object(working)?;
            if let Some(version) = version_of(&doc) {
                assigned = Some(version);
                return Ok(());
            }
            set_version(&mut doc, working, 1)?;
            assigned = Some(1);
            write_json(working, &doc)
        })?;
        Ok(assigned.unwrap_or(1))
    }

    /// Stored version, or 0 when the document is missing, not JSON, or has
    /// no usable version field.
    pub fn get_version(&self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        Ok(atomic::read(path)?
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
            .and_then(|doc| version_of(&doc))
            .unwrap_or(0))
    }

    /// Whole document as JSON.
    pub fn read(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let bytes = atomic::read(path)?
            .ok_or_else(|| Error::NotFound(format!("document {}", path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::parse(format!("document {}", path.display()), e))
    }

    /// Whole document decoded as `T`.
    pub fn load<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> Result<T> {
        let path = path.as_ref();
        serde_json::from_value(self.read(path)?)
            .map_err(|e| Error::parse(format!("document {}", path.display()), e))
    }

    /// Apply `mutate` and bump the version, if the version is still `expected`.
    ///
    /// `mutate` works on a private copy; if it fails nothing is published.
    /// Whatever it does to the `version` field is overwritten.
    ///
    /// # Errors
    ///
    /// - [`Error::VersionConflict`] if the stored version moved on
    /// - [`Error::NotFound`] if the document does not exist
    /// - [`Error::Parse`] if it is not a JSON object
    pub fn compare_and_update<F>(
        &self,
        path: impl AsRef<Path>,
        expected: u64,
        mutate: F,
    ) -> Result<u64>
    where
        F: FnOnce(&mut Value) -> Result<()>,
    {
        let path = path.as_ref();
        let next = expected
            .checked_add(1)
            .ok_or_else(|| Error::InvalidInput(format!("version {expected} cannot advance")))?;

        atomic::update(path, |working| {
            let mut doc = read_object(working)?;
            let actual = version_of(&doc).unwrap_or(0);
            if actual != expected {
                return Err(Error::VersionConflict {
                    path: path.to_path_buf(),
                    expected,
                    actual,
                });
            }
            mutate(&mut doc)?;
            set_version(&mut doc, path, next)?;
            write_json(working, &doc)
        })
        .map_err(|e| match e {
            Error::TargetMissing(p) => Error::NotFound(format!("document {}", p.display())),
            other => other,
        })?;

        debug!(path = %path.display(), version = next, "Document updated");
        Ok(next)
    }

    /// [`Self::compare_and_update`] against the freshly read version,
    /// retrying conflicts up to `max_attempts` times with a random
    /// `occ.backoff_min_ms..=occ.backoff_max_ms` pause.
    pub async fn retry_with_backoff<F>(
        &self,
        path: impl AsRef<Path>,
        max_attempts: u32,
        mut mutate: F,
    ) -> Result<u64>
    where
        F: FnMut(&mut Value) -> Result<()>,
    {
        let path = path.as_ref();
        let mut attempt = 1;
        loop {
            let expected = self.get_version(path)?;
            match self.compare_and_update(path, expected, &mut mutate) {
                Err(Error::VersionConflict { actual, .. }) if attempt < max_attempts => {
                    let pause = self.backoff();
                    debug!(
                        path = %path.display(),
                        attempt,
                        expected,
                        actual,
                        pause_ms = pause.as_millis(),
                        "Version conflict, retrying"
                    );
                    tokio::time::sleep(pause).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Random pause between OCC retries.
    pub fn backoff(&self) -> Duration {
        let low = self.occ.backoff_min_ms;
        let high = self.occ.backoff_max_ms.max(low);
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }
}

/// Integer `version` field, also accepting a numeric string.
pub fn version_of(doc: &Value) -> Option<u64> {
    let field = doc.get(VERSION_FIELD)?;
    field
        .as_u64()
        .or_else(|| field.as_str().and_then(|s| s.trim().parse().ok()))
}

fn read_object(path: &Path) -> Result<Value> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let doc: Value = serde_json::from_slice(&bytes)
        .map_err(|e| Error::parse(format!("document {}", path.display()), e))?;
    if doc.is_object() {
        Ok(doc)
    } else {
        Err(Error::parse(
            format!("document {}", path.display()),
            "expected a JSON object",
        ))
    }
}

fn set_version(doc: &mut Value, path: &Path, version: u64) -> Result<()> {
    doc.as_object_mut()
        .map(|map| {
            map.insert(VERSION_FIELD.to_string(), Value::from(version));
        })
        .ok_or_else(|| {
            Error::parse(
                format!("document {}", path.display()),
                "mutation replaced the object",
            )
        })
}

fn write_json(path: &Path, doc: &Value) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(doc)
        .map_err(|e| Error::parse(format!("document {}", path.display()), e))?;
    bytes.push(b'\n');
    fs::write(path, bytes).map_err(|e| Error::write_failure(path, e))
}
