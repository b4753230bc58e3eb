//! Serialized removal of lock entries.
//!
//! Every removal (release, sweep, stale reclamation) first takes an
//! exclusive advisory lock on the entry's `.reclaim` sidecar. Only while it
//! holds that lock may a process compare the entry against the record it
//! expects and delete it. The entry path is therefore never emptied while it
//! holds someone else's record, and a remover that dies mid-way releases the
//! sidecar lock with its process.

use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use fs2::FileExt;
use tracing::debug;

use crate::{atomic, Error, Result};

const SIDECAR_EXTENSION: &str = "reclaim";

/// Outcome of [`remove_if_unchanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Removal {
    Removed,
    /// The entry was gone or held a different record.
    Kept,
    /// Another process is removing this entry right now.
    Busy,
}

impl Removal {
    pub(super) const fn removed(self) -> bool {
        matches!(self, Self::Removed)
    }
}

/// Delete the entry at `path` only if its content is still `expected`.
pub(super) fn remove_if_unchanged(path: &Path, expected: &[u8]) -> Result<Removal> {
    let sidecar_path = sidecar_path(path);
    let sidecar = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&sidecar_path)
        .map_err(|e| Error::io(&sidecar_path, e))?;

    match sidecar.try_lock_exclusive() {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            debug!(path = %path.display(), "Entry is being removed elsewhere");
            return Ok(Removal::Busy);
        }
        Err(e) => return Err(Error::io(&sidecar_path, e)),
    }

    let outcome = remove_while_held(path, expected);
    // Closing the descriptor drops the advisory lock
    drop(sidecar);
    outcome
}

fn remove_while_held(path: &Path, expected: &[u8]) -> Result<Removal> {
    if atomic::read(path)?.as_deref() != Some(expected) {
        return Ok(Removal::Kept);
    }
    match fs::remove_file(path) {
        Ok(()) => Ok(Removal::Removed),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Removal::Kept),
        Err(e) => Err(Error::io(path, e)),
    }
}

fn sidecar_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.{SIDECAR_EXTENSION}"))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write(path: &Path, bytes: &[u8]) -> Result<()> {
        fs::write(path, bytes).map_err(|e| Error::io(path, e))
    }

    #[test]
    fn test_keeps_entry_with_different_content() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let path = dir.path().join("r.lock");
        write(&path, b"fresh")?;

        assert_eq!(remove_if_unchanged(&path, b"stale")?, Removal::Kept);
        assert_eq!(fs::read(&path).map_err(|e| Error::io(&path, e))?, b"fresh");

        assert_eq!(remove_if_unchanged(&path, b"fresh")?, Removal::Removed);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_missing_entry_is_kept() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let path = dir.path().join("gone.lock");

        assert_eq!(remove_if_unchanged(&path, b"anything")?, Removal::Kept);
        Ok(())
    }

    #[test]
    fn test_held_sidecar_blocks_removal() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let path = dir.path().join("r.lock");
        write(&path, b"stale")?;

        let sidecar_path = sidecar_path(&path);
        let other = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&sidecar_path)
            .map_err(|e| Error::io(&sidecar_path, e))?;
        other
            .try_lock_exclusive()
            .map_err(|e| Error::io(&sidecar_path, e))?;

        assert_eq!(remove_if_unchanged(&path, b"stale")?, Removal::Busy);
        assert!(path.exists());

        drop(other);
        assert_eq!(remove_if_unchanged(&path, b"stale")?, Removal::Removed);
        Ok(())
    }

    #[test]
    fn test_sidecar_is_not_a_lock_entry() {
        let sidecar = sidecar_path(Path::new("/w/locks/epic-x.lock"));
        assert_eq!(sidecar, Path::new("/w/locks/epic-x.lock.reclaim"));
        assert_ne!(
            sidecar.extension().and_then(|e| e.to_str()),
            Some(crate::paths::LOCK_EXTENSION)
        );
    }
}
