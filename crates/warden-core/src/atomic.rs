//! Atomic file replacement.
//!
//! Every write in this crate goes through here. Content is prepared in a
//! temporary file created next to the target and published with a single
//! rename, so a reader sees either the complete old file or the complete new
//! one. The temporary file is owned by a [`NamedTempFile`] guard and is removed
//! on every exit path that does not publish it.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::{Error, Result};

/// Mode applied to files this module creates from scratch.
#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o644;

/// Replace `path` with `bytes`.
///
/// Creates the file (and its parent directory) if missing. Permission bits of
/// an existing target carry over to the replacement.
pub fn write(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let mut temp = temp_beside(path)?;
    fill(&mut temp, path, bytes)?;
    carry_permissions(path, &temp)?;
    publish(temp, path)
}

/// Append `bytes` to `path`, creating it if missing.
///
/// The existing content is copied into the temporary file first, so the
/// append is published as one replacement rather than written in place.
pub fn append(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let existing = read(path)?.unwrap_or_default();
    let mut temp = temp_beside(path)?;
    fill(&mut temp, path, &existing)?;
    fill(&mut temp, path, bytes)?;
    carry_permissions(path, &temp)?;
    publish(temp, path)
}

/// Modify an existing file through a private working copy.
///
/// `mutate` receives the path of a temporary copy of the target and may
/// rewrite it freely. If it returns an error the target is left untouched and
/// the copy is discarded.
///
/// # Errors
///
/// Returns [`Error::TargetMissing`] if `path` does not exist; this primitive
/// updates, it does not create.
pub fn update<F>(path: impl AsRef<Path>, mutate: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::TargetMissing(path.to_path_buf()));
    }

    let temp = temp_beside(path)?;
    // fs::copy carries the permission bits along with the content
    fs::copy(path, temp.path()).map_err(|e| Error::write_failure(path, e))?;

    mutate(temp.path())?;

    publish(temp, path)
}

/// Create `path` with `bytes` only if nothing exists there yet.
///
/// Returns `false` without touching anything when the path is taken. The new
/// file appears fully written; no reader can observe it empty.
pub fn create_new(path: impl AsRef<Path>, bytes: &[u8]) -> Result<bool> {
    let path = path.as_ref();
    let mut temp = temp_beside(path)?;
    fill(&mut temp, path, bytes)?;
    set_new_file_mode(&temp)?;

    match temp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(Error::write_failure(path, e.error)),
    }
}

/// Read a whole file, mapping absence to `None`.
pub fn read(path: impl AsRef<Path>) -> Result<Option<Vec<u8>>> {
    let path = path.as_ref();
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn temp_beside(path: &Path) -> Result<NamedTempFile> {
    let dir = parent_dir(path);
    fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

    let prefix = path
        .file_name()
        .map(|name| format!(".{}.", name.to_string_lossy()))
        .unwrap_or_else(|| ".warden.".to_string());

    tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(|e| Error::write_failure(path, format!("creating temp file: {e}")))
}

fn fill(temp: &mut NamedTempFile, path: &Path, bytes: &[u8]) -> Result<()> {
    temp.write_all(bytes)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| Error::write_failure(path, e))
}

fn carry_permissions(path: &Path, temp: &NamedTempFile) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) => fs::set_permissions(temp.path(), meta.permissions())
            .map_err(|e| Error::write_failure(path, format!("copying permissions: {e}"))),
        Err(_) => set_new_file_mode(temp),
    }
}

#[cfg(unix)]
fn set_new_file_mode(temp: &NamedTempFile) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(temp.path(), fs::Permissions::from_mode(NEW_FILE_MODE))
        .map_err(|e| Error::write_failure(temp.path(), format!("setting mode: {e}")))
}

#[cfg(not(unix))]
fn set_new_file_mode(_temp: &NamedTempFile) -> Result<()> {
    Ok(())
}

fn publish(temp: NamedTempFile, path: &Path) -> Result<()> {
    temp.persist(path)
        .map(|_| ())
        .map_err(|e| Error::write_failure(path, e.error))
}
