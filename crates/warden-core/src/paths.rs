//! On-disk layout under the coordination root.
//!
//! ```text
//! <root>/locks/<resource>.lock
//! <root>/registry/<domain>.json
//! <root>/budget.json
//! ```

use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub const LOCK_EXTENSION: &str = "lock";

const MAX_STEM_LEN: usize = 200;

pub fn locks_dir(root: &Path) -> PathBuf {
    root.join("locks")
}

pub fn lock_path(root: &Path, resource: &str) -> Result<PathBuf> {
    let name = file_stem(resource)?;
    Ok(locks_dir(root).join(format!("{name}.{LOCK_EXTENSION}")))
}

pub fn registry_path(root: &Path, domain: &str) -> Result<PathBuf> {
    let name = file_stem(domain)?;
    Ok(root.join("registry").join(format!("{name}.json")))
}

pub fn budget_path(root: &Path) -> PathBuf {
    root.join("budget.json")
}

/// Map a caller-supplied name onto a single safe path component.
///
/// Bytes outside `[A-Za-z0-9._~-]` are percent-encoded, `%` included, so
/// distinct names always get distinct entries.
pub fn file_stem(name: &str) -> Result<String> {
    if name.trim().is_empty() || name.chars().all(|c| c == '.') {
        return Err(Error::InvalidInput(format!("unusable name '{name}'")));
    }

    let stem = urlencoding::encode(name).into_owned();
    if stem.len() > MAX_STEM_LEN {
        return Err(Error::InvalidInput(format!(
            "name '{name}' is too long for a file name"
        )));
    }
    Ok(stem)
}
