//! Configuration loading from files and environment
//!
//! Files are read as raw TOML tables and layered key by key before being
//! decoded, so a project file that sets only `[lock] lease_secs` keeps every
//! other value from the global file.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use super::types::Config;
use crate::{Error, Result};

/// Load configuration from all sources with hierarchy
///
/// # Errors
///
/// Returns error if:
/// - A config file is malformed TOML
/// - An environment override does not parse
/// - Config values fail validation
pub fn load_config() -> Result<Config> {
    let global = global_config_path();
    let project = project_config_path()?;
    load_config_from(global.as_deref(), &project)
}

/// Load configuration from explicit file locations.
///
/// Missing files are skipped; present ones must parse.
pub fn load_config_from(global: Option<&Path>, project: &Path) -> Result<Config> {
    let mut layered = toml::Table::new();

    for path in global.into_iter().chain(std::iter::once(project)) {
        if path.exists() {
            merge_tables(&mut layered, load_toml_table(path)?);
        }
    }

    let config: Config = toml::Value::Table(layered)
        .try_into()
        .map_err(|e| Error::parse("configuration", e))?;

    let config = config.apply_env_vars()?;
    config.validate()?;
    Ok(config)
}

/// Get path to global config file
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "warden")
        .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
}

/// Get path to project config file
pub fn project_config_path() -> Result<PathBuf> {
    std::env::current_dir()
        .map(|dir| dir.join(".warden").join("config.toml"))
        .map_err(|e| Error::io(".", e))
}

fn load_toml_table(path: &Path) -> Result<toml::Table> {
    if path.is_dir() {
        return Err(Error::InvalidConfig(format!(
            "config path is a directory, not a file: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    content
        .parse::<toml::Table>()
        .map_err(|e| Error::parse(format!("config file {}", path.display()), e))
}

/// Overlay `top` onto `base`; nested tables merge, everything else replaces.
fn merge_tables(base: &mut toml::Table, top: toml::Table) {
    for (key, value) in top {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn env_override<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::InvalidConfig(format!("invalid {name} value '{raw}': {e}"))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Apply `WARDEN_*` environment variable overrides
    pub fn apply_env_vars(mut self) -> Result<Self> {
        if let Some(root) = env_override::<PathBuf>("WARDEN_ROOT")? {
            self.root = root;
        }
        if let Some(v) = env_override("WARDEN_LOCK_LEASE_SECS")? {
            self.lock.lease_secs = v;
        }
        if let Some(v) = env_override("WARDEN_LOCK_TIMEOUT_SECS")? {
            self.lock.timeout_secs = v;
        }
        if let Some(v) = env_override("WARDEN_LOCK_MAX_RETRIES")? {
            self.lock.max_retries = v;
        }
        if let Some(v) = env_override("WARDEN_STALE_THRESHOLD_SECS")? {
            self.registry.stale_threshold_secs = v;
        }
        if let Some(v) = env_override("WARDEN_OCC_MAX_ATTEMPTS")? {
            self.occ.max_attempts = v;
        }
        if let Some(v) = env_override("WARDEN_BUDGET_DEFAULT_LIMIT")? {
            self.budget.default_limit = v;
        }
        if let Ok(command) = std::env::var("WARDEN_BUDGET_SOURCE_COMMAND") {
            self.budget.source_command = Some(command).filter(|c| !c.trim().is_empty());
        }
        Ok(self)
    }
}
