//! Everything a command needs: resolved config, output mode and the
//! process-wide release stack.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result};
use warden_core::{
    config::load_config, BudgetCoordinator, Config, Holder, LockManager, ParticipantRegistry,
    ReleaseStack, SystemProbe, UuidGenerator, VersionStore,
};

pub const PARTICIPANT_ENV: &str = "WARDEN_PARTICIPANT_ID";
pub const HOLDER_ENV: &str = "WARDEN_HOLDER_ID";

#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub json: bool,
    pub releases: ReleaseStack,
}

impl Context {
    /// Load layered config and apply the `--root` override.
    pub fn load(root: Option<PathBuf>, json: bool, releases: ReleaseStack) -> Result<Self> {
        let mut config = load_config().context("Failed to load configuration")?;
        if let Some(root) = root {
            config.root = root;
        }
        Ok(Self::with_config(config, json, releases))
    }

    pub const fn with_config(config: Config, json: bool, releases: ReleaseStack) -> Self {
        Self {
            config,
            json,
            releases,
        }
    }

    pub fn lock_manager(&self, holder: Holder) -> Result<LockManager> {
        let probe = SystemProbe::detect()?;
        Ok(LockManager::new(
            self.config.root.clone(),
            self.config.lock.clone(),
            Arc::new(probe),
            holder,
        )
        .with_release_stack(self.releases.clone()))
    }

    pub fn registry(&self) -> Result<ParticipantRegistry> {
        let probe = SystemProbe::detect()?;
        Ok(ParticipantRegistry::new(
            self.config.root.clone(),
            self.config.registry.clone(),
            self.config.occ.clone(),
            self.config.lock.clone(),
            Arc::new(probe),
            Arc::new(UuidGenerator),
        ))
    }

    pub fn versions(&self) -> VersionStore {
        VersionStore::new(self.config.occ.clone())
    }

    pub fn budget(&self) -> BudgetCoordinator {
        BudgetCoordinator::from_config(&self.config.root, &self.config.budget)
    }
}

/// Participant id from `--id` or the environment.
pub fn participant_id(explicit: Option<&String>) -> Result<String> {
    explicit
        .cloned()
        .or_else(|| std::env::var(PARTICIPANT_ENV).ok())
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("No participant id: pass --id or set {PARTICIPANT_ENV}"))
}

/// Holder identity for lock commands run from a shell.
///
/// Defaults to the parent process so that `acquire` and a later `release`
/// from the same shell agree on the holder, and the lock dies with the shell.
pub fn shell_holder(explicit_id: Option<&String>, explicit_pid: Option<u32>) -> Holder {
    let pid = explicit_pid.unwrap_or_else(parent_pid);
    let id = explicit_id
        .cloned()
        .or_else(|| std::env::var(HOLDER_ENV).ok())
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("pid-{pid}"));
    Holder::new(id, pid)
}

#[cfg(unix)]
fn parent_pid() -> u32 {
    std::os::unix::process::parent_id()
}

#[cfg(not(unix))]
fn parent_pid() -> u32 {
    std::process::id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_holder_wins() {
        let holder = shell_holder(Some(&"ci-42".to_string()), Some(7));
        assert_eq!(holder.id, "ci-42");
        assert_eq!(holder.pid, 7);
    }

    #[test]
    fn test_explicit_participant_wins() -> Result<()> {
        assert_eq!(participant_id(Some(&"p-1".to_string()))?, "p-1");
        Ok(())
    }
}
