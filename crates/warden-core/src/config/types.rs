//! Configuration type definitions
//!
//! Plain data holders. Durations are stored as integers so the TOML stays
//! readable; the accessor methods convert them.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Directory holding locks, registries and the budget document
    pub root: PathBuf,
    pub lock: LockConfig,
    pub registry: RegistryConfig,
    pub occ: OccConfig,
    pub budget: BudgetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LockConfig {
    pub lease_secs: u64,
    pub timeout_secs: u64,
    pub base_delay_ms: u64,
    pub max_backoff_secs: u64,
    pub max_retries: u32,
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    pub stale_threshold_secs: u64,
    /// Compare-and-update attempts per registry mutation
    pub update_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OccConfig {
    pub max_attempts: u32,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BudgetConfig {
    pub default_limit: u64,
    pub low_wait_secs: u64,
    /// Command printing the current budget as JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".warden"),
            lock: LockConfig::default(),
            registry: RegistryConfig::default(),
            occ: OccConfig::default(),
            budget: BudgetConfig::default(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_secs: 300,
            timeout_secs: 60,
            base_delay_ms: 1000,
            max_backoff_secs: 32,
            max_retries: 10,
            jitter_ms: 1000,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stale_threshold_secs: 300,
            update_attempts: 5,
        }
    }
}

impl Default for OccConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_min_ms: 1000,
            backoff_max_ms: 3000,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_limit: 5000,
            low_wait_secs: 60,
            source_command: None,
        }
    }
}

impl LockConfig {
    pub const fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RegistryConfig {
    pub const fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }
}

impl BudgetConfig {
    pub const fn low_wait(&self) -> Duration {
        Duration::from_secs(self.low_wait_secs)
    }
}
