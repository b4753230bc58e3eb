//! Shared fixtures for warden-core integration tests
//!
//! Integration tests need relaxed clippy settings for scenario setup.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

use std::{path::Path, sync::Arc};

use warden_core::{
    config::{LockConfig, OccConfig, RegistryConfig},
    Holder, LockManager, ParticipantRegistry, Result, SystemProbe, UuidGenerator,
};

/// Lock settings scaled down so contention resolves in milliseconds.
pub fn fast_lock_config() -> LockConfig {
    LockConfig {
        lease_secs: 60,
        timeout_secs: 10,
        base_delay_ms: 2,
        max_backoff_secs: 1,
        max_retries: 10_000,
        jitter_ms: 3,
    }
}

pub fn fast_occ() -> OccConfig {
    OccConfig {
        max_attempts: 50,
        backoff_min_ms: 1,
        backoff_max_ms: 4,
    }
}

pub fn lock_manager(root: &Path, holder_id: &str, pid: u32) -> Result<LockManager> {
    Ok(LockManager::new(
        root,
        fast_lock_config(),
        Arc::new(SystemProbe::detect()?),
        Holder::new(holder_id, pid).with_operation("integration"),
    ))
}

pub fn registry(root: &Path) -> Result<ParticipantRegistry> {
    Ok(ParticipantRegistry::new(
        root,
        RegistryConfig {
            stale_threshold_secs: 300,
            update_attempts: 50,
        },
        fast_occ(),
        fast_lock_config(),
        Arc::new(SystemProbe::detect()?),
        Arc::new(UuidGenerator),
    ))
}
