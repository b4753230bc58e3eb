//! warden-core - filesystem coordination for cooperating processes
//!
//! This crate provides:
//! - Atomic file replacement ([`atomic`])
//! - Named locks with crash and lease reclamation ([`lock`])
//! - Versioned JSON documents with optimistic concurrency ([`version`])
//! - A participant registry with work-stream ownership ([`registry`])
//! - An advisory rate budget ([`budget`])
//!
//! All state lives in plain files under one root directory; there is no
//! daemon. Processes coordinate only through the operations here.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod atomic;
pub mod budget;
pub mod config;
pub mod error;
pub mod ids;
pub mod liveness;
pub mod lock;
pub mod paths;
pub mod registry;
pub mod version;

pub use budget::{BudgetCoordinator, BudgetReading, BudgetSource, CommandBudgetSource, RateBudget};
pub use config::Config;
pub use error::{Error, Result};
pub use ids::{IdGenerator, UuidGenerator};
pub use liveness::{ProcessProbe, SystemProbe};
pub use lock::{Holder, LockGuard, LockHandle, LockManager, LockRecord, LockStatus, ReleaseStack};
pub use registry::{
    Conflict, Participant, ParticipantRegistry, ParticipantStatus, StreamStatus, WorkStream,
};
pub use version::VersionStore;
