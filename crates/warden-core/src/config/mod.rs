//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config: ~/.config/warden/config.toml
//! 3. Project config: .warden/config.toml
//! 4. Environment variables: WARDEN_*
//! 5. CLI flags (command-specific)
//!
//! # Example Config
//!
//! ```toml
//! root = "/shared/team/.warden"
//!
//! [lock]
//! lease_secs = 120
//! timeout_secs = 30
//!
//! [budget]
//! source_command = "gh api rate_limit"
//! ```
//!
//! # Module Structure
//!
//! - `types`: Configuration structures and their defaults
//! - `load`: Loading and layering files and environment
//! - `validate`: Range checks

mod load;
mod types;
mod validate;

pub use load::{global_config_path, load_config, load_config_from, project_config_path};
pub use types::{BudgetConfig, Config, LockConfig, OccConfig, RegistryConfig};
