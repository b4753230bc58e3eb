//! warden - command-line front end for warden-core
//!
//! Shell scripts and agents that cannot link the library use this binary
//! to take locks, register as participants, claim work streams, update
//! versioned documents and share a rate budget.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod context;

pub use context::Context;

/// Exit code for a run cut short by SIGINT or SIGTERM.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Map an error to the process exit code.
///
/// Core errors carry their own code; anything else is a usage error.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<warden_core::Error>()
        .map_or(1, warden_core::Error::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_code_survives_context() {
        let err = anyhow::Error::new(warden_core::Error::NotFound("p1".into()))
            .context("Failed to send heartbeat");
        assert_eq!(exit_code(&err), 3);
    }

    #[test]
    fn test_other_errors_are_usage_errors() {
        assert_eq!(exit_code(&anyhow::anyhow!("bad flag")), 1);
    }
}
