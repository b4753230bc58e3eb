//! Error types for warden-core
//!
//! Every failure in the coordination layer is returned to the caller as a
//! typed variant. Exit codes follow a fixed scheme:
//!
//! - 1: configuration or usage problems
//! - 2: system errors (IO, missing external tools)
//! - 3: something that should exist does not
//! - 4: contention, ownership or version conflicts

use std::{io, path::PathBuf};

use thiserror::Error;

/// Core error type for coordination operations
#[derive(Debug, Error)]
pub enum Error {
    /// `acquire` ran out of wall-clock time while the lock stayed held
    #[error("timed out after {waited_ms}ms waiting for lock on '{resource}'")]
    LockTimeout { resource: String, waited_ms: u128 },

    /// `acquire` used up its retry budget while the lock stayed held
    #[error("gave up on lock '{resource}' after {attempts} attempts")]
    LockRetriesExhausted { resource: String, attempts: u32 },

    /// Optimistic update lost the race; re-read and retry
    #[error("version conflict on {}: expected {expected}, found {actual}", .path.display())]
    VersionConflict {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Work stream is owned by a different participant
    #[error("work stream '{stream}' is already claimed by {owner}")]
    AlreadyClaimed { stream: String, owner: String },

    /// Requested file pattern overlaps another in-progress stream
    #[error("pattern '{pattern}' conflicts with '{existing}' claimed by stream '{stream}' ({owner})")]
    FileConflict {
        pattern: String,
        existing: String,
        stream: String,
        owner: String,
    },

    /// Caller does not own the lock or stream it tried to release
    #[error("{requester} does not own {subject} (held by {owner})")]
    NotOwner {
        subject: String,
        owner: String,
        requester: String,
    },

    /// Participant, registry or document is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// `update` was asked to modify a path that does not exist
    #[error("cannot update {}: target does not exist", .0.display())]
    TargetMissing(PathBuf),

    /// Preparing or publishing a replacement file failed
    #[error("failed to write {}: {reason}", .path.display())]
    WriteFailure { path: PathBuf, reason: String },

    /// Plain IO failure outside of a write
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Stored content could not be decoded
    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    /// Resource, domain or pattern name is unusable
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is malformed or out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A collaborator this layer cannot work without is unavailable
    #[error("missing dependency: {0}")]
    MissingDependency(String),
}

impl Error {
    /// Create an IO error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a write failure bound to a path.
    pub fn write_failure(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::WriteFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a parse error.
    pub fn parse(what: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same call later can succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::LockTimeout { .. } | Self::LockRetriesExhausted { .. }
        )
    }

    /// Returns the process exit code for this error.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig(_) | Self::InvalidInput(_) | Self::Parse { .. } => 1,
            Self::Io { .. } | Self::WriteFailure { .. } | Self::MissingDependency(_) => 2,
            Self::NotFound(_) | Self::TargetMissing(_) => 3,
            Self::LockTimeout { .. }
            | Self::LockRetriesExhausted { .. }
            | Self::VersionConflict { .. }
            | Self::AlreadyClaimed { .. }
            | Self::FileConflict { .. }
            | Self::NotOwner { .. } => 4,
        }
    }
}

/// Result type alias for warden-core operations
pub type Result<T> = std::result::Result<T, Error>;
