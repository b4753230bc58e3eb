//! Process liveness probing.
//!
//! The lock manager treats a lock whose holder process is gone as
//! reclaimable. A probe that cannot answer is a hard failure: guessing
//! "alive" would stall reclamation and guessing "dead" would break mutual
//! exclusion.

use std::{
    fmt::Debug,
    fs, io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use crate::{Error, Result};

/// Answers whether a process id is currently running on this host.
pub trait ProcessProbe: Send + Sync + Debug {
    fn is_alive(&self, pid: u32) -> Result<bool>;
}

/// Probe backed by the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemProbe {
    /// `/proc/<pid>/stat` exists and does not report a zombie
    Procfs,
    /// `kill -0 <pid>` succeeds while the process does
    Kill(PathBuf),
}

impl SystemProbe {
    /// Pick the best available mechanism.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDependency`] when there is neither a procfs nor
    /// a `kill` binary on `PATH`.
    pub fn detect() -> Result<Self> {
        if Path::new("/proc/self").exists() {
            return Ok(Self::Procfs);
        }

        which::which("kill").map(Self::Kill).map_err(|e| {
            Error::MissingDependency(format!(
                "process liveness needs /proc or a 'kill' binary: {e}"
            ))
        })
    }
}

impl ProcessProbe for SystemProbe {
    fn is_alive(&self, pid: u32) -> Result<bool> {
        if pid == 0 {
            return Ok(false);
        }

        match self {
            Self::Procfs => procfs_alive(pid),
            Self::Kill(kill) => Command::new(kill)
                .arg("-0")
                .arg(pid.to_string())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .map_err(|e| Error::io(kill, e)),
        }
    }
}

// A killed but unreaped process keeps its /proc entry in state Z
fn procfs_alive(pid: u32) -> Result<bool> {
    let stat = Path::new("/proc").join(pid.to_string()).join("stat");
    let line = match fs::read_to_string(&stat) {
        Ok(line) => line,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::io(&stat, e)),
    };

    match process_state(&line) {
        Some('Z' | 'X') => Ok(false),
        Some(_) => Ok(true),
        None => Err(Error::parse(
            stat.display().to_string(),
            "no process state field",
        )),
    }
}

/// State letter of a `/proc/<pid>/stat` line.
///
/// The command name before it is parenthesised and may itself contain
/// spaces or `)`, so the state is read after the last `)`.
fn process_state(line: &str) -> Option<char> {
    line.rsplit_once(')')?.1.trim_start().chars().next()
}
