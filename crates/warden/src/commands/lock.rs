//! Lock commands

use std::{process::Stdio, time::Duration};

use anyhow::{Context as _, Result};
use serde_json::json;
use tracing::info;
use warden_core::{Holder, LockStatus};

use super::emit;
use crate::context::Context;

#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub resource: String,
    pub lease: Option<u64>,
    pub timeout: Option<u64>,
    pub operation: Option<String>,
}

impl AcquireOptions {
    fn lease(&self, ctx: &Context) -> Duration {
        self.lease
            .map_or_else(|| ctx.config.lock.lease(), Duration::from_secs)
    }

    fn timeout(&self, ctx: &Context) -> Duration {
        self.timeout
            .map_or_else(|| ctx.config.lock.timeout(), Duration::from_secs)
    }

    fn tag(&self, holder: Holder) -> Holder {
        match &self.operation {
            Some(operation) => holder.with_operation(operation.clone()),
            None => holder,
        }
    }
}

/// Acquire and leave the lock in place for a later `release`.
pub async fn acquire(ctx: &Context, options: &AcquireOptions, holder: Holder) -> Result<()> {
    let locks = ctx.lock_manager(options.tag(holder))?;
    let handle = locks
        .acquire(&options.resource, options.lease(ctx), options.timeout(ctx))
        .await?;
    let record = handle.record();
    emit(ctx, record, || {
        format!(
            "Acquired '{}' as {} (expires {})",
            record.resource,
            record.holder_id,
            record.expires_at.to_rfc3339()
        )
    })
}

pub fn release(ctx: &Context, resource: &str, force: bool, holder: Holder) -> Result<()> {
    let locks = ctx.lock_manager(holder)?;
    let released = locks.release(resource, force)?;
    emit(ctx, &json!({ "resource": resource, "released": released }), || {
        if released {
            format!("Released '{resource}'")
        } else {
            format!("'{resource}' was not held")
        }
    })
}

pub fn status(ctx: &Context, resource: &str) -> Result<()> {
    let locks = ctx.lock_manager(Holder::current("status"))?;
    let status = locks.status(resource)?;
    emit(ctx, &status, || match &status {
        LockStatus::Free => format!("'{resource}' is free"),
        LockStatus::Held(record) => format!(
            "'{resource}' held by {} (pid {}, {}) until {}",
            record.holder_id,
            record.holder_pid,
            if record.operation.is_empty() { "-" } else { record.operation.as_str() },
            record.expires_at.to_rfc3339()
        ),
    })
}

pub fn list(ctx: &Context) -> Result<()> {
    let locks = ctx.lock_manager(Holder::current("list"))?;
    let records = locks.list()?;
    emit(ctx, &records, || {
        if records.is_empty() {
            return "No locks held".to_string();
        }
        records
            .iter()
            .map(|r| {
                format!(
                    "{}\t{}\tpid {}\t{}",
                    r.resource,
                    r.holder_id,
                    r.holder_pid,
                    r.expires_at.to_rfc3339()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

pub fn sweep(ctx: &Context) -> Result<()> {
    let locks = ctx.lock_manager(Holder::current("sweep"))?;
    let reclaimed = locks.sweep_stale()?;
    emit(ctx, &reclaimed, || {
        format!("Reclaimed {} stale lock(s)", reclaimed.len())
    })
}

/// Run `command` while holding the lock; returns the child's exit code.
///
/// The child is killed if this future is dropped, and the lock goes with
/// the guard either way.
pub async fn run(ctx: &Context, options: &AcquireOptions, command: &[String]) -> Result<i32> {
    let (program, args) = command
        .split_first()
        .context("No command given after --")?;
    let holder = options.tag(Holder::current(format!("run-{}", std::process::id())));
    let locks = ctx.lock_manager(holder)?;

    let guard = locks
        .acquire_guard(&options.resource, options.lease(ctx), options.timeout(ctx))
        .await?;

    let status = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .kill_on_drop(true)
        .status()
        .await
        .with_context(|| format!("Failed to run '{program}'"))?;

    guard.release()?;
    info!(resource = %options.resource, %status, "Command finished");
    Ok(status.code().unwrap_or(1))
}
