//! Participant commands

use std::time::Duration;

use anyhow::Result;
use serde_json::json;

use super::emit;
use crate::context::Context;

pub async fn register(ctx: &Context, domain: &str, stream: Option<&str>) -> Result<()> {
    let id = ctx.registry()?.register(domain, stream).await?;
    emit(ctx, &json!({ "domain": domain, "id": id }), || id.clone())
}

pub async fn heartbeat(ctx: &Context, domain: &str, id: &str) -> Result<()> {
    ctx.registry()?.heartbeat(domain, id).await?;
    emit(ctx, &json!({ "domain": domain, "id": id, "status": "active" }), String::new)
}

pub async fn unregister(ctx: &Context, domain: &str, id: &str) -> Result<()> {
    let removed = ctx.registry()?.unregister(domain, id).await?;
    emit(ctx, &json!({ "id": id, "removed": removed }), || {
        if removed {
            format!("Unregistered {id}")
        } else {
            format!("{id} was not registered")
        }
    })
}

pub fn list(ctx: &Context, domain: &str, all: bool) -> Result<()> {
    let registry = ctx.registry()?;
    let participants = if all {
        registry.list_all(domain)?
    } else {
        registry.list_active(domain)?
    };
    emit(ctx, &participants, || {
        participants
            .iter()
            .map(|p| {
                format!(
                    "{}\t{}\t{}\t{} commit(s)\tlast seen {}",
                    p.id,
                    p.status,
                    p.work_stream.as_deref().unwrap_or("-"),
                    p.commits,
                    p.last_heartbeat.to_rfc3339()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

pub async fn sweep(ctx: &Context, domain: &str, threshold: Option<u64>) -> Result<()> {
    let threshold = threshold.map_or_else(
        || ctx.config.registry.stale_threshold(),
        Duration::from_secs,
    );
    let marked = ctx.registry()?.sweep_stale(domain, threshold).await?;
    emit(ctx, &marked, || format!("Marked {} participant(s) stale", marked.len()))
}

pub async fn commit(ctx: &Context, domain: &str, id: &str) -> Result<()> {
    let commits = ctx.registry()?.increment_commits(domain, id).await?;
    emit(ctx, &json!({ "id": id, "commits": commits }), || commits.to_string())
}

pub async fn file(ctx: &Context, domain: &str, id: &str, path: &str, add: bool) -> Result<()> {
    let registry = ctx.registry()?;
    let changed = if add {
        registry.add_locked_file(domain, id, path).await?
    } else {
        registry.remove_locked_file(domain, id, path).await?
    };
    emit(ctx, &json!({ "id": id, "file": path, "changed": changed }), String::new)
}
