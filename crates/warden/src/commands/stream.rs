//! Work-stream commands

use anyhow::Result;
use serde_json::json;

use super::emit;
use crate::context::Context;

pub async fn claim(
    ctx: &Context,
    domain: &str,
    id: &str,
    name: &str,
    patterns: &[String],
) -> Result<()> {
    let stream = ctx.registry()?.claim_stream(domain, id, name, patterns).await?;
    emit(ctx, &stream, || {
        format!("Claimed '{name}' ({} pattern(s))", stream.file_patterns.len())
    })
}

pub async fn release(ctx: &Context, domain: &str, id: &str, name: &str) -> Result<()> {
    let released = ctx.registry()?.release_stream(domain, id, name).await?;
    emit(ctx, &json!({ "stream": name, "released": released }), || {
        if released {
            format!("Released '{name}'")
        } else {
            format!("'{name}' was not claimed")
        }
    })
}

pub async fn complete(ctx: &Context, domain: &str, id: &str, name: &str) -> Result<()> {
    ctx.registry()?.complete_stream(domain, id, name).await?;
    emit(ctx, &json!({ "stream": name, "status": "completed" }), || {
        format!("Completed '{name}'")
    })
}

pub fn list(ctx: &Context, domain: &str) -> Result<()> {
    let streams = ctx.registry()?.list_streams(domain)?;
    emit(ctx, &streams, || {
        streams
            .iter()
            .map(|s| {
                let patterns: Vec<&str> = s.file_patterns.iter().map(String::as_str).collect();
                format!("{}\t{}\t{}\t{}", s.name, s.owner, s.status, patterns.join(","))
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

pub fn owner(ctx: &Context, domain: &str, name: &str) -> Result<()> {
    let owner = ctx.registry()?.owner_of(domain, name)?;
    emit(ctx, &json!({ "stream": name, "owner": owner }), || {
        owner.clone().unwrap_or_default()
    })
}

/// Exits non-zero through the caller when conflicts exist.
pub fn conflicts(ctx: &Context, domain: &str) -> Result<usize> {
    let conflicts = ctx.registry()?.find_conflicts(domain)?;
    emit(ctx, &conflicts, || {
        conflicts
            .iter()
            .map(|c| {
                format!(
                    "{}:{} overlaps {}:{}",
                    c.first_stream, c.first_pattern, c.second_stream, c.second_pattern
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    Ok(conflicts.len())
}
