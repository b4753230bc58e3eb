//! Versioned document commands

use std::path::Path;

use anyhow::{Context as _, Result};
use serde_json::{json, Value};

use super::emit;
use crate::context::Context;

pub fn ensure(ctx: &Context, path: &Path) -> Result<()> {
    let version = ctx.versions().ensure_version(path)?;
    emit(ctx, &json!({ "version": version }), || version.to_string())
}

pub fn version(ctx: &Context, path: &Path) -> Result<()> {
    let version = ctx.versions().get_version(path)?;
    emit(ctx, &json!({ "version": version }), || version.to_string())
}

pub fn show(ctx: &Context, path: &Path) -> Result<()> {
    let doc = ctx.versions().read(path)?;
    // Already JSON, so both output modes print it as is
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SetOptions {
    pub key: String,
    pub value: String,
    pub expect: Option<u64>,
    pub retry: Option<u32>,
}

/// Set one top-level key.
///
/// With `--expect` the update is a single compare-and-update against that
/// version; otherwise it retries against the latest version.
pub async fn set(ctx: &Context, path: &Path, options: &SetOptions) -> Result<()> {
    let value: Value = serde_json::from_str(&options.value)
        .with_context(|| format!("'{}' is not valid JSON", options.value))?;
    let versions = ctx.versions();
    let key = options.key.as_str();

    let version = match options.expect {
        Some(expected) => versions.compare_and_update(path, expected, |doc| {
            doc[key] = value;
            Ok(())
        })?,
        None => {
            let attempts = options.retry.unwrap_or(ctx.config.occ.max_attempts);
            versions
                .retry_with_backoff(path, attempts, |doc| {
                    doc[key] = value.clone();
                    Ok(())
                })
                .await?
        }
    };

    emit(ctx, &json!({ "version": version }), || version.to_string())
}
