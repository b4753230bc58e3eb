//! Rate budget commands

use anyhow::Result;
use serde_json::json;

use super::emit;
use crate::context::Context;

pub fn init(ctx: &Context) -> Result<()> {
    let budget = ctx.budget().init()?;
    emit(ctx, &budget, || format!("{}/{}", budget.remaining, budget.limit))
}

pub async fn refresh(ctx: &Context) -> Result<()> {
    let remaining = ctx.budget().refresh().await?;
    emit(ctx, &json!({ "remaining": remaining }), || remaining.to_string())
}

pub fn reserve(ctx: &Context, amount: u64) -> Result<()> {
    let remaining = ctx.budget().reserve(amount)?;
    emit(ctx, &json!({ "remaining": remaining }), || remaining.to_string())
}

pub async fn wait(ctx: &Context, required: u64) -> Result<()> {
    let waited = ctx.budget().wait_if_low(required).await?;
    emit(ctx, &json!({ "waited": waited }), String::new)
}

pub fn show(ctx: &Context) -> Result<()> {
    let budget = ctx.budget().current()?;
    emit(ctx, &budget, || {
        format!(
            "{}/{} remaining, resets {}",
            budget.remaining,
            budget.limit,
            budget.reset_at.to_rfc3339()
        )
    })
}
