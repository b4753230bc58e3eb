use anyhow::Result;
use clap::ArgMatches;

use crate::{commands::budget, context::Context};

pub async fn handle(matches: &ArgMatches, ctx: &Context) -> Result<()> {
    match matches.subcommand() {
        Some(("init", _)) => budget::init(ctx),
        Some(("refresh", _)) => budget::refresh(ctx).await,
        Some(("reserve", sub_m)) => budget::reserve(ctx, amount(sub_m)?),
        Some(("wait", sub_m)) => budget::wait(ctx, amount(sub_m)?).await,
        Some(("show", _)) => budget::show(ctx),
        _ => anyhow::bail!("Unknown budget subcommand. Run 'warden budget --help' for usage."),
    }
}

fn amount(matches: &ArgMatches) -> Result<u64> {
    matches
        .get_one::<u64>("amount")
        .copied()
        .ok_or_else(|| anyhow::anyhow!("Missing required argument <amount>"))
}
