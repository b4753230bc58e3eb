//! Argument extraction and dispatch
//!
//! Handlers return the process exit code for successful runs; errors
//! propagate to `main`, which maps them.

mod budget;
mod doc;
mod lock;
mod participant;
mod stream;

use anyhow::Result;
use clap::ArgMatches;

use crate::context::Context;

pub async fn dispatch(matches: &ArgMatches, ctx: &Context) -> Result<i32> {
    match matches.subcommand() {
        Some(("lock", sub_m)) => lock::handle(sub_m, ctx).await,
        Some(("participant", sub_m)) => participant::handle(sub_m, ctx).await.map(|()| 0),
        Some(("stream", sub_m)) => stream::handle(sub_m, ctx).await,
        Some(("doc", sub_m)) => doc::handle(sub_m, ctx).await.map(|()| 0),
        Some(("budget", sub_m)) => budget::handle(sub_m, ctx).await.map(|()| 0),
        _ => anyhow::bail!("Unknown command. Run 'warden --help' for usage."),
    }
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing required argument <{name}>"))
}
