use anyhow::Result;
use clap::ArgMatches;

use super::required;
use crate::{
    commands::lock::{self, AcquireOptions},
    context::{shell_holder, Context},
};

pub async fn handle(matches: &ArgMatches, ctx: &Context) -> Result<i32> {
    match matches.subcommand() {
        Some(("acquire", sub_m)) => {
            lock::acquire(ctx, &acquire_options(sub_m)?, holder(sub_m)).await?;
            Ok(0)
        }
        Some(("release", sub_m)) => {
            lock::release(
                ctx,
                required(sub_m, "resource")?,
                sub_m.get_flag("force"),
                holder(sub_m),
            )?;
            Ok(0)
        }
        Some(("status", sub_m)) => lock::status(ctx, required(sub_m, "resource")?).map(|()| 0),
        Some(("list", _)) => lock::list(ctx).map(|()| 0),
        Some(("sweep", _)) => lock::sweep(ctx).map(|()| 0),
        Some(("run", sub_m)) => {
            let command: Vec<String> = sub_m
                .get_many::<String>("command")
                .map(|values| values.cloned().collect())
                .unwrap_or_default();
            lock::run(ctx, &acquire_options(sub_m)?, &command).await
        }
        _ => anyhow::bail!("Unknown lock subcommand. Run 'warden lock --help' for usage."),
    }
}

fn acquire_options(matches: &ArgMatches) -> Result<AcquireOptions> {
    Ok(AcquireOptions {
        resource: required(matches, "resource")?.to_string(),
        lease: matches.get_one::<u64>("lease").copied(),
        timeout: matches.get_one::<u64>("timeout").copied(),
        operation: matches.get_one::<String>("operation").cloned(),
    })
}

fn holder(matches: &ArgMatches) -> warden_core::Holder {
    shell_holder(
        matches.get_one::<String>("holder"),
        matches.get_one::<u32>("pid").copied(),
    )
}
