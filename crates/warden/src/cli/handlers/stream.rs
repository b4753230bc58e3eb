use anyhow::Result;
use clap::ArgMatches;

use super::required;
use crate::{
    commands::stream,
    context::{participant_id, Context},
};

/// Exit code 1 from `conflicts` means overlaps were found.
pub async fn handle(matches: &ArgMatches, ctx: &Context) -> Result<i32> {
    let Some((name, sub_m)) = matches.subcommand() else {
        anyhow::bail!("Stream subcommand required. Run 'warden stream --help'.");
    };
    let domain = required(sub_m, "domain")?;

    match name {
        "claim" => {
            let patterns: Vec<String> = sub_m
                .get_many::<String>("patterns")
                .map(|values| values.cloned().collect())
                .unwrap_or_default();
            stream::claim(ctx, domain, &id(sub_m)?, required(sub_m, "name")?, &patterns).await?;
        }
        "release" => stream::release(ctx, domain, &id(sub_m)?, required(sub_m, "name")?).await?,
        "complete" => {
            stream::complete(ctx, domain, &id(sub_m)?, required(sub_m, "name")?).await?;
        }
        "list" => stream::list(ctx, domain)?,
        "owner" => stream::owner(ctx, domain, required(sub_m, "name")?)?,
        "conflicts" => {
            let found = stream::conflicts(ctx, domain)?;
            return Ok(i32::from(found > 0));
        }
        other => anyhow::bail!("Unknown stream subcommand '{other}'"),
    }
    Ok(0)
}

fn id(matches: &ArgMatches) -> Result<String> {
    participant_id(matches.get_one::<String>("id"))
}
