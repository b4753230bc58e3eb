use anyhow::Result;
use clap::ArgMatches;

use super::required;
use crate::{
    commands::participant,
    context::{participant_id, Context},
};

pub async fn handle(matches: &ArgMatches, ctx: &Context) -> Result<()> {
    let Some((name, sub_m)) = matches.subcommand() else {
        anyhow::bail!("Participant subcommand required. Run 'warden participant --help'.");
    };
    if name == "file" {
        return handle_file(sub_m, ctx).await;
    }

    let domain = required(sub_m, "domain")?;
    match name {
        "register" => {
            participant::register(
                ctx,
                domain,
                sub_m.get_one::<String>("stream").map(String::as_str),
            )
            .await
        }
        "heartbeat" => participant::heartbeat(ctx, domain, &id(sub_m)?).await,
        "unregister" => participant::unregister(ctx, domain, &id(sub_m)?).await,
        "list" => participant::list(ctx, domain, sub_m.get_flag("all")),
        "sweep" => {
            participant::sweep(ctx, domain, sub_m.get_one::<u64>("threshold").copied()).await
        }
        "commit" => participant::commit(ctx, domain, &id(sub_m)?).await,
        other => anyhow::bail!("Unknown participant subcommand '{other}'"),
    }
}

async fn handle_file(matches: &ArgMatches, ctx: &Context) -> Result<()> {
    let Some((name, sub_m)) = matches.subcommand() else {
        anyhow::bail!("File subcommand required (add or remove)");
    };
    let add = match name {
        "add" => true,
        "remove" => false,
        other => anyhow::bail!("Unknown file subcommand '{other}'"),
    };
    participant::file(
        ctx,
        required(sub_m, "domain")?,
        &id(sub_m)?,
        required(sub_m, "path")?,
        add,
    )
    .await
}

fn id(matches: &ArgMatches) -> Result<String> {
    participant_id(matches.get_one::<String>("id"))
}
