use std::path::PathBuf;

use anyhow::Result;
use clap::ArgMatches;

use super::required;
use crate::{
    commands::doc::{self, SetOptions},
    context::Context,
};

pub async fn handle(matches: &ArgMatches, ctx: &Context) -> Result<()> {
    let Some((name, sub_m)) = matches.subcommand() else {
        anyhow::bail!("Doc subcommand required. Run 'warden doc --help'.");
    };
    let path = sub_m
        .get_one::<PathBuf>("path")
        .ok_or_else(|| anyhow::anyhow!("Missing required argument <path>"))?;

    match name {
        "ensure" => doc::ensure(ctx, path),
        "version" => doc::version(ctx, path),
        "show" => doc::show(ctx, path),
        "set" => {
            let options = SetOptions {
                key: required(sub_m, "key")?.to_string(),
                value: required(sub_m, "value")?.to_string(),
                expect: sub_m.get_one::<u64>("expect").copied(),
                retry: sub_m.get_one::<u32>("retry").copied(),
            };
            doc::set(ctx, path, &options).await
        }
        other => anyhow::bail!("Unknown doc subcommand '{other}'"),
    }
}
