pub mod handlers;
pub mod setup;

use clap::{value_parser, Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("warden")
        .version(env!("CARGO_PKG_VERSION"))
        .about("File-based locks, registries and rate budgets for cooperating processes")
        .subcommand_required(true)
        .arg(
            Arg::new("root")
                .long("root")
                .global(true)
                .value_name("DIR")
                .value_parser(value_parser!(std::path::PathBuf))
                .help("Coordination root (overrides config)"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print results as JSON"),
        )
        .subcommand(cmd_lock())
        .subcommand(cmd_participant())
        .subcommand(cmd_stream())
        .subcommand(cmd_doc())
        .subcommand(cmd_budget())
}

fn resource() -> Arg {
    Arg::new("resource").required(true).help("Lock name")
}

fn domain() -> Arg {
    Arg::new("domain")
        .required(true)
        .help("Coordination domain, e.g. an epic")
}

fn participant_id() -> Arg {
    Arg::new("id")
        .long("id")
        .value_name("ID")
        .help("Participant id (default: $WARDEN_PARTICIPANT_ID)")
}

fn secs(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name("SECS")
        .value_parser(value_parser!(u64))
        .help(help)
}

fn holder_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("holder")
            .long("holder")
            .value_name("ID")
            .help("Holder id (default: $WARDEN_HOLDER_ID or pid-<parent pid>)"),
    )
    .arg(
        Arg::new("pid")
            .long("pid")
            .value_name("PID")
            .value_parser(value_parser!(u32))
            .help("Process whose liveness backs the lock (default: parent process)"),
    )
}

fn acquire_args(cmd: Command) -> Command {
    cmd.arg(resource())
        .arg(secs("lease", "Lease duration"))
        .arg(secs("timeout", "How long to wait for a live holder"))
        .arg(
            Arg::new("operation")
                .long("operation")
                .value_name("TAG")
                .help("Label recorded with the lock"),
        )
}

fn cmd_lock() -> Command {
    Command::new("lock")
        .about("Named locks")
        .subcommand_required(true)
        .subcommand(holder_args(acquire_args(
            Command::new("acquire").about("Acquire a lock and keep it after exit"),
        )))
        .subcommand(holder_args(
            Command::new("release")
                .about("Release a lock")
                .arg(resource())
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Release even if another holder owns it"),
                ),
        ))
        .subcommand(
            Command::new("status")
                .about("Show who holds a lock")
                .arg(resource()),
        )
        .subcommand(Command::new("list").about("List all locks"))
        .subcommand(Command::new("sweep").about("Remove locks whose holder process is gone"))
        .subcommand(
            acquire_args(Command::new("run").about("Run a command while holding a lock")).arg(
                Arg::new("command")
                    .required(true)
                    .num_args(1..)
                    .last(true)
                    .value_name("CMD")
                    .help("Command and arguments, after --"),
            ),
        )
}

fn cmd_participant() -> Command {
    Command::new("participant")
        .about("Participant registry")
        .subcommand_required(true)
        .subcommand(
            Command::new("register")
                .about("Register and print a new participant id")
                .arg(domain())
                .arg(
                    Arg::new("stream")
                        .long("stream")
                        .value_name("LABEL")
                        .help("Work stream label"),
                ),
        )
        .subcommand(
            Command::new("heartbeat")
                .about("Report liveness")
                .arg(domain())
                .arg(participant_id()),
        )
        .subcommand(
            Command::new("unregister")
                .about("Remove a participant")
                .arg(domain())
                .arg(participant_id()),
        )
        .subcommand(
            Command::new("list")
                .about("List active participants")
                .arg(domain())
                .arg(
                    Arg::new("all")
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .help("Include stale participants"),
                ),
        )
        .subcommand(
            Command::new("sweep")
                .about("Mark silent participants stale")
                .arg(domain())
                .arg(secs("threshold", "Heartbeat age that counts as stale")),
        )
        .subcommand(
            Command::new("commit")
                .about("Count a commit")
                .arg(domain())
                .arg(participant_id()),
        )
        .subcommand(
            Command::new("file")
                .about("Track files a participant has locked")
                .subcommand_required(true)
                .subcommand(file_cmd("add", "Record a locked file"))
                .subcommand(file_cmd("remove", "Forget a locked file")),
        )
}

fn file_cmd(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(domain())
        .arg(Arg::new("path").required(true).help("File path"))
        .arg(participant_id())
}

fn stream_name() -> Arg {
    Arg::new("name").required(true).help("Work stream name")
}

fn cmd_stream() -> Command {
    Command::new("stream")
        .about("Work-stream ownership")
        .subcommand_required(true)
        .subcommand(
            Command::new("claim")
                .about("Claim a work stream and its file patterns")
                .arg(domain())
                .arg(stream_name())
                .arg(
                    Arg::new("patterns")
                        .num_args(0..)
                        .value_name("PATTERN")
                        .help("File patterns"),
                )
                .arg(participant_id()),
        )
        .subcommand(
            Command::new("release")
                .about("Give up a work stream")
                .arg(domain())
                .arg(stream_name())
                .arg(participant_id()),
        )
        .subcommand(
            Command::new("complete")
                .about("Mark a work stream completed")
                .arg(domain())
                .arg(stream_name())
                .arg(participant_id()),
        )
        .subcommand(Command::new("list").about("List work streams").arg(domain()))
        .subcommand(
            Command::new("owner")
                .about("Print a work stream's owner")
                .arg(domain())
                .arg(stream_name()),
        )
        .subcommand(
            Command::new("conflicts")
                .about("Report overlapping file patterns")
                .arg(domain()),
        )
}

fn doc_path() -> Arg {
    Arg::new("path")
        .required(true)
        .value_parser(value_parser!(std::path::PathBuf))
        .help("JSON document")
}

fn cmd_doc() -> Command {
    Command::new("doc")
        .about("Versioned JSON documents")
        .subcommand_required(true)
        .subcommand(
            Command::new("ensure")
                .about("Add a version field if missing")
                .arg(doc_path()),
        )
        .subcommand(
            Command::new("version")
                .about("Print the stored version")
                .arg(doc_path()),
        )
        .subcommand(Command::new("show").about("Print the document").arg(doc_path()))
        .subcommand(
            Command::new("set")
                .about("Set a top-level key under optimistic concurrency")
                .arg(doc_path())
                .arg(Arg::new("key").required(true))
                .arg(Arg::new("value").required(true).help("JSON value"))
                .arg(
                    Arg::new("expect")
                        .long("expect")
                        .value_name("VERSION")
                        .value_parser(value_parser!(u64))
                        .help("Version the update is based on"),
                )
                .arg(
                    Arg::new("retry")
                        .long("retry")
                        .value_name("ATTEMPTS")
                        .value_parser(value_parser!(u32))
                        .conflicts_with("expect")
                        .help("Retry conflicts against the latest version"),
                ),
        )
}

fn amount() -> Arg {
    Arg::new("amount")
        .required(true)
        .value_parser(value_parser!(u64))
}

fn cmd_budget() -> Command {
    Command::new("budget")
        .about("Shared rate budget")
        .subcommand_required(true)
        .subcommand(Command::new("init").about("Create the budget if missing"))
        .subcommand(Command::new("refresh").about("Reload the budget from its source"))
        .subcommand(
            Command::new("reserve")
                .about("Take calls off the budget")
                .arg(amount()),
        )
        .subcommand(
            Command::new("wait")
                .about("Pause if fewer calls remain than needed")
                .arg(amount()),
        )
        .subcommand(Command::new("show").about("Print the budget"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_lock_run_collects_trailing_command() -> Result<(), clap::Error> {
        let matches = build_cli().try_get_matches_from([
            "warden", "--json", "lock", "run", "deploy", "--lease", "30", "--", "make", "-j4",
        ])?;
        assert!(matches.get_flag("json"));

        let run = matches
            .subcommand_matches("lock")
            .and_then(|m| m.subcommand_matches("run"));
        let command: Vec<&String> = run
            .and_then(|m| m.get_many::<String>("command"))
            .map(Iterator::collect)
            .unwrap_or_default();
        assert_eq!(command, ["make", "-j4"]);
        assert_eq!(run.and_then(|m| m.get_one::<u64>("lease")), Some(&30));
        Ok(())
    }

    #[test]
    fn test_doc_set_rejects_expect_with_retry() {
        let result = build_cli().try_get_matches_from([
            "warden", "doc", "set", "d.json", "k", "1", "--expect", "2", "--retry", "3",
        ]);
        assert!(result.is_err());
    }
}
