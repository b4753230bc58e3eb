//! warden CLI
//!
//! Binary name: `warden`

use std::process;

use warden::{cli, exit_code, Context, INTERRUPTED_EXIT_CODE};
use warden_core::ReleaseStack;

#[tokio::main]
async fn main() {
    let matches = cli::build_cli().get_matches();

    if let Err(e) = cli::setup::init_tracing() {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("Warning: {e}");
        }
    }

    let releases = ReleaseStack::new();
    let code = tokio::select! {
        result = run(&matches, releases.clone()) => match result {
            Ok(code) => code,
            Err(err) => {
                #[allow(clippy::print_stderr)]
                {
                    eprintln!("Error: {err:#}");
                }
                exit_code(&err)
            }
        },
        signal = shutdown_signal() => {
            tracing::info!(signal, "Interrupted, releasing held locks");
            let released = releases.run_all();
            tracing::debug!(released, "Release stack drained");
            INTERRUPTED_EXIT_CODE
        }
    };

    #[allow(clippy::exit)]
    process::exit(code);
}

async fn run(matches: &clap::ArgMatches, releases: ReleaseStack) -> anyhow::Result<i32> {
    let ctx = Context::load(
        matches.get_one::<std::path::PathBuf>("root").cloned(),
        matches.get_flag("json"),
        releases,
    )?;
    cli::handlers::dispatch(matches, &ctx).await
}

/// Resolves with the name of the first termination signal received.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            },
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Signal handlers unavailable");
                std::future::pending().await
            }
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl-C",
            Err(e) => {
                tracing::warn!(error = %e, "Ctrl-C handler unavailable");
                std::future::pending().await
            }
        }
    }
}
