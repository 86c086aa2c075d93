//! Diagnostic logging to stderr.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter directive for a verbosity level.
pub const fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "git_purge=warn,purge_stream=warn";
    }
    match verbose {
        0 => "git_purge=info,purge_stream=info",
        1 => "git_purge=debug,purge_stream=debug",
        _ => "git_purge=trace,purge_stream=trace",
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the flags.
/// If a subscriber is already installed it stays in place and receives a
/// debug event saying so.
pub fn init(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive(verbose, quiet).into());
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .try_init();
    if let Err(e) = installed {
        tracing::debug!("keeping existing log subscriber: {e}");
    }
}
