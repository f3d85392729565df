mod err_with_sources;
mod unwrap_or;

use anyhow::{Context, Result};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, filter::ParseError, util::SubscriberInitExt as _};

pub use err_with_sources::{ErrorWithSources, err_with_src};

/// Crates whose default verbosity is almost always noise for this project.
const IRRELEVANT_CRATES: &str = "netlink_proto=warn,rtnetlink=warn";

/// Registers the global `tracing` subscriber for one of the netsim binaries.
///
/// `verbosity` is the number of times `-v` was passed on the command line; it is combined
/// with `RUST_LOG` so that an explicit environment filter still wins when set.
pub fn init(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
    let filter = try_filter(&directives).context("failed to parse log directives")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish()
        .try_init()
        .context("failed to install subscriber")?;
    LogTracer::init().context("failed to bridge the `log` facade")?;

    Ok(())
}

/// Constructs an [`EnvFilter`], silencing a handful of crates whose chatter obscures our own.
pub fn try_filter(directives: &str) -> Result<EnvFilter, ParseError> {
    if directives.is_empty() {
        return EnvFilter::try_new(IRRELEVANT_CRATES);
    }

    EnvFilter::try_new(format!("{IRRELEVANT_CRATES},{directives}"))
}

/// Initializes a subscriber scoped to the current test, writing to the test harness's capture.
pub fn test(directives: &str) -> tracing::subscriber::DefaultGuard {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(directives)
        .set_default()
}
