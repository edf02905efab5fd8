//! Tracing subscriber setup. Logs go to stderr so `--json` output on stdout
//! stays machine readable.
//!
//! Filter priority: `RUST_LOG`, then `--verbose` (debug for this workspace's
//! crates), then `warn`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

const DEFAULT_DIRECTIVE: &str = "warn";
const VERBOSE_DIRECTIVE: &str = "warn,mealplan=debug,mealplan_core=debug";

pub fn init(verbose: bool) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .without_time()
        .compact();

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(fmt_layer)
        .init();
}

fn env_filter(verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(default_directive(verbose))
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_DIRECTIVE
    } else {
        DEFAULT_DIRECTIVE
    }
}
