//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,lumiere=debug";

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `verbose` selects `debug` for every
/// target and the default is `info` with debug output from Lumiere crates.
/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init_logging(verbose: bool, json_logs: bool) {
    let directives = if verbose { "debug" } else { DEFAULT_DIRECTIVES };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}
