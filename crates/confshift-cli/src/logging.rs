//! Tracing setup

use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber; `RUST_LOG` wins over `verbose`
///
/// Later calls are no-ops.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
