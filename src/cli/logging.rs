//! Logging setup
//!
//! Logs go to stderr so stdout stays clean for rendered graph output.
//! `RUST_LOG` overrides the default filter when set.

use tracing_subscriber::EnvFilter;

pub fn init_logging(debug: bool) {
    let fallback = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
