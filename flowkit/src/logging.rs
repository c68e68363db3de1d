//! Tracing setup for binaries and tests.
//!
//! Library code only emits `tracing` events. Installing a subscriber is left to
//! the binary, which calls [`init`] once at start-up.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::io::config::LoggingConfig;

/// Filter directives for `config`: the base level followed by one
/// `target=off` directive per muted target.
pub fn directives(config: &LoggingConfig) -> String {
    let mut parts = vec![config.level.clone()];
    parts.extend(config.mute.iter().map(|target| format!("{target}=off")));
    parts.join(",")
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured level and mutes apply.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=flowkit=debug flowkit hash sha256 abc
/// ```
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(config)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
