//! Logging setup
//!
//! The cache only emits `tracing` events; installing a subscriber is left to
//! the embedding application. [`init_logging`] is a ready-made one for
//! binaries and tests that have no subscriber of their own.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Parse a level name, falling back to `info`
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install a global subscriber. `RUST_LOG` directives are honoured on top of
/// `level`. Returns `false` if a global subscriber was already set.
pub fn init_logging(level: &str, json: bool) -> bool {
    let filter = EnvFilter::from_default_env().add_directive(parse_level(level).into());

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };
    result.is_ok()
}
