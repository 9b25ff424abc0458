//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the logging subsystem
//! - Configure log level from config or environment
//!
//! # Design Decisions
//! - Uses the tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` always wins over the configured default level

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `default_level` applies when `RUST_LOG` is unset. Safe to call more
/// than once; subsequent calls are no-ops.
pub fn init(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    // Already-initialized is fine (tests, embedding applications).
    let _ = result;
}
