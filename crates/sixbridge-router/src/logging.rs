//! Tracing subscriber configuration for the border router.
//!
//! Log levels follow these conventions:
//! - ERROR: Unrecoverable failures (device lost, handshake given up)
//! - WARN: Recoverable errors, malformed packets from the node
//! - INFO: Link events (handshake complete, address assigned), node output
//! - DEBUG: Window state changes, retransmissions, packet dispatch
//! - TRACE: Wire-level data, raw bytes
//!
//! Text printed by the node on its console is logged under the `node` target,
//! so `RUST_LOG=node=off` silences it.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (from `[logging]`)
/// is used.
pub fn init(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .init();
}

/// Initialize the tracing subscriber with JSON output.
///
/// Activated by setting `RUST_LOG_FORMAT=json`.
pub fn init_json(default_level: &str) {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(default_level))
        .init();
}

/// Initialize the tracing subscriber for tests.
///
/// Uses `try_init` to avoid panicking if called multiple times.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_test_writer()
        .try_init();
}

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
