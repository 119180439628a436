//! Shared tracing bootstrap for binaries and tests.

use crate::{Error, Result};

use tracing_subscriber::EnvFilter;

/// Initializes a formatted `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` when set, falling back to
/// `default_directive` (e.g. `"framewire=info"`). Safe to call once per
/// process; a second call returns a `Config` error.
pub fn init(default_directive: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| Error::Config(format!("invalid log directive: {}", e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| Error::Config(format!("tracing init failed: {}", e)))
}

/// Best-effort init for tests: ignores the already-initialized error.
pub fn init_for_tests() {
    let _ = init("framewire=debug");
}
