// Numan Thabit 2025
//! Tracing subscriber setup shared by the fling binaries and tests.

use tracing_subscriber::EnvFilter;

/// Install a compact fmt subscriber filtered by `RUST_LOG`, defaulting to
/// `info`. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .try_init();
}
