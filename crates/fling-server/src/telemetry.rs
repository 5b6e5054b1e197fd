// Numan Thabit 2025
//! Tracing subscriber setup for the reflector binary.

use tracing_subscriber::EnvFilter;

/// Compact fmt subscriber filtered by `RUST_LOG` (default `info`), the same
/// format the fling client logs with. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .try_init();
}
