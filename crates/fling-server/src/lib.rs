// Numan Thabit 2025
//! fling-server: reflecting counterpart to the fling latency client.

/// Server configuration structures.
pub mod config;
/// Per-connection call handling.
pub mod reflector;
/// Log subscriber setup.
pub mod telemetry;

mod server;

pub use server::{launch_server, ServerHandle};
