// Numan Thabit 2025
//! fling: round-trip latency harness for request/response RPC transports.
//!
//! A [`driver::Driver`] runs one [`scenario::Scenario`] against a
//! [`transport::Channel`], timing each round trip into a
//! [`histogram::Histogram`]. Completions flow through a blocking
//! [`completion::CompletionQueue`]; [`call::TrackedCall`] enforces the
//! per-call operation ordering on top of it.

pub mod call;
pub mod channel;
pub mod completion;
pub mod config;
pub mod driver;
pub mod error;
pub mod histogram;
#[cfg(feature = "profiling")]
pub mod profiling;
pub mod scenario;
pub mod telemetry;
pub mod transport;

pub use channel::TcpChannel;
pub use config::{ClientArgs, ClientConfig, ConfigError};
pub use driver::{Driver, LatencyReport, RunPlan};
pub use error::FlingError;
pub use histogram::Histogram;
pub use scenario::{CallContext, Scenario};
