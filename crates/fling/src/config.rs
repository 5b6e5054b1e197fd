// Numan Thabit 2025
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::driver::RunPlan;
use crate::scenario::Scenario;

pub const DEFAULT_TARGET: &str = "localhost:443";
pub const DEFAULT_PAYLOAD_SIZE: usize = 1;
pub const WARMUP_ITERATIONS: u64 = 1_000;
pub const MEASURED_ITERATIONS: u64 = 100_000;
pub const HISTOGRAM_RESOLUTION: f64 = 0.01;
pub const HISTOGRAM_MAX_NS: f64 = 60e9;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unsupported scenario '{name}'. Valid are: {}", valid.join(" "))]
    UnknownScenario {
        name: String,
        valid: Vec<&'static str>,
    },
    #[error("payload_size must be > 0")]
    InvalidPayloadSize,
    #[error("target must not be empty")]
    EmptyTarget,
    #[error("profiling requested but this build lacks the `profiling` feature")]
    ProfilingUnavailable,
    #[error("measured iterations must be > 0")]
    NoMeasuredIterations,
}

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "fling client: RPC round-trip latency harness",
    rename_all = "snake_case"
)]
pub struct ClientArgs {
    /// Size of the payload to send.
    #[arg(long, default_value_t = DEFAULT_PAYLOAD_SIZE)]
    pub payload_size: usize,

    /// Target host:port.
    #[arg(long, default_value = DEFAULT_TARGET)]
    pub target: String,

    /// Run with security? Accepted for compatibility; the tcp transport is
    /// always plaintext.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub secure: bool,

    /// Scenario to run.
    #[arg(long, default_value = "ping-pong-request")]
    pub scenario: String,

    /// Untimed round trips before measurement.
    #[arg(long, default_value_t = WARMUP_ITERATIONS)]
    pub warmup: u64,

    /// Timed round trips.
    #[arg(long, default_value_t = MEASURED_ITERATIONS)]
    pub iterations: u64,

    /// Optional path to persist the latency report as JSON.
    #[arg(long)]
    pub output_json: Option<PathBuf>,

    /// Write a flamegraph of the measured loop to this path.
    #[arg(long)]
    pub profile: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub payload_size: usize,
    pub target: String,
    pub secure: bool,
    pub scenario: Scenario,
    pub plan: RunPlan,
    pub histogram_resolution: f64,
    pub histogram_max: f64,
    pub output_json: Option<PathBuf>,
    pub profile: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            payload_size: DEFAULT_PAYLOAD_SIZE,
            target: DEFAULT_TARGET.to_string(),
            secure: false,
            scenario: Scenario::default(),
            plan: RunPlan {
                warmup: WARMUP_ITERATIONS,
                measured: MEASURED_ITERATIONS,
            },
            histogram_resolution: HISTOGRAM_RESOLUTION,
            histogram_max: HISTOGRAM_MAX_NS,
            output_json: None,
            profile: None,
        }
    }
}

impl ClientConfig {
    /// Resolve the scenario and validate everything else. Nothing is run
    /// when this fails.
    pub fn from_cli(args: &ClientArgs) -> Result<Self, ConfigError> {
        let scenario = Scenario::from_name(&args.scenario)?;
        let config = Self {
            payload_size: args.payload_size,
            target: args.target.clone(),
            secure: args.secure,
            scenario,
            plan: RunPlan {
                warmup: args.warmup,
                measured: args.iterations,
            },
            output_json: args.output_json.clone(),
            profile: args.profile.clone(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payload_size == 0 {
            return Err(ConfigError::InvalidPayloadSize);
        }
        if self.target.trim().is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        if self.plan.measured == 0 {
            return Err(ConfigError::NoMeasuredIterations);
        }
        if self.profile.is_some() && !cfg!(feature = "profiling") {
            return Err(ConfigError::ProfilingUnavailable);
        }
        Ok(())
    }

    /// `payload_size` copies of `'x'`.
    pub fn payload(&self) -> Vec<u8> {
        vec![b'x'; self.payload_size]
    }
}
