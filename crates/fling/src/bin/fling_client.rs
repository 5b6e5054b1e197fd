// Numan Thabit 2025
// crates/fling/src/bin/fling_client.rs
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use fling::completion::CompletionQueue;
use fling::driver::{NoopProfiler, Profiler};
use fling::telemetry::init_tracing;
use fling::{
    CallContext, ClientArgs, ClientConfig, Driver, FlingError, Histogram, LatencyReport,
    TcpChannel,
};
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let args = ClientArgs::parse();
    init_tracing();

    let config = match ClientConfig::from_cli(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };

    match run(&config) {
        Ok(report) => {
            println!("{}", report.summary_line());
            ExitCode::SUCCESS
        }
        Err(err) => {
            if let Some(violation) = err.downcast_ref::<FlingError>() {
                error!(error = %violation, "benchmark invariant violated");
                std::process::abort();
            }
            error!(error = %format!("{err:#}"), "fling client failed");
            ExitCode::from(1)
        }
    }
}

fn run(config: &ClientConfig) -> Result<LatencyReport> {
    if config.secure {
        warn!("--secure requested but the tcp transport is plaintext; continuing unencrypted");
    }
    let channel = TcpChannel::connect(&config.target)?;
    let cq = Arc::new(CompletionQueue::new());
    let ctx = CallContext::new(channel, cq, Bytes::from(config.payload()));
    let histogram = Histogram::new(config.histogram_resolution, config.histogram_max)
        .context("invalid histogram parameters")?;

    let driver = Driver::new(ctx, histogram).with_profiler(profiler_for(config));
    let mut report = driver.run(config.scenario, config.plan)?;
    report.secure = config.secure;

    if let Some(path) = &config.output_json {
        write_report(path, &report)?;
        info!(path = %path.display(), "latency report written");
    }
    Ok(report)
}

#[cfg(feature = "profiling")]
fn profiler_for(config: &ClientConfig) -> Box<dyn Profiler> {
    match &config.profile {
        Some(path) => Box::new(fling::profiling::FlamegraphProfiler::new(path.clone())),
        None => Box::new(NoopProfiler),
    }
}

#[cfg(not(feature = "profiling"))]
fn profiler_for(_config: &ClientConfig) -> Box<dyn Profiler> {
    Box::new(NoopProfiler)
}

fn write_report(path: &Path, report: &LatencyReport) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)
        .context("failed to serialize latency report")?;
    writer.flush().context("failed to flush latency report")?;
    Ok(())
}
