// Numan Thabit 2025
use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use pprof::ProfilerGuard;
use tracing::{info, warn};

use crate::driver::Profiler;

/// Samples the measured loop with pprof and writes an SVG flamegraph when
/// profiling stops.
pub struct FlamegraphProfiler {
    output: PathBuf,
    frequency: i32,
    guard: Option<ProfilerGuard<'static>>,
}

impl FlamegraphProfiler {
    pub fn new(output: PathBuf) -> Self {
        Self {
            output,
            frequency: 100,
            guard: None,
        }
    }

    fn write_report(&self, guard: &ProfilerGuard<'static>) -> Result<()> {
        let report = guard
            .report()
            .build()
            .context("failed to build flamegraph profile")?;
        let file = File::create(&self.output)
            .with_context(|| format!("failed to create {}", self.output.display()))?;
        report
            .flamegraph(file)
            .context("failed to write flamegraph")?;
        Ok(())
    }
}

impl Profiler for FlamegraphProfiler {
    fn start(&mut self) {
        match ProfilerGuard::new(self.frequency) {
            Ok(guard) => self.guard = Some(guard),
            Err(err) => warn!(error = %err, "failed to start profiler"),
        }
    }

    fn stop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        match self.write_report(&guard) {
            Ok(()) => info!(path = %self.output.display(), "flamegraph written"),
            Err(err) => warn!(error = %err, "failed to write flamegraph"),
        }
    }
}
