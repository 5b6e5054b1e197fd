// Numan Thabit 2025
//! Warmup, timed measurement and teardown around a [`Scenario`].

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::FlingError;
use crate::histogram::Histogram;
use crate::scenario::{CallContext, RoundTrip, Scenario};
use crate::transport::Channel;

/// Monotonic nanosecond source.
pub trait Clock {
    fn now_ns(&self) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ns(&self) -> f64 {
        self.origin.elapsed().as_nanos() as f64
    }
}

/// Hook bracketing the measured loop only.
pub trait Profiler {
    fn start(&mut self);
    fn stop(&mut self);
}

#[derive(Debug, Default)]
pub struct NoopProfiler;

impl Profiler for NoopProfiler {
    fn start(&mut self) {}
    fn stop(&mut self) {}
}

/// Iteration counts for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    pub warmup: u64,
    pub measured: u64,
}

/// Summary of one run, in nanoseconds.
#[derive(Debug, Clone, Serialize)]
pub struct LatencyReport {
    pub scenario: Scenario,
    pub payload_size: usize,
    /// Whether a secure channel was requested. Informational only.
    pub secure: bool,
    pub warmup_iterations: u64,
    pub measured_iterations: u64,
    pub samples: u64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub calls_created: u64,
    pub drained_events: usize,
}

impl LatencyReport {
    fn from_histogram(
        histogram: &Histogram,
        scenario: Scenario,
        payload_size: usize,
        plan: RunPlan,
        calls_created: u64,
        drained_events: usize,
    ) -> Self {
        let empty = histogram.count() == 0;
        Self {
            scenario,
            payload_size,
            secure: false,
            warmup_iterations: plan.warmup,
            measured_iterations: plan.measured,
            samples: histogram.count(),
            p50: histogram.percentile(50.0),
            p95: histogram.percentile(95.0),
            p99: histogram.percentile(99.0),
            p999: histogram.percentile(99.9),
            min: if empty { 0.0 } else { histogram.minimum() },
            max: histogram.maximum(),
            mean: histogram.mean(),
            stddev: histogram.stddev(),
            calls_created,
            drained_events,
        }
    }

    /// The classic one-line summary.
    pub fn summary_line(&self) -> String {
        format!(
            "latency (50/95/99/99.9): {:.6}/{:.6}/{:.6}/{:.6}",
            self.p50, self.p95, self.p99, self.p999
        )
    }
}

pub struct Driver<Ch: Channel, K: Clock = MonotonicClock> {
    ctx: CallContext<Ch>,
    histogram: Histogram,
    clock: K,
    profiler: Box<dyn Profiler>,
}

impl<Ch: Channel> Driver<Ch, MonotonicClock> {
    pub fn new(ctx: CallContext<Ch>, histogram: Histogram) -> Self {
        Self {
            ctx,
            histogram,
            clock: MonotonicClock::new(),
            profiler: Box::new(NoopProfiler),
        }
    }
}

impl<Ch: Channel, K: Clock> Driver<Ch, K> {
    pub fn with_clock<K2: Clock>(self, clock: K2) -> Driver<Ch, K2> {
        Driver {
            ctx: self.ctx,
            histogram: self.histogram,
            clock,
            profiler: self.profiler,
        }
    }

    pub fn with_profiler(mut self, profiler: Box<dyn Profiler>) -> Self {
        self.profiler = profiler;
        self
    }

    /// Run `scenario` to completion and tear everything down. Any error is an
    /// invariant violation; teardown is skipped in that case.
    pub fn run(self, scenario: Scenario, plan: RunPlan) -> Result<LatencyReport, FlingError> {
        let Driver {
            mut ctx,
            mut histogram,
            clock,
            mut profiler,
        } = self;
        let payload_size = ctx.payload().len();

        info!(
            %scenario,
            payload_size,
            warmup = plan.warmup,
            measured = plan.measured,
            "starting benchmark"
        );
        scenario.init(&mut ctx)?;

        for _ in 0..plan.warmup {
            scenario.step(&mut ctx)?;
        }

        info!("start profiling");
        profiler.start();
        for _ in 0..plan.measured {
            let start = clock.now_ns();
            scenario.step(&mut ctx)?;
            let stop = clock.now_ns();
            histogram.insert(stop - start)?;
        }
        profiler.stop();

        let calls_created = ctx.calls_created();
        let drain = ctx.teardown()?;
        debug!(drained = drain.events, "completion queue drained");

        let report = LatencyReport::from_histogram(
            &histogram,
            scenario,
            payload_size,
            plan,
            calls_created,
            drain.events,
        );
        info!(
            p50 = report.p50,
            p95 = report.p95,
            p99 = report.p99,
            p999 = report.p999,
            "{}",
            report.summary_line()
        );
        Ok(report)
    }
}
