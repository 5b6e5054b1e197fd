// Numan Thabit 2025
//! Benchmark scenarios and the context they run against.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use fling_wire::{METHOD_REFLECT_STREAM, METHOD_REFLECT_UNARY};
use serde::Serialize;

use crate::call::TrackedCall;
use crate::completion::{self, CompletionQueue, DrainStats, OpKind};
use crate::config::ConfigError;
use crate::error::FlingError;
use crate::transport::{Channel, WriteFlags};

/// Nominal authority attached to every call. Used for routing only.
pub const TARGET_HOST: &str = "localhost";

/// Everything a scenario touches: the channel, the queue, the payload and
/// the single live call. Owned by the driver for the whole run.
pub struct CallContext<Ch: Channel> {
    channel: Option<Ch>,
    cq: Arc<CompletionQueue>,
    payload: Bytes,
    call: Option<TrackedCall<Ch::Call>>,
    next_serial: u64,
    calls_created: u64,
}

impl<Ch: Channel> CallContext<Ch> {
    pub fn new(channel: Ch, cq: Arc<CompletionQueue>, payload: Bytes) -> Self {
        Self {
            channel: Some(channel),
            cq,
            payload,
            call: None,
            next_serial: 1,
            calls_created: 0,
        }
    }

    pub fn cq(&self) -> &Arc<CompletionQueue> {
        &self.cq
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Calls created so far over the lifetime of the context.
    pub fn calls_created(&self) -> u64 {
        self.calls_created
    }

    pub fn has_live_call(&self) -> bool {
        self.call.is_some()
    }

    /// Create the single live call. Fails if one already exists.
    pub fn create_call(&mut self, method: &str) -> Result<&mut TrackedCall<Ch::Call>, FlingError> {
        if self.call.is_some() {
            return Err(FlingError::CallAlreadyLive);
        }
        let channel = self.channel.as_ref().ok_or(FlingError::ChannelClosed)?;
        let serial = self.next_serial;
        let call = TrackedCall::create(channel, serial, method, TARGET_HOST)?;
        self.next_serial += 1;
        self.calls_created += 1;
        Ok(self.call.insert(call))
    }

    pub fn live_call(&mut self) -> Result<&mut TrackedCall<Ch::Call>, FlingError> {
        self.call.as_mut().ok_or(FlingError::NoLiveCall)
    }

    /// Destroy the live call if there is one. Returns the number of its
    /// operations still pending at destruction.
    pub fn destroy_call(&mut self) -> usize {
        self.call.take().map(TrackedCall::destroy).unwrap_or(0)
    }

    /// Tear down in order: live call, channel, queue shutdown, drain.
    pub fn teardown(mut self) -> Result<DrainStats, FlingError> {
        self.destroy_call();
        drop(self.channel.take());
        self.cq.shutdown();
        Ok(completion::drain(&self.cq)?)
    }
}

/// Capability shared by every scenario.
pub trait RoundTrip {
    /// One-time setup before the warmup loop.
    fn init<Ch: Channel>(&self, ctx: &mut CallContext<Ch>) -> Result<(), FlingError>;

    /// Exactly one measured round trip.
    fn step<Ch: Channel>(&self, ctx: &mut CallContext<Ch>) -> Result<(), FlingError>;
}

/// A fresh call per round trip: create, invoke, write, read, half-close,
/// drain, destroy. Setup cost is part of every sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnaryPingPong;

impl RoundTrip for UnaryPingPong {
    fn init<Ch: Channel>(&self, _ctx: &mut CallContext<Ch>) -> Result<(), FlingError> {
        Ok(())
    }

    fn step<Ch: Channel>(&self, ctx: &mut CallContext<Ch>) -> Result<(), FlingError> {
        let cq = ctx.cq.clone();
        let payload = ctx.payload.clone();
        let call = ctx.create_call(METHOD_REFLECT_UNARY)?;
        call.invoke(&cq, WriteFlags::BUFFER_HINT)?;
        call.start_write(&payload, WriteFlags::BUFFER_HINT)?;
        call.await_ops(&cq, &[OpKind::Write])?;
        call.start_read()?;
        call.writes_done()?;
        call.drain_outstanding(&cq)?;
        ctx.destroy_call();
        Ok(())
    }
}

/// One long-lived call; every round trip is an unbuffered write plus a read.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamPingPong;

impl RoundTrip for StreamPingPong {
    fn init<Ch: Channel>(&self, ctx: &mut CallContext<Ch>) -> Result<(), FlingError> {
        let cq = ctx.cq.clone();
        let call = ctx.create_call(METHOD_REFLECT_STREAM)?;
        call.open_stream(&cq)
    }

    fn step<Ch: Channel>(&self, ctx: &mut CallContext<Ch>) -> Result<(), FlingError> {
        let cq = ctx.cq.clone();
        let payload = ctx.payload.clone();
        let call = ctx.live_call()?;
        call.start_write(&payload, WriteFlags::NONE)?;
        call.start_read()?;
        call.await_ops(&cq, &[OpKind::Write, OpKind::Read])
    }
}

/// Closed set of scenarios selectable by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    #[default]
    PingPongRequest,
    PingPongStream,
}

impl Scenario {
    pub const ALL: [Scenario; 2] = [Scenario::PingPongRequest, Scenario::PingPongStream];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::PingPongRequest => "ping-pong-request",
            Scenario::PingPongStream => "ping-pong-stream",
        }
    }

    pub fn valid_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|s| s.name()).collect()
    }

    /// Exact, case-sensitive lookup.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .into_iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| ConfigError::UnknownScenario {
                name: name.to_string(),
                valid: Self::valid_names(),
            })
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl RoundTrip for Scenario {
    fn init<Ch: Channel>(&self, ctx: &mut CallContext<Ch>) -> Result<(), FlingError> {
        match self {
            Scenario::PingPongRequest => UnaryPingPong.init(ctx),
            Scenario::PingPongStream => StreamPingPong.init(ctx),
        }
    }

    fn step<Ch: Channel>(&self, ctx: &mut CallContext<Ch>) -> Result<(), FlingError> {
        match self {
            Scenario::PingPongRequest => UnaryPingPong.step(ctx),
            Scenario::PingPongStream => StreamPingPong.step(ctx),
        }
    }
}
