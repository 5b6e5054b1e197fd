// Numan Thabit 2025
//! Blocking single-consumer completion queue.
//!
//! Transports report finished operations here; the benchmark thread pulls
//! them with [`CompletionQueue::next`] and hands each one back with
//! [`CompletionQueue::finish`]. After [`CompletionQueue::shutdown`] the queue
//! keeps delivering whatever is queued or still outstanding and then yields a
//! single [`EventKind::QueueShutdown`] sentinel.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use fling_wire::StatusCode;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

/// How long [`CompletionQueue::next`] may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Infinite,
    At(Instant),
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Deadline::At(Instant::now() + timeout)
    }
}

/// Operation kinds a call can have in flight. At most one of each per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpKind {
    Metadata = 1,
    Finished = 2,
    Write = 3,
    Read = 4,
    WritesDone = 5,
}

impl OpKind {
    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(OpKind::Metadata),
            2 => Some(OpKind::Finished),
            3 => Some(OpKind::Write),
            4 => Some(OpKind::Read),
            5 => Some(OpKind::WritesDone),
            _ => None,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Metadata => "client-metadata-read",
            OpKind::Finished => "finished",
            OpKind::Write => "write",
            OpKind::Read => "read",
            OpKind::WritesDone => "writes-done",
        };
        f.write_str(name)
    }
}

/// Opaque correlation tag. The call layer packs its serial and the
/// operation kind into it; the queue never looks inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(u64);

impl Tag {
    pub const NONE: Tag = Tag(0);

    pub fn for_op(serial: u64, op: OpKind) -> Self {
        Tag((serial << 8) | op as u64)
    }

    pub fn from_raw(raw: u64) -> Self {
        Tag(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn serial(self) -> u64 {
        self.0 >> 8
    }

    pub fn op(self) -> Option<OpKind> {
        OpKind::from_u8((self.0 & 0xff) as u8)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op() {
            Some(op) => write!(f, "{}/{}", self.serial(), op),
            None => write!(f, "{:#x}", self.0),
        }
    }
}

/// Result payload of a finished operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    ClientMetadataRead { success: bool },
    WriteAccepted { success: bool },
    FinishAccepted { success: bool },
    /// `None` means the server closed the call without another message.
    Read(Option<Bytes>),
    Finished { status: StatusCode, details: String },
}

impl Completion {
    pub fn op(&self) -> OpKind {
        match self {
            Completion::ClientMetadataRead { .. } => OpKind::Metadata,
            Completion::WriteAccepted { .. } => OpKind::Write,
            Completion::FinishAccepted { .. } => OpKind::WritesDone,
            Completion::Read(_) => OpKind::Read,
            Completion::Finished { .. } => OpKind::Finished,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    OpComplete(Completion),
    QueueShutdown,
    QueueTimeout,
}

/// One delivery from the queue. Not `Clone`: every event goes back through
/// [`CompletionQueue::finish`] exactly once.
#[must_use = "events must be released with CompletionQueue::finish"]
#[derive(Debug)]
pub struct Event {
    tag: Tag,
    kind: EventKind,
}

impl Event {
    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self.kind, EventKind::QueueShutdown)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("completion queue is shut down")]
    ShutDown,
    #[error("completion queue already delivered its shutdown event")]
    AlreadyDrained,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Event>,
    outstanding: usize,
    shutdown: bool,
    sentinel_delivered: bool,
}

#[derive(Debug, Default)]
pub struct CompletionQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    unfinished: AtomicUsize,
}

impl CompletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce an operation that will later be reported via
    /// [`CompletionQueue::complete`]. Refused once the queue is shut down.
    pub fn begin_op(&self) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(QueueError::ShutDown);
        }
        state.outstanding += 1;
        Ok(())
    }

    /// Report an operation previously announced with `begin_op`.
    pub fn complete(&self, tag: Tag, completion: Completion) {
        let mut state = self.state.lock();
        match state.outstanding.checked_sub(1) {
            Some(left) => state.outstanding = left,
            None => warn!(%tag, "completion without a matching begin_op"),
        }
        state.ready.push_back(Event {
            tag,
            kind: EventKind::OpComplete(completion),
        });
        drop(state);
        self.available.notify_one();
    }

    /// `begin_op` followed by `complete`, for operations that finish inline.
    pub fn post(&self, tag: Tag, completion: Completion) -> Result<(), QueueError> {
        self.begin_op()?;
        self.complete(tag, completion);
        Ok(())
    }

    pub fn next(&self, deadline: Deadline) -> Result<Event, QueueError> {
        let mut state = self.state.lock();
        loop {
            if let Some(event) = state.ready.pop_front() {
                self.unfinished.fetch_add(1, Ordering::Relaxed);
                return Ok(event);
            }
            if state.shutdown && state.outstanding == 0 {
                if state.sentinel_delivered {
                    return Err(QueueError::AlreadyDrained);
                }
                state.sentinel_delivered = true;
                self.unfinished.fetch_add(1, Ordering::Relaxed);
                return Ok(Event {
                    tag: Tag::NONE,
                    kind: EventKind::QueueShutdown,
                });
            }
            match deadline {
                Deadline::Infinite => self.available.wait(&mut state),
                Deadline::At(when) => {
                    if Instant::now() >= when {
                        self.unfinished.fetch_add(1, Ordering::Relaxed);
                        return Ok(Event {
                            tag: Tag::NONE,
                            kind: EventKind::QueueTimeout,
                        });
                    }
                    let _ = self.available.wait_until(&mut state, when);
                }
            }
        }
    }

    pub fn finish(&self, event: Event) {
        let prev = self.unfinished.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "finish called more often than next");
        drop(event);
    }

    /// Idempotent. Wakes every waiter so the sentinel can be observed.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        debug!(
            queued = state.ready.len(),
            outstanding = state.outstanding,
            "completion queue shutdown requested"
        );
        drop(state);
        self.available.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    /// Operations announced but not yet completed.
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }

    /// Events handed out by `next` and not yet finished.
    pub fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::Relaxed)
    }
}

impl Drop for CompletionQueue {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.sentinel_delivered {
            warn!(
                queued = state.ready.len(),
                outstanding = state.outstanding,
                "completion queue destroyed before it was drained"
            );
        }
        let unfinished = *self.unfinished.get_mut();
        if unfinished > 0 {
            warn!(unfinished, "completion queue destroyed with unfinished events");
        }
    }
}

/// Outcome of draining a queue at teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Real events consumed before the shutdown sentinel.
    pub events: usize,
}

/// Pull and finish events until the shutdown sentinel shows up. The caller
/// must already have called [`CompletionQueue::shutdown`].
pub fn drain(cq: &CompletionQueue) -> Result<DrainStats, QueueError> {
    let mut stats = DrainStats::default();
    loop {
        let event = cq.next(Deadline::Infinite)?;
        let done = event.is_shutdown();
        if !done {
            debug!(tag = %event.tag(), kind = ?event.kind(), "drained leftover event");
            stats.events += 1;
        }
        cq.finish(event);
        if done {
            return Ok(stats);
        }
    }
}
