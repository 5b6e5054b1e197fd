// Numan Thabit 2025
use fling_wire::StatusCode;
use thiserror::Error;

use crate::call::CallState;
use crate::completion::{OpKind, QueueError, Tag};
use crate::histogram::HistogramError;
use crate::transport::CallError;

/// Broken invariant observed while driving calls. A run that hits one of
/// these cannot produce a trustworthy latency sample; the client binary
/// aborts on all of them.
#[derive(Debug, Error)]
pub enum FlingError {
    #[error("{op} rejected on call {serial}: {source}")]
    Rejected {
        op: OpKind,
        serial: u64,
        #[source]
        source: CallError,
    },
    #[error("could not create call for {method}: {source}")]
    Create {
        method: String,
        #[source]
        source: CallError,
    },
    #[error("{op} completed unsuccessfully on call {serial}")]
    OpFailed { op: OpKind, serial: u64 },
    #[error("call {serial} finished with {code:?}: {details}")]
    CallFailed {
        serial: u64,
        code: StatusCode,
        details: String,
    },
    #[error("server closed call {serial} before replying")]
    StreamEnded { serial: u64 },
    #[error("unexpected event {event} on call {serial} in state {state:?}")]
    UnexpectedEvent {
        serial: u64,
        state: CallState,
        event: String,
    },
    #[error("{op} not allowed on call {serial} in state {state:?}")]
    IllegalTransition {
        op: OpKind,
        serial: u64,
        state: CallState,
    },
    #[error("waiting for {op} on call {serial} which was never issued")]
    NotPending { op: OpKind, serial: u64 },
    #[error("{op} already in flight on call {serial} (tag {tag})")]
    AlreadyPending { op: OpKind, serial: u64, tag: Tag },
    #[error("a call is already live")]
    CallAlreadyLive,
    #[error("no live call")]
    NoLiveCall,
    #[error("channel already destroyed")]
    ChannelClosed,
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Histogram(#[from] HistogramError),
}
