// Numan Thabit 2025
//! Seams between the call state machine and a concrete RPC transport.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::completion::{CompletionQueue, Deadline, Tag};

/// Per-operation flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteFlags(u32);

impl WriteFlags {
    pub const NONE: WriteFlags = WriteFlags(0);
    /// Hold the operation in the outgoing buffer until a later, unhinted
    /// operation on the same call flushes it.
    pub const BUFFER_HINT: WriteFlags = WriteFlags(0x1);
    const KNOWN: u32 = 0x1;

    pub fn from_bits(bits: u32) -> Self {
        WriteFlags(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: WriteFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_valid(self) -> bool {
        self.0 & !Self::KNOWN == 0
    }
}

/// Synchronous status returned when an operation is submitted. Anything
/// other than `Ok(())` means the operation was not started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("call already invoked")]
    AlreadyInvoked,
    #[error("call not invoked")]
    NotInvoked,
    #[error("writes already done on this call")]
    AlreadyFinished,
    #[error("an operation of this kind is already in flight")]
    TooManyOperations,
    #[error("invalid flags {0:#x}")]
    InvalidFlags(u32),
    #[error("deadline not supported by this transport")]
    UnsupportedDeadline,
    #[error("completion queue is shut down")]
    QueueShutdown,
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Factory for calls. Dropping the channel tears the transport down; calls
/// still alive at that point see their pending operations fail.
pub trait Channel {
    type Call: TransportCall;

    fn create_call(
        &self,
        method: &str,
        host: &str,
        deadline: Deadline,
    ) -> Result<Self::Call, CallError>;
}

/// One RPC exchange. Each accepted operation produces exactly one
/// completion on the queue bound at `invoke`, carrying the tag it was
/// submitted with. Dropping the handle destroys the call and completes
/// whatever is still pending.
pub trait TransportCall {
    /// Start the call. `metadata_tag` completes when the server's initial
    /// metadata arrives, `finished_tag` when the call terminates.
    fn invoke(
        &mut self,
        cq: &Arc<CompletionQueue>,
        metadata_tag: Tag,
        finished_tag: Tag,
        flags: WriteFlags,
    ) -> Result<(), CallError>;

    fn start_write(&mut self, payload: &Bytes, tag: Tag, flags: WriteFlags)
        -> Result<(), CallError>;

    fn start_read(&mut self, tag: Tag) -> Result<(), CallError>;

    fn writes_done(&mut self, tag: Tag) -> Result<(), CallError>;
}
