// Numan Thabit 2025
//! Call lifecycle tracking on top of a [`TransportCall`].
//!
//! Unary calls walk `Idle -> Invoked -> WriteIssued -> AwaitComplete -> Idle`;
//! streaming calls walk `Idle -> Invoked -> Streaming` and stay there. Every
//! submitted operation is remembered until its completion is observed, so a
//! call can always be drained by its own accounting instead of a fixed event
//! count.

use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use crate::completion::{Completion, CompletionQueue, Deadline, Event, EventKind, OpKind, Tag};
use crate::error::FlingError;
use crate::transport::{CallError, Channel, TransportCall, WriteFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Invoked,
    WriteIssued,
    AwaitComplete,
    Streaming,
    Closed,
}

pub struct TrackedCall<C: TransportCall> {
    call: C,
    serial: u64,
    state: CallState,
    pending: Vec<OpKind>,
    last_read: Option<Bytes>,
}

impl<C: TransportCall> TrackedCall<C> {
    /// Create a call with an unbounded deadline.
    pub fn create<Ch>(channel: &Ch, serial: u64, method: &str, host: &str) -> Result<Self, FlingError>
    where
        Ch: Channel<Call = C>,
    {
        let call = channel
            .create_call(method, host, Deadline::Infinite)
            .map_err(|source| FlingError::Create {
                method: method.to_string(),
                source,
            })?;
        trace!(serial, method, "call created");
        Ok(Self {
            call,
            serial,
            state: CallState::Idle,
            pending: Vec::with_capacity(5),
            last_read: None,
        })
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// Operations submitted whose completion has not been observed yet.
    pub fn pending(&self) -> &[OpKind] {
        &self.pending
    }

    pub fn last_read(&self) -> Option<&Bytes> {
        self.last_read.as_ref()
    }

    pub fn invoke(&mut self, cq: &Arc<CompletionQueue>, flags: WriteFlags) -> Result<(), FlingError> {
        self.expect_state(OpKind::Metadata, &[CallState::Idle])?;
        let metadata_tag = self.claim(OpKind::Metadata)?;
        let finished_tag = self.claim(OpKind::Finished)?;
        let result = self.call.invoke(cq, metadata_tag, finished_tag, flags);
        self.submitted(OpKind::Metadata, result)?;
        self.pending.push(OpKind::Finished);
        self.state = CallState::Invoked;
        Ok(())
    }

    pub fn start_write(&mut self, payload: &Bytes, flags: WriteFlags) -> Result<(), FlingError> {
        self.expect_state(OpKind::Write, &[CallState::Invoked, CallState::Streaming])?;
        let tag = self.claim(OpKind::Write)?;
        let result = self.call.start_write(payload, tag, flags);
        self.submitted(OpKind::Write, result)?;
        if self.state == CallState::Invoked {
            self.state = CallState::WriteIssued;
        }
        Ok(())
    }

    pub fn start_read(&mut self) -> Result<(), FlingError> {
        self.expect_state(
            OpKind::Read,
            &[
                CallState::WriteIssued,
                CallState::AwaitComplete,
                CallState::Streaming,
            ],
        )?;
        let tag = self.claim(OpKind::Read)?;
        let result = self.call.start_read(tag);
        self.submitted(OpKind::Read, result)
    }

    pub fn writes_done(&mut self) -> Result<(), FlingError> {
        self.expect_state(
            OpKind::WritesDone,
            &[CallState::WriteIssued, CallState::Streaming],
        )?;
        let tag = self.claim(OpKind::WritesDone)?;
        let result = self.call.writes_done(tag);
        self.submitted(OpKind::WritesDone, result)?;
        self.state = CallState::AwaitComplete;
        Ok(())
    }

    /// Invoke without buffering and wait for the server's metadata; the call
    /// is then ready for back-to-back write/read pairs.
    pub fn open_stream(&mut self, cq: &Arc<CompletionQueue>) -> Result<(), FlingError> {
        self.invoke(cq, WriteFlags::NONE)?;
        self.await_ops(cq, &[OpKind::Metadata])?;
        self.state = CallState::Streaming;
        Ok(())
    }

    /// Block until every op in `wanted` has completed, in any order. Other
    /// pending ops of this call that complete meanwhile are accepted too;
    /// anything else is an invariant violation.
    pub fn await_ops(&mut self, cq: &CompletionQueue, wanted: &[OpKind]) -> Result<(), FlingError> {
        for op in wanted {
            if !self.pending.contains(op) {
                return Err(FlingError::NotPending {
                    op: *op,
                    serial: self.serial,
                });
            }
        }
        let mut remaining = wanted.len();
        let mut seen = [false; 8];
        while remaining > 0 {
            let event = cq.next(Deadline::Infinite)?;
            let outcome = self.accept(&event);
            cq.finish(event);
            let op = outcome?;
            if wanted.contains(&op) && !seen[op as usize] {
                seen[op as usize] = true;
                remaining -= 1;
            }
        }
        Ok(())
    }

    /// Wait until nothing issued on this call is outstanding.
    pub fn drain_outstanding(&mut self, cq: &CompletionQueue) -> Result<(), FlingError> {
        while !self.pending.is_empty() {
            let wanted = self.pending.clone();
            self.await_ops(cq, &wanted)?;
        }
        if self.state == CallState::AwaitComplete {
            self.state = CallState::Idle;
        }
        Ok(())
    }

    /// Destroy the transport call. Returns how many operations were still
    /// pending; their completions arrive on the queue afterwards.
    pub fn destroy(mut self) -> usize {
        self.state = CallState::Closed;
        let leftover = self.pending.len();
        trace!(serial = self.serial, leftover, "call destroyed");
        leftover
    }

    fn expect_state(&self, op: OpKind, allowed: &[CallState]) -> Result<(), FlingError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(FlingError::IllegalTransition {
                op,
                serial: self.serial,
                state: self.state,
            })
        }
    }

    fn claim(&self, op: OpKind) -> Result<Tag, FlingError> {
        let tag = Tag::for_op(self.serial, op);
        if self.pending.contains(&op) {
            return Err(FlingError::AlreadyPending {
                op,
                serial: self.serial,
                tag,
            });
        }
        Ok(tag)
    }

    fn submitted(&mut self, op: OpKind, result: Result<(), CallError>) -> Result<(), FlingError> {
        result.map_err(|source| FlingError::Rejected {
            op,
            serial: self.serial,
            source,
        })?;
        self.pending.push(op);
        Ok(())
    }

    fn accept(&mut self, event: &Event) -> Result<OpKind, FlingError> {
        let tag = event.tag();
        let completion = match event.kind() {
            EventKind::OpComplete(completion) => completion,
            other => return Err(self.unexpected(format!("{other:?}"))),
        };
        let op = completion.op();
        if tag.serial() != self.serial || tag.op() != Some(op) {
            return Err(self.unexpected(format!("{op} with tag {tag}")));
        }
        let Some(idx) = self.pending.iter().position(|p| *p == op) else {
            return Err(self.unexpected(format!("{op} not pending (tag {tag})")));
        };
        self.pending.swap_remove(idx);
        trace!(serial = self.serial, %op, "completion accepted");

        match completion {
            Completion::ClientMetadataRead { success }
            | Completion::WriteAccepted { success }
            | Completion::FinishAccepted { success } => {
                if !*success {
                    return Err(FlingError::OpFailed {
                        op,
                        serial: self.serial,
                    });
                }
            }
            Completion::Read(Some(message)) => self.last_read = Some(message.clone()),
            Completion::Read(None) => {
                return Err(FlingError::StreamEnded {
                    serial: self.serial,
                })
            }
            Completion::Finished { status, details } => {
                if !status.is_ok() {
                    return Err(FlingError::CallFailed {
                        serial: self.serial,
                        code: *status,
                        details: details.clone(),
                    });
                }
            }
        }
        Ok(op)
    }

    fn unexpected(&self, event: String) -> FlingError {
        FlingError::UnexpectedEvent {
            serial: self.serial,
            state: self.state,
            event,
        }
    }
}
