// Numan Thabit 2025
//! In-memory transport that reflects writes back, for driving the call
//! state machine without sockets.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use fling::completion::{Completion, CompletionQueue, Deadline, OpKind, Tag};
use fling::transport::{CallError, Channel, TransportCall, WriteFlags};
use fling_wire::StatusCode;
use parking_lot::Mutex;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MockCounts {
    pub created: u64,
    pub destroyed: u64,
    pub writes: u64,
    pub reads: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    counts: Arc<Mutex<MockCounts>>,
    fail_on: Option<OpKind>,
    reverse: bool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every submission of `op` with a transport error.
    pub fn failing_on(mut self, op: OpKind) -> Self {
        self.fail_on = Some(op);
        self
    }

    /// Report each flushed batch of server events in reverse order.
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn counts(&self) -> MockCounts {
        *self.counts.lock()
    }
}

impl Channel for MockChannel {
    type Call = MockCall;

    fn create_call(&self, _method: &str, _host: &str, deadline: Deadline) -> Result<MockCall, CallError> {
        assert_eq!(deadline, Deadline::Infinite);
        self.counts.lock().created += 1;
        Ok(MockCall {
            counts: self.counts.clone(),
            fail_on: self.fail_on,
            reverse: self.reverse,
            cq: None,
            metadata: None,
            finished: None,
            read: None,
            inbound: VecDeque::new(),
            server: Vec::new(),
        })
    }
}

enum ServerEvent {
    Metadata,
    Echo(Bytes),
    Status,
}

pub struct MockCall {
    counts: Arc<Mutex<MockCounts>>,
    fail_on: Option<OpKind>,
    reverse: bool,
    cq: Option<Arc<CompletionQueue>>,
    metadata: Option<Tag>,
    finished: Option<Tag>,
    read: Option<Tag>,
    inbound: VecDeque<Bytes>,
    server: Vec<ServerEvent>,
}

impl MockCall {
    fn check(&self, op: OpKind) -> Result<&Arc<CompletionQueue>, CallError> {
        if self.fail_on == Some(op) {
            return Err(CallError::Transport(format!("injected {op} failure")));
        }
        self.cq.as_ref().ok_or(CallError::NotInvoked)
    }

    /// Deliver everything the "server" produced since the last flush.
    fn flush(&mut self) {
        let Some(cq) = self.cq.clone() else {
            return;
        };
        let mut completions = Vec::new();
        for event in std::mem::take(&mut self.server) {
            match event {
                ServerEvent::Metadata => {
                    if let Some(tag) = self.metadata.take() {
                        completions.push((tag, Completion::ClientMetadataRead { success: true }));
                    }
                }
                ServerEvent::Echo(message) => match self.read.take() {
                    Some(tag) => completions.push((tag, Completion::Read(Some(message)))),
                    None => self.inbound.push_back(message),
                },
                ServerEvent::Status => {
                    if let Some(tag) = self.finished.take() {
                        completions.push((
                            tag,
                            Completion::Finished {
                                status: StatusCode::Ok,
                                details: String::new(),
                            },
                        ));
                    }
                }
            }
        }
        if self.reverse {
            completions.reverse();
        }
        for (tag, completion) in completions {
            cq.complete(tag, completion);
        }
    }
}

impl TransportCall for MockCall {
    fn invoke(
        &mut self,
        cq: &Arc<CompletionQueue>,
        metadata_tag: Tag,
        finished_tag: Tag,
        flags: WriteFlags,
    ) -> Result<(), CallError> {
        if self.cq.is_some() {
            return Err(CallError::AlreadyInvoked);
        }
        if self.fail_on == Some(OpKind::Metadata) {
            return Err(CallError::Transport("injected invoke failure".to_string()));
        }
        cq.begin_op().map_err(|_| CallError::QueueShutdown)?;
        cq.begin_op().map_err(|_| CallError::QueueShutdown)?;
        self.cq = Some(cq.clone());
        self.metadata = Some(metadata_tag);
        self.finished = Some(finished_tag);
        self.server.push(ServerEvent::Metadata);
        if !flags.contains(WriteFlags::BUFFER_HINT) {
            self.flush();
        }
        Ok(())
    }

    fn start_write(&mut self, payload: &Bytes, tag: Tag, flags: WriteFlags) -> Result<(), CallError> {
        let cq = self.check(OpKind::Write)?.clone();
        cq.post(tag, Completion::WriteAccepted { success: true })
            .map_err(|_| CallError::QueueShutdown)?;
        self.counts.lock().writes += 1;
        self.server.push(ServerEvent::Echo(payload.clone()));
        if !flags.contains(WriteFlags::BUFFER_HINT) {
            self.flush();
        }
        Ok(())
    }

    fn start_read(&mut self, tag: Tag) -> Result<(), CallError> {
        let cq = self.check(OpKind::Read)?.clone();
        if self.read.is_some() {
            return Err(CallError::TooManyOperations);
        }
        self.counts.lock().reads += 1;
        match self.inbound.pop_front() {
            Some(message) => cq
                .post(tag, Completion::Read(Some(message)))
                .map_err(|_| CallError::QueueShutdown)?,
            None => {
                cq.begin_op().map_err(|_| CallError::QueueShutdown)?;
                self.read = Some(tag);
            }
        }
        Ok(())
    }

    fn writes_done(&mut self, tag: Tag) -> Result<(), CallError> {
        let cq = self.check(OpKind::WritesDone)?.clone();
        cq.post(tag, Completion::FinishAccepted { success: true })
            .map_err(|_| CallError::QueueShutdown)?;
        self.server.push(ServerEvent::Status);
        self.flush();
        Ok(())
    }
}

impl Drop for MockCall {
    fn drop(&mut self) {
        self.counts.lock().destroyed += 1;
        let Some(cq) = self.cq.take() else {
            return;
        };
        if let Some(tag) = self.metadata.take() {
            cq.complete(tag, Completion::ClientMetadataRead { success: false });
        }
        if let Some(tag) = self.read.take() {
            cq.complete(tag, Completion::Read(None));
        }
        if let Some(tag) = self.finished.take() {
            cq.complete(
                tag,
                Completion::Finished {
                    status: StatusCode::Cancelled,
                    details: "call destroyed".to_string(),
                },
            );
        }
    }
}

pub fn context(channel: MockChannel) -> fling::CallContext<MockChannel> {
    fling::CallContext::new(
        channel,
        Arc::new(CompletionQueue::new()),
        Bytes::from_static(b"x"),
    )
}
