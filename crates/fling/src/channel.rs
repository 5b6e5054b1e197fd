// Numan Thabit 2025
//! Plain TCP channel speaking the `fling-wire` framing.
//!
//! The benchmark thread encodes outgoing frames into a shared buffer and
//! flushes it on every unhinted operation. A dedicated reader thread decodes
//! server frames and completes the matching tags on each call's queue.

use std::collections::{HashMap, VecDeque};
use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use fling_wire::{decode_frame, encode_frame_into, Frame, StatusCode};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::completion::{Completion, CompletionQueue, Deadline, Tag};
use crate::transport::{CallError, Channel, TransportCall, WriteFlags};

const OUTBOUND_CAPACITY: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },
    #[error("socket setup failed: {0}")]
    Socket(#[from] std::io::Error),
}

pub struct TcpChannel {
    shared: Arc<Shared>,
    reader: Option<JoinHandle<()>>,
    peer: SocketAddr,
}

struct Shared {
    stream: TcpStream,
    outbound: Mutex<Outbound>,
    calls: Mutex<HashMap<u64, CallSlot>>,
    next_call: AtomicU64,
    closing: AtomicBool,
}

struct Outbound {
    writer: TcpStream,
    buf: Vec<u8>,
}

/// Reader-side view of one call: which tags are waiting on server frames.
struct CallSlot {
    cq: Arc<CompletionQueue>,
    metadata: Option<Tag>,
    finished: Option<Tag>,
    read: Option<Tag>,
    inbound: VecDeque<Bytes>,
    closed: bool,
}

impl CallSlot {
    /// Complete everything still waiting, as if the server ended the call
    /// with `code`.
    fn close(&mut self, code: StatusCode, details: &str) {
        self.closed = true;
        if let Some(tag) = self.metadata.take() {
            self.cq.complete(
                tag,
                Completion::ClientMetadataRead {
                    success: code.is_ok(),
                },
            );
        }
        if let Some(tag) = self.read.take() {
            self.cq.complete(tag, Completion::Read(None));
        }
        if let Some(tag) = self.finished.take() {
            self.cq.complete(
                tag,
                Completion::Finished {
                    status: code,
                    details: details.to_string(),
                },
            );
        }
    }
}

impl TcpChannel {
    pub fn connect(target: &str) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect(target).map_err(|source| ChannelError::Connect {
            target: target.to_string(),
            source,
        })?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let writer = stream.try_clone()?;
        let read_half = stream.try_clone()?;

        let shared = Arc::new(Shared {
            stream,
            outbound: Mutex::new(Outbound {
                writer,
                buf: Vec::with_capacity(OUTBOUND_CAPACITY),
            }),
            calls: Mutex::new(HashMap::new()),
            next_call: AtomicU64::new(1),
            closing: AtomicBool::new(false),
        });

        let reader_shared = shared.clone();
        let reader = thread::Builder::new()
            .name("fling-reader".to_string())
            .spawn(move || read_loop(reader_shared, read_half))?;

        info!(%peer, "channel connected");
        Ok(Self {
            shared,
            reader: Some(reader),
            peer,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.shared.closing.store(true, Ordering::Release);
        if let Err(err) = self.shared.stream.shutdown(Shutdown::Both) {
            debug!(%err, "socket shutdown failed");
        }
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("reader thread panicked");
            }
        }
        debug!(peer = %self.peer, "channel destroyed");
    }
}

impl Channel for TcpChannel {
    type Call = TcpCall;

    fn create_call(&self, method: &str, host: &str, deadline: Deadline) -> Result<TcpCall, CallError> {
        if deadline != Deadline::Infinite {
            return Err(CallError::UnsupportedDeadline);
        }
        if self.shared.closing.load(Ordering::Acquire) {
            return Err(CallError::Transport("channel is closing".to_string()));
        }
        let id = self.shared.next_call.fetch_add(1, Ordering::Relaxed);
        Ok(TcpCall {
            id,
            shared: self.shared.clone(),
            method: method.to_string(),
            host: host.to_string(),
            invoked: false,
            half_closed: false,
        })
    }
}

pub struct TcpCall {
    id: u64,
    shared: Arc<Shared>,
    method: String,
    host: String,
    invoked: bool,
    half_closed: bool,
}

impl TcpCall {
    /// Queue `frame` and flush unless the caller asked to hold it.
    fn send(&self, frame: &Frame, flags: WriteFlags) -> Result<(), CallError> {
        let mut out = self.shared.outbound.lock();
        encode_frame_into(frame, &mut out.buf).map_err(|err| CallError::Transport(err.to_string()))?;
        if flags.contains(WriteFlags::BUFFER_HINT) {
            return Ok(());
        }
        let Outbound { writer, buf } = &mut *out;
        let result = writer.write_all(buf);
        buf.clear();
        result.map_err(|err| CallError::Transport(err.to_string()))
    }

    fn check_flags(flags: WriteFlags) -> Result<(), CallError> {
        if flags.is_valid() {
            Ok(())
        } else {
            Err(CallError::InvalidFlags(flags.bits()))
        }
    }

    fn slot_cq(&self) -> Result<Arc<CompletionQueue>, CallError> {
        let calls = self.shared.calls.lock();
        calls
            .get(&self.id)
            .map(|slot| slot.cq.clone())
            .ok_or(CallError::NotInvoked)
    }
}

impl TransportCall for TcpCall {
    fn invoke(
        &mut self,
        cq: &Arc<CompletionQueue>,
        metadata_tag: Tag,
        finished_tag: Tag,
        flags: WriteFlags,
    ) -> Result<(), CallError> {
        if self.invoked {
            return Err(CallError::AlreadyInvoked);
        }
        Self::check_flags(flags)?;
        cq.begin_op().map_err(|_| CallError::QueueShutdown)?;
        if cq.begin_op().is_err() {
            cq.complete(metadata_tag, Completion::ClientMetadataRead { success: false });
            return Err(CallError::QueueShutdown);
        }
        self.shared.calls.lock().insert(
            self.id,
            CallSlot {
                cq: cq.clone(),
                metadata: Some(metadata_tag),
                finished: Some(finished_tag),
                read: None,
                inbound: VecDeque::new(),
                closed: false,
            },
        );
        self.invoked = true;
        trace!(call = self.id, method = %self.method, "invoke");
        // A send failure surfaces through the reader thread, which fails
        // both tags once the socket is torn down.
        self.send(
            &Frame::Invoke {
                call: self.id,
                method: self.method.clone(),
                host: self.host.clone(),
            },
            flags,
        )
    }

    fn start_write(&mut self, payload: &Bytes, tag: Tag, flags: WriteFlags) -> Result<(), CallError> {
        if !self.invoked {
            return Err(CallError::NotInvoked);
        }
        if self.half_closed {
            return Err(CallError::AlreadyFinished);
        }
        Self::check_flags(flags)?;
        let cq = self.slot_cq()?;
        cq.begin_op().map_err(|_| CallError::QueueShutdown)?;
        let sent = self.send(
            &Frame::Message {
                call: self.id,
                payload: payload.to_vec(),
            },
            flags,
        );
        cq.complete(
            tag,
            Completion::WriteAccepted {
                success: sent.is_ok(),
            },
        );
        sent
    }

    fn start_read(&mut self, tag: Tag) -> Result<(), CallError> {
        if !self.invoked {
            return Err(CallError::NotInvoked);
        }
        let mut calls = self.shared.calls.lock();
        let slot = calls.get_mut(&self.id).ok_or(CallError::NotInvoked)?;
        if slot.read.is_some() {
            return Err(CallError::TooManyOperations);
        }
        slot.cq.begin_op().map_err(|_| CallError::QueueShutdown)?;
        if let Some(message) = slot.inbound.pop_front() {
            slot.cq.complete(tag, Completion::Read(Some(message)));
        } else if slot.closed {
            slot.cq.complete(tag, Completion::Read(None));
        } else {
            slot.read = Some(tag);
        }
        Ok(())
    }

    fn writes_done(&mut self, tag: Tag) -> Result<(), CallError> {
        if !self.invoked {
            return Err(CallError::NotInvoked);
        }
        if self.half_closed {
            return Err(CallError::AlreadyFinished);
        }
        let cq = self.slot_cq()?;
        cq.begin_op().map_err(|_| CallError::QueueShutdown)?;
        self.half_closed = true;
        let sent = self.send(&Frame::HalfClose { call: self.id }, WriteFlags::NONE);
        cq.complete(
            tag,
            Completion::FinishAccepted {
                success: sent.is_ok(),
            },
        );
        sent
    }
}

impl Drop for TcpCall {
    fn drop(&mut self) {
        if !self.invoked {
            return;
        }
        let slot = self.shared.calls.lock().remove(&self.id);
        let Some(mut slot) = slot else {
            return;
        };
        if !slot.closed && !self.shared.closing.load(Ordering::Acquire) {
            if let Err(err) = self.send(&Frame::Cancel { call: self.id }, WriteFlags::NONE) {
                debug!(call = self.id, %err, "cancel not delivered");
            }
        }
        slot.close(StatusCode::Cancelled, "call destroyed");
    }
}

fn read_loop(shared: Arc<Shared>, stream: TcpStream) {
    let mut reader = BufReader::new(stream);
    loop {
        match decode_frame(&mut reader) {
            Ok(frame) => dispatch(&shared, frame),
            Err(err) => {
                if shared.closing.load(Ordering::Acquire) || err.is_eof() {
                    debug!(%err, "reader stopped");
                } else {
                    warn!(%err, "reader failed; failing pending calls");
                }
                break;
            }
        }
    }
    let mut calls = shared.calls.lock();
    for (_, slot) in calls.iter_mut() {
        slot.close(StatusCode::Unavailable, "connection closed");
    }
}

fn dispatch(shared: &Shared, frame: Frame) {
    let call = frame.call();
    let mut calls = shared.calls.lock();
    let Some(slot) = calls.get_mut(&call) else {
        trace!(call, "frame for unknown call dropped");
        return;
    };
    match frame {
        Frame::Metadata { .. } => {
            if let Some(tag) = slot.metadata.take() {
                slot.cq.complete(tag, Completion::ClientMetadataRead { success: true });
            }
        }
        Frame::Message { payload, .. } => {
            let message = Bytes::from(payload);
            match slot.read.take() {
                Some(tag) => slot.cq.complete(tag, Completion::Read(Some(message))),
                None => slot.inbound.push_back(message),
            }
        }
        Frame::Status { code, details, .. } => slot.close(code, &details),
        other => warn!(call, frame = ?other, "client-bound frame not expected from server"),
    }
}
