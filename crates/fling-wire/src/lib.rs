// Numan Thabit 2025
// crates/fling-wire/src/lib.rs
#![forbid(unsafe_code)]
//! Length-prefixed frame codec shared by the fling client channel and the
//! reflector server.

use bincode::Options;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

pub const FRAME_MAGIC: u32 = 0x464C_4E47; // 'FLNG'
pub const FRAME_VERSION: u16 = 1;
pub const FRAME_HEADER_LEN: usize = 12;
/// Upper bound on a single frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Unary echo: one request message, one response message, then status.
pub const METHOD_REFLECT_UNARY: &str = "/Reflector/reflectUnary";
/// Streaming echo: every message is reflected until the client half-closes.
pub const METHOD_REFLECT_STREAM: &str = "/Reflector/reflectStream";

const FRAME_HEADER_TEMPLATE: [u8; FRAME_HEADER_LEN] = [
    (FRAME_MAGIC >> 24) as u8,
    (FRAME_MAGIC >> 16) as u8,
    (FRAME_MAGIC >> 8) as u8,
    (FRAME_MAGIC) as u8,
    (FRAME_VERSION >> 8) as u8,
    (FRAME_VERSION) as u8,
    0,
    0,
    0,
    0,
    0,
    0,
];

/// Terminal status carried by a `Frame::Status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unavailable,
    Unimplemented,
    Internal,
}

impl StatusCode {
    pub fn is_ok(self) -> bool {
        matches!(self, StatusCode::Ok)
    }
}

/// Every message exchanged on a fling connection. `call` identifies the
/// client-allocated call the frame belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// Client opens a call.
    Invoke {
        call: u64,
        method: String,
        host: String,
    },
    /// Payload in either direction.
    Message {
        call: u64,
        #[serde(with = "serde_bytes")]
        payload: Vec<u8>,
    },
    /// Client will send no more messages on this call.
    HalfClose { call: u64 },
    /// Client abandoned the call.
    Cancel { call: u64 },
    /// Server accepted the call and sent its initial metadata.
    Metadata { call: u64 },
    /// Server closed the call.
    Status {
        call: u64,
        code: StatusCode,
        details: String,
    },
}

impl Frame {
    pub fn call(&self) -> u64 {
        match self {
            Frame::Invoke { call, .. }
            | Frame::Message { call, .. }
            | Frame::HalfClose { call }
            | Frame::Cancel { call }
            | Frame::Metadata { call }
            | Frame::Status { call, .. } => *call,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WireError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),
    #[error("bad magic or version")]
    BadHeader,
    #[error("frame length {len} exceeds max {max}")]
    TooLarge { len: usize, max: usize },
}

impl WireError {
    /// True when the peer closed the stream at a frame boundary or mid-frame.
    pub fn is_eof(&self) -> bool {
        matches!(self, WireError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Parsed fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: u16,
    pub len: usize,
}

impl FrameHeader {
    pub fn parse(hdr: &[u8; FRAME_HEADER_LEN]) -> Result<Self, WireError> {
        let magic = u32::from_be_bytes([hdr[0], hdr[1], hdr[2], hdr[3]]);
        let ver = u16::from_be_bytes([hdr[4], hdr[5]]);
        if magic != FRAME_MAGIC || ver != FRAME_VERSION {
            return Err(WireError::BadHeader);
        }
        let flags = u16::from_be_bytes([hdr[6], hdr[7]]);
        let len = u32::from_be_bytes([hdr[8], hdr[9], hdr[10], hdr[11]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(WireError::TooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        Ok(Self { flags, len })
    }
}

fn bincode_opts() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// Append one encoded frame to `buf`. Existing contents are preserved so
/// several frames can be coalesced into a single write.
pub fn encode_frame_into(frame: &Frame, buf: &mut Vec<u8>) -> Result<(), WireError> {
    let start = buf.len();
    buf.extend_from_slice(&FRAME_HEADER_TEMPLATE);
    if let Err(err) = bincode_opts().serialize_into(&mut *buf, frame) {
        buf.truncate(start);
        return Err(err.into());
    }
    let body_len = buf.len() - start - FRAME_HEADER_LEN;
    if body_len > MAX_FRAME_LEN {
        buf.truncate(start);
        return Err(WireError::TooLarge {
            len: body_len,
            max: MAX_FRAME_LEN,
        });
    }
    buf[start + 8..start + FRAME_HEADER_LEN].copy_from_slice(&(body_len as u32).to_be_bytes());
    Ok(())
}

pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::with_capacity(64);
    encode_frame_into(frame, &mut buf)?;
    Ok(buf)
}

/// Decode a frame body whose header has already been validated.
pub fn decode_body(body: &[u8]) -> Result<Frame, WireError> {
    Ok(bincode_opts().deserialize::<Frame>(body)?)
}

/// Blocking read of exactly one frame.
pub fn decode_frame(mut src: impl Read) -> Result<Frame, WireError> {
    let mut hdr = [0u8; FRAME_HEADER_LEN];
    src.read_exact(&mut hdr)?;
    let header = FrameHeader::parse(&hdr)?;
    let mut body = vec![0u8; header.len];
    src.read_exact(&mut body)?;
    decode_body(&body)
}

/// Decode from a byte slice. Returns `Ok(None)` when `src` does not yet hold
/// a complete frame, otherwise the frame and the number of bytes consumed.
pub fn decode_frame_from_slice(src: &[u8]) -> Result<Option<(Frame, usize)>, WireError> {
    if src.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let mut hdr = [0u8; FRAME_HEADER_LEN];
    hdr.copy_from_slice(&src[..FRAME_HEADER_LEN]);
    let header = FrameHeader::parse(&hdr)?;
    let total = FRAME_HEADER_LEN + header.len;
    if src.len() < total {
        return Ok(None);
    }
    let frame = decode_body(&src[FRAME_HEADER_LEN..total])?;
    Ok(Some((frame, total)))
}

pub fn write_frame(mut dst: impl Write, frame: &Frame) -> Result<(), WireError> {
    let buf = encode_frame(frame)?;
    dst.write_all(&buf)?;
    Ok(())
}
