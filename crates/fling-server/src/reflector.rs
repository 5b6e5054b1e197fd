// Numan Thabit 2025
//! Per-connection call table and the echo logic behind it.

use std::collections::HashMap;
use std::io;

use fling_wire::{
    encode_frame_into, Frame, StatusCode, WireError, METHOD_REFLECT_STREAM, METHOD_REFLECT_UNARY,
};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum ReflectError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("call {0} invoked twice")]
    DuplicateCall(u64),
    #[error("client sent server-only frame {0:?}")]
    UnexpectedFrame(Frame),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Unary,
    Stream,
}

impl Method {
    fn resolve(path: &str) -> Option<Self> {
        match path {
            METHOD_REFLECT_UNARY => Some(Method::Unary),
            METHOD_REFLECT_STREAM => Some(Method::Stream),
            _ => None,
        }
    }
}

/// Counters reported when a connection closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReflectStats {
    pub calls_opened: u64,
    pub calls_rejected: u64,
    pub messages_echoed: u64,
}

/// Call state for one client connection. Replies are appended to the
/// caller's output buffer so several can leave in one write.
#[derive(Debug)]
pub struct Reflector {
    calls: HashMap<u64, Method>,
    max_calls: usize,
    stats: ReflectStats,
}

impl Reflector {
    pub fn new(max_calls: usize) -> Self {
        Self {
            calls: HashMap::new(),
            max_calls,
            stats: ReflectStats::default(),
        }
    }

    pub fn live_calls(&self) -> usize {
        self.calls.len()
    }

    pub fn stats(&self) -> ReflectStats {
        self.stats
    }

    pub fn handle(&mut self, frame: Frame, out: &mut Vec<u8>) -> Result<(), ReflectError> {
        match frame {
            Frame::Invoke { call, method, host } => {
                if self.calls.contains_key(&call) {
                    return Err(ReflectError::DuplicateCall(call));
                }
                let Some(resolved) = Method::resolve(&method) else {
                    self.stats.calls_rejected += 1;
                    return reply_status(call, StatusCode::Unimplemented, &method, out);
                };
                if self.calls.len() >= self.max_calls {
                    self.stats.calls_rejected += 1;
                    return reply_status(call, StatusCode::Unavailable, "too many calls", out);
                }
                trace!(call, method = %method, host = %host, "call opened");
                self.calls.insert(call, resolved);
                self.stats.calls_opened += 1;
                encode_frame_into(&Frame::Metadata { call }, out)?;
            }
            Frame::Message { call, payload } => {
                if self.calls.contains_key(&call) {
                    self.stats.messages_echoed += 1;
                    encode_frame_into(&Frame::Message { call, payload }, out)?;
                } else {
                    trace!(call, "message for closed call dropped");
                }
            }
            Frame::HalfClose { call } => {
                if let Some(method) = self.calls.remove(&call) {
                    trace!(call, ?method, "call completed");
                    reply_status(call, StatusCode::Ok, "", out)?;
                }
            }
            Frame::Cancel { call } => {
                if self.calls.remove(&call).is_some() {
                    trace!(call, "call cancelled by client");
                }
            }
            other @ (Frame::Metadata { .. } | Frame::Status { .. }) => {
                return Err(ReflectError::UnexpectedFrame(other));
            }
        }
        Ok(())
    }
}

fn reply_status(
    call: u64,
    code: StatusCode,
    details: &str,
    out: &mut Vec<u8>,
) -> Result<(), ReflectError> {
    let frame = Frame::Status {
        call,
        code,
        details: details.to_string(),
    };
    encode_frame_into(&frame, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fling_wire::decode_frame_from_slice;

    fn replies(out: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut offset = 0;
        while let Some((frame, used)) = decode_frame_from_slice(&out[offset..]).unwrap() {
            frames.push(frame);
            offset += used;
        }
        assert_eq!(offset, out.len());
        frames
    }

    fn invoke(call: u64, method: &str) -> Frame {
        Frame::Invoke {
            call,
            method: method.to_string(),
            host: "localhost".to_string(),
        }
    }

    #[test]
    fn unary_call_echoes_then_completes() {
        let mut reflector = Reflector::new(4);
        let mut out = Vec::new();
        reflector
            .handle(invoke(1, METHOD_REFLECT_UNARY), &mut out)
            .unwrap();
        reflector
            .handle(
                Frame::Message {
                    call: 1,
                    payload: b"x".to_vec(),
                },
                &mut out,
            )
            .unwrap();
        reflector.handle(Frame::HalfClose { call: 1 }, &mut out).unwrap();

        let frames = replies(&out);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], Frame::Metadata { call: 1 });
        assert_eq!(
            frames[1],
            Frame::Message {
                call: 1,
                payload: b"x".to_vec()
            }
        );
        assert!(matches!(
            frames[2],
            Frame::Status {
                call: 1,
                code: StatusCode::Ok,
                ..
            }
        ));
        assert_eq!(reflector.live_calls(), 0);
        assert_eq!(reflector.stats().messages_echoed, 1);
    }

    #[test]
    fn unknown_method_is_unimplemented() {
        let mut reflector = Reflector::new(4);
        let mut out = Vec::new();
        reflector.handle(invoke(7, "/Nope/missing"), &mut out).unwrap();
        let frames = replies(&out);
        assert!(matches!(
            frames.as_slice(),
            [Frame::Status {
                call: 7,
                code: StatusCode::Unimplemented,
                ..
            }]
        ));
        assert_eq!(reflector.live_calls(), 0);
    }

    #[test]
    fn cancel_drops_call_silently() {
        let mut reflector = Reflector::new(4);
        let mut out = Vec::new();
        reflector
            .handle(invoke(2, METHOD_REFLECT_STREAM), &mut out)
            .unwrap();
        out.clear();
        reflector.handle(Frame::Cancel { call: 2 }, &mut out).unwrap();
        reflector
            .handle(
                Frame::Message {
                    call: 2,
                    payload: b"late".to_vec(),
                },
                &mut out,
            )
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(reflector.live_calls(), 0);
    }

    #[test]
    fn call_limit_answers_unavailable() {
        let mut reflector = Reflector::new(1);
        let mut out = Vec::new();
        reflector
            .handle(invoke(1, METHOD_REFLECT_STREAM), &mut out)
            .unwrap();
        out.clear();
        reflector
            .handle(invoke(2, METHOD_REFLECT_STREAM), &mut out)
            .unwrap();
        assert!(matches!(
            replies(&out).as_slice(),
            [Frame::Status {
                call: 2,
                code: StatusCode::Unavailable,
                ..
            }]
        ));
        assert_eq!(reflector.stats().calls_rejected, 1);
    }

    #[test]
    fn protocol_violations_are_errors() {
        let mut reflector = Reflector::new(4);
        let mut out = Vec::new();
        reflector
            .handle(invoke(1, METHOD_REFLECT_UNARY), &mut out)
            .unwrap();
        assert!(matches!(
            reflector.handle(invoke(1, METHOD_REFLECT_UNARY), &mut out),
            Err(ReflectError::DuplicateCall(1))
        ));
        assert!(matches!(
            reflector.handle(Frame::Metadata { call: 1 }, &mut out),
            Err(ReflectError::UnexpectedFrame(_))
        ));
    }
}
