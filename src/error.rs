//! Error taxonomy for the session layer.
//!
//! HTTP/2 has a two-tier error model (RFC 7540 Section 5.4): connection errors
//! tear down the whole session, stream errors reset a single stream and leave
//! its siblings alone. [`H2Error::is_connection_error`] tells the two apart.

use std::fmt;

use thiserror::Error;

use crate::frame::StreamId;

/// An HTTP/2 error code (RFC 7540 Section 7).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reason(u32);

impl Reason {
    pub const NO_ERROR: Reason = Reason(0x0);
    pub const PROTOCOL_ERROR: Reason = Reason(0x1);
    pub const INTERNAL_ERROR: Reason = Reason(0x2);
    pub const FLOW_CONTROL_ERROR: Reason = Reason(0x3);
    pub const SETTINGS_TIMEOUT: Reason = Reason(0x4);
    pub const STREAM_CLOSED: Reason = Reason(0x5);
    pub const FRAME_SIZE_ERROR: Reason = Reason(0x6);
    pub const REFUSED_STREAM: Reason = Reason(0x7);
    pub const CANCEL: Reason = Reason(0x8);
    pub const COMPRESSION_ERROR: Reason = Reason(0x9);
    pub const CONNECT_ERROR: Reason = Reason(0xa);
    pub const ENHANCE_YOUR_CALM: Reason = Reason(0xb);
    pub const INADEQUATE_SECURITY: Reason = Reason(0xc);
    pub const HTTP_1_1_REQUIRED: Reason = Reason(0xd);

    pub const fn code(self) -> u32 {
        self.0
    }

    /// Short name of the code, `None` for codes outside RFC 7540.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0x0 => "NO_ERROR",
            0x1 => "PROTOCOL_ERROR",
            0x2 => "INTERNAL_ERROR",
            0x3 => "FLOW_CONTROL_ERROR",
            0x4 => "SETTINGS_TIMEOUT",
            0x5 => "STREAM_CLOSED",
            0x6 => "FRAME_SIZE_ERROR",
            0x7 => "REFUSED_STREAM",
            0x8 => "CANCEL",
            0x9 => "COMPRESSION_ERROR",
            0xa => "CONNECT_ERROR",
            0xb => "ENHANCE_YOUR_CALM",
            0xc => "INADEQUATE_SECURITY",
            0xd => "HTTP_1_1_REQUIRED",
            _ => return None,
        };
        Some(name)
    }
}

impl From<u32> for Reason {
    fn from(code: u32) -> Self {
        Reason(code)
    }
}

impl From<Reason> for u32 {
    fn from(reason: Reason) -> Self {
        reason.0
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Reason({:#x})", self.0),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Human readable description of an HTTP/2 error code.
pub fn error_string(code: u32) -> &'static str {
    match code {
        0x0 => "Graceful shutdown",
        0x1 => "Protocol error detected",
        0x2 => "Implementation fault",
        0x3 => "Flow-control limits exceeded",
        0x4 => "Settings not acknowledged",
        0x5 => "Frame received for closed stream",
        0x6 => "Frame size incorrect",
        0x7 => "Stream not processed",
        0x8 => "Stream cancelled",
        0x9 => "Compression state not updated",
        0xa => "TCP connection error for CONNECT method",
        0xb => "Processing capacity exceeded",
        0xc => "Negotiated TLS parameters not acceptable",
        0xd => "Use HTTP/1.1 for the request",
        _ => "Unknown error code",
    }
}

/// Raised by the window tracker.
///
/// A `stream_id` of 0 names the connection-level window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowControlError {
    #[error("window of stream {stream_id} exhausted: requested {requested}, available {available}")]
    Exhausted {
        stream_id: StreamId,
        requested: u32,
        available: i32,
    },
    #[error("window of stream {stream_id} would exceed 2^31-1")]
    Overflow { stream_id: StreamId },
}

impl FlowControlError {
    pub fn stream_id(&self) -> StreamId {
        match self {
            FlowControlError::Exhausted { stream_id, .. } | FlowControlError::Overflow { stream_id } => *stream_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum H2Error {
    /// Malformed or out-of-sequence input. Connection-fatal.
    #[error("protocol error ({reason}): {message}")]
    Protocol { reason: Reason, message: String },
    /// Flow-control, resource or timeout violation at connection scope. Connection-fatal.
    #[error("connection error ({reason}): {message}")]
    Connection { reason: Reason, message: String },
    /// Error scoped to one stream; the stream is reset and the session continues.
    #[error("stream {stream_id} error: {reason}")]
    Stream { stream_id: StreamId, reason: Reason },
    #[error("stream {stream_id} refused")]
    RefusedStream { stream_id: StreamId },
    /// A local send exceeded the available credit; retry once credit arrives.
    #[error(transparent)]
    FlowControl(#[from] FlowControlError),
    #[error("session is going away, last stream id {last_stream_id}")]
    GoingAway { last_stream_id: StreamId },
    #[error("session closed")]
    SessionClosed,
    #[error("unknown stream {0}")]
    UnknownStream(StreamId),
    #[error("stream {stream_id} cannot {operation} in its current state")]
    InvalidStreamState {
        stream_id: StreamId,
        operation: &'static str,
    },
    #[error("invalid stream id {0}")]
    InvalidStreamId(StreamId),
    #[error("invalid value {value} for setting {id:#x}")]
    InvalidSetting { id: u16, value: u32 },
    #[error("invalid priority for stream {0}")]
    InvalidPriority(StreamId),
    #[error("peer has disabled server push")]
    PushDisabled,
    #[error("stream ids exhausted")]
    StreamIdsExhausted,
}

impl H2Error {
    pub fn protocol(message: impl Into<String>) -> Self {
        H2Error::Protocol {
            reason: Reason::PROTOCOL_ERROR,
            message: message.into(),
        }
    }

    pub fn frame_size(message: impl Into<String>) -> Self {
        H2Error::Protocol {
            reason: Reason::FRAME_SIZE_ERROR,
            message: message.into(),
        }
    }

    pub fn compression(message: impl Into<String>) -> Self {
        H2Error::Protocol {
            reason: Reason::COMPRESSION_ERROR,
            message: message.into(),
        }
    }

    pub fn connection(reason: Reason, message: impl Into<String>) -> Self {
        H2Error::Connection {
            reason,
            message: message.into(),
        }
    }

    pub fn stream(stream_id: StreamId, reason: Reason) -> Self {
        H2Error::Stream { stream_id, reason }
    }

    /// True for errors that must tear down the whole session.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, H2Error::Protocol { .. } | H2Error::Connection { .. })
    }

    /// The error code that goes on the wire for this error.
    pub fn reason(&self) -> Reason {
        match self {
            H2Error::Protocol { reason, .. }
            | H2Error::Connection { reason, .. }
            | H2Error::Stream { reason, .. } => *reason,
            H2Error::RefusedStream { .. } | H2Error::GoingAway { .. } => Reason::REFUSED_STREAM,
            H2Error::FlowControl(_) => Reason::FLOW_CONTROL_ERROR,
            H2Error::SessionClosed => Reason::CANCEL,
            _ => Reason::INTERNAL_ERROR,
        }
    }

    /// Message carried in GOAWAY debug data when this error ends the session.
    pub(crate) fn debug_data(&self) -> Vec<u8> {
        match self {
            H2Error::Protocol { message, .. } | H2Error::Connection { message, .. } => message.as_bytes().to_vec(),
            other => other.to_string().into_bytes(),
        }
    }
}
