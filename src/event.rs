//! Notifications delivered to the application by [`Session::poll_event`](crate::Session::poll_event).

use bytes::Bytes;

use crate::error::{H2Error, Reason};
use crate::frame::StreamId;
use crate::hpack::Header;
use crate::settings::Settings;

/// The stream a pushed stream was promised on, and the request it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promise {
    pub associated_stream_id: StreamId,
    pub request_headers: Vec<Header>,
}

/// Whose settings changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsOrigin {
    /// The peer acknowledged settings we sent.
    Local,
    /// We acknowledged settings the peer sent.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The peer opened a stream, or promised one with PUSH_PROMISE.
    StreamCreated {
        stream_id: StreamId,
        promised: Option<Promise>,
    },
    /// Initial or informational (1xx) headers.
    Headers {
        stream_id: StreamId,
        headers: Vec<Header>,
        end_stream: bool,
    },
    Data {
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
    },
    Trailers {
        stream_id: StreamId,
        headers: Vec<Header>,
    },
    /// The stream reached `closed`. `error` is set for resets and refusals.
    StreamClosed {
        stream_id: StreamId,
        error: Option<Reason>,
    },
    /// A settings batch was committed.
    SettingsChanged {
        origin: SettingsOrigin,
        settings: Settings,
    },
    GoawayReceived {
        last_stream_id: StreamId,
        error: Reason,
        debug_data: Bytes,
    },
    PingAck {
        payload: [u8; 8],
    },
    AltSvc {
        stream_id: StreamId,
        origin: Bytes,
        field_value: Bytes,
    },
    Origin {
        origins: Vec<Bytes>,
    },
    /// Buffered outbound data was dropped because the stream or session ended.
    SendCancelled {
        stream_id: StreamId,
        unsent: usize,
        error: H2Error,
    },
    /// The session hit a connection error and is closed. Delivered once.
    SessionError(H2Error),
}

impl Event {
    /// Stream the event is about, if any.
    pub fn stream_id(&self) -> Option<StreamId> {
        match self {
            Event::StreamCreated { stream_id, .. }
            | Event::Headers { stream_id, .. }
            | Event::Data { stream_id, .. }
            | Event::Trailers { stream_id, .. }
            | Event::StreamClosed { stream_id, .. }
            | Event::SendCancelled { stream_id, .. } => Some(*stream_id),
            Event::AltSvc { stream_id, .. } if *stream_id != 0 => Some(*stream_id),
            _ => None,
        }
    }
}
