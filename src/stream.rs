//! Stream state machine (RFC 7540 Section 5.1).

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;

use crate::error::Reason;
use crate::frame::StreamId;
use crate::hpack::Header;
use crate::priority::PrioritySpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

impl StreamState {
    pub fn is_closed(self) -> bool {
        self == StreamState::Closed
    }

    /// Open or half-closed in either direction.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            StreamState::Open | StreamState::HalfClosedLocal | StreamState::HalfClosedRemote
        )
    }

    /// We may still send DATA.
    pub fn can_send(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// The peer may still send DATA.
    pub fn can_recv(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// Apply `event` to this state.
    ///
    /// `Reset` is defined from every state; every other event either has a
    /// successor or is rejected, returning the state unchanged in `Err`.
    pub fn transition(self, event: Transition) -> Result<StreamState, StreamState> {
        use StreamState::*;
        use Transition::*;

        let next = match (self, event) {
            (_, Reset) => Closed,

            (Idle, SendHeaders { end_stream: false }) => Open,
            (Idle, SendHeaders { end_stream: true }) => HalfClosedLocal,
            (Idle, RecvHeaders { end_stream: false }) => Open,
            (Idle, RecvHeaders { end_stream: true }) => HalfClosedRemote,
            (Idle, SendPushPromise) => ReservedLocal,
            (Idle, RecvPushPromise) => ReservedRemote,

            (ReservedLocal, SendHeaders { end_stream: false }) => HalfClosedRemote,
            (ReservedLocal, SendHeaders { end_stream: true }) => Closed,
            (ReservedRemote, RecvHeaders { end_stream: false }) => HalfClosedLocal,
            (ReservedRemote, RecvHeaders { end_stream: true }) => Closed,

            (Open, SendHeaders { end_stream }) | (Open, RecvHeaders { end_stream }) if !end_stream => Open,
            (Open, SendHeaders { .. }) | (Open, SendEndStream) => HalfClosedLocal,
            (Open, RecvHeaders { .. }) | (Open, RecvEndStream) => HalfClosedRemote,

            (HalfClosedLocal, RecvHeaders { end_stream: false }) => HalfClosedLocal,
            (HalfClosedLocal, RecvHeaders { end_stream: true }) | (HalfClosedLocal, RecvEndStream) => Closed,
            (HalfClosedRemote, SendHeaders { end_stream: false }) => HalfClosedRemote,
            (HalfClosedRemote, SendHeaders { end_stream: true }) | (HalfClosedRemote, SendEndStream) => Closed,

            (state, _) => return Err(state),
        };
        Ok(next)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Idle => "idle",
            StreamState::ReservedLocal => "reserved (local)",
            StreamState::ReservedRemote => "reserved (remote)",
            StreamState::Open => "open",
            StreamState::HalfClosedLocal => "half-closed (local)",
            StreamState::HalfClosedRemote => "half-closed (remote)",
            StreamState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Events that move a stream between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// RST_STREAM sent or received.
    Reset,
    SendHeaders { end_stream: bool },
    RecvHeaders { end_stream: bool },
    SendEndStream,
    RecvEndStream,
    SendPushPromise,
    RecvPushPromise,
}

/// One stream as the session sees it.
#[derive(Debug)]
pub struct Stream {
    id: StreamId,
    state: StreamState,
    priority: PrioritySpec,
    reset_code: Option<Reason>,
    /// Trailers to send once buffered DATA has drained.
    pending_trailers: Option<Vec<Header>>,
    outbound: VecDeque<Bytes>,
    outbound_len: usize,
    end_stream_queued: bool,
    /// Final (non-1xx) headers were received.
    pub(crate) final_headers_received: bool,
    /// Final headers were sent.
    pub(crate) final_headers_sent: bool,
}

impl Stream {
    pub fn new(id: StreamId) -> Self {
        Self {
            id,
            state: StreamState::Idle,
            priority: PrioritySpec::default(),
            reset_code: None,
            pending_trailers: None,
            outbound: VecDeque::new(),
            outbound_len: 0,
            end_stream_queued: false,
            final_headers_received: false,
            final_headers_sent: false,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn priority(&self) -> PrioritySpec {
        self.priority
    }

    pub fn reset_code(&self) -> Option<Reason> {
        self.reset_code
    }

    pub fn has_pending_trailers(&self) -> bool {
        self.pending_trailers.is_some()
    }

    pub(crate) fn set_priority(&mut self, priority: PrioritySpec) {
        self.priority = priority;
    }

    pub(crate) fn set_dependency(&mut self, parent: StreamId) {
        self.priority.dependency = parent;
    }

    /// Drive the state machine; on an illegal event the state is left alone.
    pub(crate) fn apply(&mut self, event: Transition) -> Result<StreamState, StreamState> {
        self.state = self.state.transition(event)?;
        Ok(self.state)
    }

    /// Move straight to `closed`, recording `reason`.
    ///
    /// Returns the bytes that were still buffered for sending.
    pub(crate) fn reset(&mut self, reason: Reason) -> usize {
        self.state = StreamState::Closed;
        self.reset_code = Some(reason);
        self.discard_outbound()
    }

    // ===== outbound buffer =====

    pub(crate) fn queue_data(&mut self, data: Bytes, end_stream: bool) {
        if !data.is_empty() {
            self.outbound_len += data.len();
            self.outbound.push_back(data);
        }
        self.end_stream_queued |= end_stream;
    }

    pub(crate) fn queue_trailers(&mut self, trailers: Vec<Header>) {
        self.pending_trailers = Some(trailers);
        self.end_stream_queued = true;
    }

    pub fn buffered_len(&self) -> usize {
        self.outbound_len
    }

    pub(crate) fn end_stream_queued(&self) -> bool {
        self.end_stream_queued
    }

    /// Whether anything (data, trailers or a bare END_STREAM) is waiting.
    pub(crate) fn has_outbound(&self) -> bool {
        self.outbound_len > 0 || self.end_stream_queued
    }

    /// Length of the next buffered chunk.
    pub(crate) fn front_len(&self) -> usize {
        self.outbound.front().map_or(0, Bytes::len)
    }

    /// Take up to `max` bytes from the front of the buffer.
    pub(crate) fn next_chunk(&mut self, max: usize) -> Option<Bytes> {
        let front = self.outbound.front_mut()?;
        let chunk = if front.len() <= max {
            self.outbound.pop_front()?
        } else {
            front.split_to(max)
        };
        self.outbound_len -= chunk.len();
        Some(chunk)
    }

    /// Called once END_STREAM (or trailers) has gone out.
    pub(crate) fn take_trailers(&mut self) -> Option<Vec<Header>> {
        self.end_stream_queued = false;
        self.pending_trailers.take()
    }

    pub(crate) fn discard_outbound(&mut self) -> usize {
        let unsent = self.outbound_len;
        self.outbound.clear();
        self.outbound_len = 0;
        self.pending_trailers = None;
        self.end_stream_queued = false;
        unsent
    }
}
