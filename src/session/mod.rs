//! The HTTP/2 session: one connection and every stream multiplexed on it.
//!
//! A [`Session`] is a sans-I/O state machine. Bytes from the peer go in through
//! [`Session::receive`]; frames to send accumulate in an outbound buffer that
//! the caller drains with [`Session::take_outbound`] or [`Session::flush`];
//! everything the application needs to know comes out of
//! [`Session::poll_event`]. All mutation happens through `&mut Session`.

mod inbound;
mod outbound;

use std::collections::VecDeque;
use std::io;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::codec::FrameCodec;
use crate::config::SessionConfig;
use crate::error::{H2Error, Reason};
use crate::event::Event;
use crate::flow::{WindowTracker, DEFAULT_WINDOW_SIZE};
use crate::frame::{Frame, StreamId, CONNECTION_PREFACE};
use crate::hpack::{Header, HpackDecoder, HpackEncoder};
use crate::priority::PrioritySpec;
use crate::settings::{SettingId, Settings, SettingsNegotiator};
use crate::stream::{StreamState, Transition};
use crate::table::StreamTable;

pub use crate::table::Role;

/// Ordered, reliable byte sink the session writes frames to.
pub trait Transport {
    fn write(&mut self, data: &[u8]) -> io::Result<()>;
}

impl Transport for Vec<u8> {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }
}

/// Last stream ids carried by GOAWAY frames in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoawayState {
    pub sent: Option<StreamId>,
    pub received: Option<StreamId>,
}

impl GoawayState {
    pub fn is_going_away(&self) -> bool {
        self.sent.is_some() || self.received.is_some()
    }
}

/// Snapshot of session-level state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub role: Role,
    /// Credit the peer has granted us on the connection.
    pub send_window: i32,
    /// Credit we have granted the peer on the connection.
    pub recv_window: i32,
    pub local_window_target: u32,
    pub next_stream_id: StreamId,
    pub last_peer_stream_id: StreamId,
    pub active_streams: usize,
    pub retained_streams: usize,
    pub buffered_bytes: usize,
    pub outbound_bytes: usize,
    pub pending_local_settings: bool,
    pub goaway: GoawayState,
    pub closed: bool,
}

/// Snapshot of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStats {
    pub id: StreamId,
    pub state: StreamState,
    pub priority: PrioritySpec,
    pub send_window: Option<i32>,
    pub recv_window: Option<i32>,
    pub buffered_bytes: usize,
    pub reset_code: Option<Reason>,
}

#[derive(Debug)]
pub struct Session {
    role: Role,
    config: SessionConfig,
    codec: FrameCodec,
    encoder: HpackEncoder,
    decoder: HpackDecoder,
    settings: SettingsNegotiator,
    streams: StreamTable,
    /// Credit granted by the peer.
    send_flow: WindowTracker,
    /// Credit granted to the peer.
    recv_flow: WindowTracker,
    recv_connection_target: u32,
    /// Initial stream window currently applied to `recv_flow`.
    recv_initial_window: u32,
    goaway: GoawayState,
    outbound: BytesMut,
    events: VecDeque<Event>,
    closed: bool,
}

impl Session {
    pub fn client(config: SessionConfig) -> Result<Self, H2Error> {
        Self::new(Role::Client, config)
    }

    pub fn server(config: SessionConfig) -> Result<Self, H2Error> {
        Self::new(Role::Server, config)
    }

    /// Create a session and queue the connection preface (clients) and our
    /// initial SETTINGS frame.
    pub fn new(role: Role, config: SessionConfig) -> Result<Self, H2Error> {
        config.validate()?;

        let mut codec = match role {
            Role::Client => FrameCodec::new(),
            Role::Server => FrameCodec::expecting_preface(),
        };
        codec.set_max_header_block_size(config.max_header_block_size);

        let mut session = Session {
            role,
            streams: StreamTable::new(role, config.closed_stream_retention),
            codec,
            encoder: HpackEncoder::new(),
            decoder: HpackDecoder::new(),
            settings: SettingsNegotiator::new(),
            send_flow: WindowTracker::default(),
            recv_flow: WindowTracker::default(),
            recv_connection_target: DEFAULT_WINDOW_SIZE,
            recv_initial_window: DEFAULT_WINDOW_SIZE,
            goaway: GoawayState::default(),
            outbound: BytesMut::new(),
            events: VecDeque::new(),
            closed: false,
            config,
        };

        if role == Role::Client {
            session.outbound.extend_from_slice(CONNECTION_PREFACE);
        }
        let initial = session.config.settings.clone();
        session.queue_settings(initial)?;
        if session.config.connection_window > DEFAULT_WINDOW_SIZE {
            session.set_local_window_size(session.config.connection_window)?;
        }

        debug!(?role, "session created");
        Ok(session)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Our settings as acknowledged by the peer.
    pub fn local_settings(&self) -> &Settings {
        self.settings.local()
    }

    /// The peer's settings as acknowledged by us.
    pub fn remote_settings(&self) -> &Settings {
        self.settings.remote()
    }

    pub fn goaway_state(&self) -> GoawayState {
        self.goaway
    }

    // ===== I/O =====

    /// Feed bytes received from the transport.
    ///
    /// Frames are applied in arrival order. Stream errors are handled
    /// internally by resetting the stream; a connection error closes the
    /// session, queues GOAWAY and is returned.
    pub fn receive(&mut self, data: &[u8]) -> Result<(), H2Error> {
        self.ensure_open()?;
        self.codec.feed(data);

        loop {
            let frame = match self.codec.decode() {
                Ok(crate::codec::Decoded::Frame(frame)) => frame,
                Ok(crate::codec::Decoded::NeedMoreData) => return Ok(()),
                Err(err) => return Err(self.fail(err)),
            };
            trace!(kind = frame.kind_name(), stream_id = frame.stream_id(), "recv frame");

            if let Err(err) = self.handle_frame(frame) {
                if err.is_connection_error() {
                    return Err(self.fail(err));
                }
                self.handle_stream_error(err);
            }
            if self.closed {
                return Ok(());
            }
        }
    }

    /// Next application notification.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Take every byte queued for the transport.
    pub fn take_outbound(&mut self) -> Bytes {
        self.outbound.split().freeze()
    }

    /// Write queued bytes to `transport`; returns how many were written.
    pub fn flush<T: Transport>(&mut self, transport: &mut T) -> io::Result<usize> {
        if self.outbound.is_empty() {
            return Ok(0);
        }
        transport.write(&self.outbound)?;
        let written = self.outbound.len();
        self.outbound.clear();
        Ok(written)
    }

    // ===== timers =====

    /// When [`Session::handle_timeout`] should next be called.
    pub fn poll_timeout(&self) -> Option<Instant> {
        if self.closed {
            return None;
        }
        self.settings.ack_deadline(self.config.settings_timeout)
    }

    /// Fire expired timers. An unacknowledged SETTINGS frame past its
    /// deadline is a SETTINGS_TIMEOUT connection error.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), H2Error> {
        match self.poll_timeout() {
            Some(deadline) if deadline <= now => Err(self.fail(H2Error::connection(
                Reason::SETTINGS_TIMEOUT,
                "settings not acknowledged in time",
            ))),
            _ => Ok(()),
        }
    }

    // ===== snapshots =====

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            role: self.role,
            send_window: self.send_flow.connection(),
            recv_window: self.recv_flow.connection(),
            local_window_target: self.recv_connection_target,
            next_stream_id: self.streams.next_local_id(),
            last_peer_stream_id: self.streams.last_remote_id(),
            active_streams: self.streams.live_ids().len(),
            retained_streams: self.streams.len(),
            buffered_bytes: self.streams.iter().map(|s| s.buffered_len()).sum(),
            outbound_bytes: self.outbound.len(),
            pending_local_settings: self.settings.has_pending_local(),
            goaway: self.goaway,
            closed: self.closed,
        }
    }

    pub fn stream_stats(&self, id: StreamId) -> Option<StreamStats> {
        let stream = self.streams.get(id)?;
        Some(StreamStats {
            id,
            state: stream.state(),
            priority: stream.priority(),
            send_window: self.send_flow.stream(id),
            recv_window: self.recv_flow.stream(id),
            buffered_bytes: stream.buffered_len(),
            reset_code: stream.reset_code(),
        })
    }

    /// State of a stream still known to the session.
    pub fn stream_state(&self, id: StreamId) -> Option<StreamState> {
        self.streams.get(id).map(|s| s.state())
    }

    /// Handle for stream-scoped operations.
    pub fn stream(&mut self, id: StreamId) -> Option<StreamHandle<'_>> {
        if self.streams.get(id).is_none() {
            return None;
        }
        Some(StreamHandle { session: self, id })
    }

    /// True once no stream is open or reserved.
    pub fn is_drained(&self) -> bool {
        self.streams.live_ids().is_empty()
    }

    // ===== shared plumbing =====

    fn ensure_open(&self) -> Result<(), H2Error> {
        if self.closed {
            return Err(H2Error::SessionClosed);
        }
        Ok(())
    }

    fn emit(&mut self, event: Event) {
        self.events.push_back(event);
    }

    fn write_frame(&mut self, frame: Frame) {
        trace!(kind = frame.kind_name(), stream_id = frame.stream_id(), "send frame");
        FrameCodec::encode(&frame, self.settings.remote().max_frame_size(), &mut self.outbound);
    }

    /// HPACK-encode and write a header block. Encoding happens here, in
    /// write order, so the peer's decoder sees blocks in the order ours built them.
    fn write_headers(&mut self, stream_id: StreamId, headers: &[Header], priority: Option<PrioritySpec>, end_stream: bool) {
        let header_block = Bytes::from(self.encoder.encode(headers));
        self.write_frame(Frame::Headers {
            stream_id,
            priority,
            header_block,
            end_stream,
        });
    }

    /// Limit applied to what the peer sends: the larger of the acknowledged
    /// and the latest advertised value.
    fn receive_limit(&self, id: SettingId) -> u32 {
        self.settings.local().get(id).max(self.settings.local_latest().get(id))
    }

    /// Bring receive-side windows and the inbound frame limit in line with
    /// our settings. Growth applies as soon as it is advertised, shrinking
    /// only once acknowledged.
    fn sync_receive_limits(&mut self) -> Result<(), H2Error> {
        let window = self.receive_limit(SettingId::InitialWindowSize);
        let delta = window as i64 - self.recv_initial_window as i64;
        if delta != 0 {
            self.recv_flow
                .apply_initial_window_change(delta)
                .map_err(|err| H2Error::connection(Reason::FLOW_CONTROL_ERROR, err.to_string()))?;
            self.recv_initial_window = window;
        }
        self.codec.set_max_frame_size(self.receive_limit(SettingId::MaxFrameSize));
        Ok(())
    }

    fn queue_settings(&mut self, changes: Vec<(SettingId, u32)>) -> Result<(), H2Error> {
        let params = changes.iter().map(|(id, value)| (id.wire_id(), *value)).collect();
        self.settings.queue_local(changes, Instant::now())?;
        self.write_frame(Frame::settings(params));
        self.sync_receive_limits()
    }

    /// Apply `event` to a stream, finishing it off if it reached `closed`.
    fn transition(&mut self, id: StreamId, event: Transition) -> Result<StreamState, H2Error> {
        let stream = self.streams.get_mut(id).ok_or(H2Error::UnknownStream(id))?;
        let state = stream.apply(event).map_err(|state| {
            debug!(stream_id = id, %state, ?event, "illegal stream transition");
            H2Error::InvalidStreamState {
                stream_id: id,
                operation: "change state",
            }
        })?;
        if state.is_closed() {
            self.on_stream_closed(id, None);
        }
        Ok(state)
    }

    /// Bookkeeping once a stream reaches `closed`.
    fn on_stream_closed(&mut self, id: StreamId, error: Option<Reason>) {
        self.send_flow.remove(id);
        self.recv_flow.remove(id);
        self.streams.detach_children(id);
        let evicted = self.streams.mark_closed(id);
        debug!(stream_id = id, ?error, "stream closed");
        if !evicted.is_empty() {
            trace!(?evicted, "closed streams evicted");
        }
        self.emit(Event::StreamClosed { stream_id: id, error });
    }

    /// Drive a live stream to `closed` with `reason`, dropping buffered data.
    /// `send_rst` queues RST_STREAM for locally initiated resets.
    fn reset_stream(&mut self, id: StreamId, reason: Reason, send_rst: bool) {
        let Some(stream) = self.streams.get_mut(id) else {
            return;
        };
        if stream.state().is_closed() {
            return;
        }
        let had_outbound = stream.has_outbound();
        let unsent = stream.reset(reason);
        if send_rst {
            self.write_frame(Frame::rst_stream(id, reason.code()));
        }
        if had_outbound {
            self.emit(Event::SendCancelled {
                stream_id: id,
                unsent,
                error: H2Error::stream(id, reason),
            });
        }
        self.on_stream_closed(id, Some(reason));
    }

    /// React to an error scoped to one stream.
    fn handle_stream_error(&mut self, err: H2Error) {
        let (id, reason) = match err {
            H2Error::Stream { stream_id, reason } => (stream_id, reason),
            H2Error::RefusedStream { stream_id } => (stream_id, Reason::REFUSED_STREAM),
            other => {
                warn!(error = %other, "unexpected error while handling frame");
                return;
            }
        };
        debug!(stream_id = id, %reason, "stream error");
        match self.streams.get(id).map(|s| s.state()) {
            Some(state) if !state.is_closed() => self.reset_stream(id, reason, true),
            // Never RST a stream the peer has not opened
            None if self.streams.is_idle(id) => {}
            _ => self.write_frame(Frame::rst_stream(id, reason.code())),
        }
    }

    /// Tear the session down after a connection error.
    ///
    /// Queues GOAWAY, closes every stream and reports the error exactly once.
    fn fail(&mut self, err: H2Error) -> H2Error {
        if self.closed {
            return err;
        }
        warn!(error = %err, "connection error, closing session");
        let last_stream_id = self.streams.last_remote_id();
        self.write_frame(Frame::goaway(last_stream_id, err.reason().code(), err.debug_data()));
        self.goaway.sent = Some(last_stream_id);
        self.teardown(err.reason());
        self.emit(Event::SessionError(err.clone()));
        self.closed = true;
        err
    }

    /// Close every live stream; buffered sends end with `SessionClosed`.
    fn teardown(&mut self, reason: Reason) {
        for id in self.streams.live_ids() {
            let Some(stream) = self.streams.get_mut(id) else {
                continue;
            };
            let had_outbound = stream.has_outbound();
            let unsent = stream.reset(reason);
            if had_outbound {
                self.emit(Event::SendCancelled {
                    stream_id: id,
                    unsent,
                    error: H2Error::SessionClosed,
                });
            }
            self.on_stream_closed(id, Some(reason));
        }
        self.send_flow.take_parked();
    }

    /// Graceful shutdown: GOAWAY(NO_ERROR) and every stream cancelled.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        let last_stream_id = self.streams.last_remote_id();
        if self.goaway.sent.is_none() {
            self.write_frame(Frame::goaway(last_stream_id, Reason::NO_ERROR.code(), Bytes::new()));
            self.goaway.sent = Some(last_stream_id);
        }
        self.teardown(Reason::CANCEL);
        self.closed = true;
        debug!("session closed");
    }
}

/// Stream-scoped view of a [`Session`].
#[derive(Debug)]
pub struct StreamHandle<'a> {
    session: &'a mut Session,
    id: StreamId,
}

impl StreamHandle<'_> {
    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.session.stream_state(self.id).unwrap_or(StreamState::Closed)
    }

    pub fn stats(&self) -> Option<StreamStats> {
        self.session.stream_stats(self.id)
    }

    pub fn send_data(&mut self, data: impl Into<Bytes>, end_stream: bool) -> Result<(), H2Error> {
        self.session.send_data(self.id, data.into(), end_stream)
    }

    pub fn send_trailers(&mut self, trailers: Vec<Header>) -> Result<(), H2Error> {
        self.session.send_trailers(self.id, trailers)
    }

    pub fn reset(&mut self, reason: Reason) -> Result<(), H2Error> {
        self.session.reset(self.id, reason)
    }

    pub fn update_priority(&mut self, parent: StreamId, weight: u16, exclusive: bool) -> Result<(), H2Error> {
        self.session
            .update_priority(self.id, PrioritySpec::new(parent, weight, exclusive))
    }

    pub fn respond(&mut self, headers: Vec<Header>, end_stream: bool) -> Result<(), H2Error> {
        self.session.respond(self.id, headers, end_stream)
    }

    pub fn info(&mut self, headers: Vec<Header>) -> Result<(), H2Error> {
        self.session.info(self.id, headers)
    }

    pub fn push_promise(&mut self, request_headers: Vec<Header>) -> Result<StreamId, H2Error> {
        self.session.push_promise(self.id, request_headers)
    }
}
