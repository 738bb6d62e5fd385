//! Operations the application invokes, and the DATA send loop.

use bytes::Bytes;
use tracing::{debug, trace};

use super::Session;
use crate::error::{H2Error, Reason};
use crate::flow::MAX_WINDOW_SIZE;
use crate::frame::{Frame, StreamId};
use crate::hpack::{is_informational, Header};
use crate::priority::{PrioritySpec, DEFAULT_WEIGHT};
use crate::settings::SettingId;
use crate::stream::{Stream, StreamState, Transition};
use crate::table::Role;

impl Session {
    /// Open a new locally initiated stream by sending its HEADERS.
    ///
    /// Fails with [`H2Error::GoingAway`] once either side sent GOAWAY. When
    /// the concurrency limit is reached the id is still consumed: the stream
    /// is recorded as closed with REFUSED_STREAM and
    /// [`H2Error::RefusedStream`] is returned.
    pub fn create_stream(
        &mut self,
        headers: Vec<Header>,
        priority: Option<PrioritySpec>,
        end_stream: bool,
    ) -> Result<StreamId, H2Error> {
        self.ensure_open()?;
        if let Some(last_stream_id) = self.goaway.received.or(self.goaway.sent) {
            return Err(H2Error::GoingAway { last_stream_id });
        }
        if let Some(spec) = priority {
            if !spec.is_valid_weight() {
                return Err(H2Error::InvalidPriority(self.streams.next_local_id()));
            }
        }

        let id = self.streams.allocate_local()?;
        if priority.is_some_and(|spec| spec.dependency == id) {
            return Err(H2Error::InvalidPriority(id));
        }

        let limit = self.local_stream_limit();
        if self.streams.active_count(true) >= limit {
            debug!(stream_id = id, limit, "concurrency limit reached, refusing stream");
            let mut stream = Stream::new(id);
            stream.reset(Reason::REFUSED_STREAM);
            self.streams.insert(stream);
            self.on_stream_closed(id, Some(Reason::REFUSED_STREAM));
            return Err(H2Error::RefusedStream { stream_id: id });
        }

        let mut stream = Stream::new(id);
        if stream.apply(Transition::SendHeaders { end_stream }).is_err() {
            return Err(H2Error::InvalidStreamState {
                stream_id: id,
                operation: "open",
            });
        }
        stream.final_headers_sent = true;
        self.streams.insert(stream);
        self.send_flow.open(id);
        self.recv_flow.open(id);
        if let Some(spec) = priority {
            self.streams.reprioritize(id, spec);
        }

        self.write_headers(id, &headers, priority, end_stream);
        debug!(stream_id = id, end_stream, "stream opened");
        Ok(id)
    }

    /// Queue DATA on a stream and send as much as flow control allows.
    ///
    /// Data beyond the available credit stays buffered and goes out when
    /// WINDOW_UPDATE or a larger initial window arrives.
    pub fn send_data(&mut self, id: StreamId, data: Bytes, end_stream: bool) -> Result<(), H2Error> {
        self.ensure_open()?;
        let stream = self.streams.get_mut(id).ok_or(H2Error::UnknownStream(id))?;
        if !stream.state().can_send() || stream.end_stream_queued() {
            return Err(H2Error::InvalidStreamState {
                stream_id: id,
                operation: "send data",
            });
        }
        stream.queue_data(data, end_stream);
        self.flush_stream(id);
        Ok(())
    }

    /// Queue trailers; they follow any buffered DATA and end the stream.
    pub fn send_trailers(&mut self, id: StreamId, trailers: Vec<Header>) -> Result<(), H2Error> {
        self.ensure_open()?;
        let stream = self.streams.get_mut(id).ok_or(H2Error::UnknownStream(id))?;
        if !stream.state().can_send() || stream.end_stream_queued() {
            return Err(H2Error::InvalidStreamState {
                stream_id: id,
                operation: "send trailers",
            });
        }
        stream.queue_trailers(trailers);
        self.flush_stream(id);
        Ok(())
    }

    /// Send RST_STREAM. Buffered data is dropped and reported with
    /// [`Event::SendCancelled`](crate::Event::SendCancelled). Resetting a closed stream does nothing.
    pub fn reset(&mut self, id: StreamId, reason: Reason) -> Result<(), H2Error> {
        self.ensure_open()?;
        if self.streams.get(id).is_none() {
            return Err(H2Error::UnknownStream(id));
        }
        self.reset_stream(id, reason, true);
        Ok(())
    }

    /// Move a stream in the priority tree and tell the peer.
    pub fn update_priority(&mut self, id: StreamId, spec: PrioritySpec) -> Result<(), H2Error> {
        self.ensure_open()?;
        let state = self.stream_state(id).ok_or(H2Error::UnknownStream(id))?;
        if state.is_closed() {
            return Err(H2Error::InvalidStreamState {
                stream_id: id,
                operation: "reprioritize",
            });
        }
        if spec.dependency == id || !spec.is_valid_weight() {
            return Err(H2Error::InvalidPriority(id));
        }
        self.streams.reprioritize(id, spec);
        self.write_frame(Frame::Priority { stream_id: id, spec });
        Ok(())
    }

    /// How many streams we may have active at once.
    fn local_stream_limit(&self) -> usize {
        self.settings
            .remote()
            .max_concurrent_streams()
            .min(self.settings.local_latest().max_concurrent_streams()) as usize
    }

    /// Send final response headers on a peer-initiated or pushed stream.
    ///
    /// A pushed stream becomes active here; past the concurrency limit the
    /// push is reset with REFUSED_STREAM and [`H2Error::RefusedStream`] is returned.
    pub fn respond(&mut self, id: StreamId, headers: Vec<Header>, end_stream: bool) -> Result<(), H2Error> {
        self.ensure_open()?;
        let stream = self.streams.get(id).ok_or(H2Error::UnknownStream(id))?;
        let state = stream.state();
        let allowed = matches!(
            state,
            StreamState::Open | StreamState::HalfClosedRemote | StreamState::ReservedLocal
        );
        if !allowed || stream.final_headers_sent || is_informational(&headers) {
            return Err(H2Error::InvalidStreamState {
                stream_id: id,
                operation: "respond",
            });
        }
        if state == StreamState::ReservedLocal
            && !end_stream
            && self.streams.active_count(true) >= self.local_stream_limit()
        {
            debug!(stream_id = id, "concurrency limit reached, refusing push");
            self.reset_stream(id, Reason::REFUSED_STREAM, true);
            return Err(H2Error::RefusedStream { stream_id: id });
        }

        let Some(stream) = self.streams.get_mut(id) else {
            return Err(H2Error::UnknownStream(id));
        };
        stream.final_headers_sent = true;
        self.write_headers(id, &headers, None, end_stream);
        self.transition(id, Transition::SendHeaders { end_stream })?;
        Ok(())
    }

    /// Send informational (1xx) headers ahead of the final response.
    pub fn info(&mut self, id: StreamId, headers: Vec<Header>) -> Result<(), H2Error> {
        self.ensure_open()?;
        let stream = self.streams.get(id).ok_or(H2Error::UnknownStream(id))?;
        let allowed = matches!(stream.state(), StreamState::Open | StreamState::HalfClosedRemote);
        if !allowed || stream.final_headers_sent || !is_informational(&headers) {
            return Err(H2Error::InvalidStreamState {
                stream_id: id,
                operation: "send informational headers",
            });
        }
        self.write_headers(id, &headers, None, false);
        Ok(())
    }

    /// Promise a pushed response on `associated_id`; returns the reserved id.
    pub fn push_promise(&mut self, associated_id: StreamId, request_headers: Vec<Header>) -> Result<StreamId, H2Error> {
        self.ensure_open()?;
        if self.role != Role::Server {
            return Err(H2Error::InvalidStreamState {
                stream_id: associated_id,
                operation: "push",
            });
        }
        if !self.settings.remote().enable_push() {
            return Err(H2Error::PushDisabled);
        }
        if let Some(last_stream_id) = self.goaway.received.or(self.goaway.sent) {
            return Err(H2Error::GoingAway { last_stream_id });
        }
        match self.stream_state(associated_id) {
            Some(StreamState::Open) | Some(StreamState::HalfClosedRemote) => {}
            Some(_) => {
                return Err(H2Error::InvalidStreamState {
                    stream_id: associated_id,
                    operation: "push",
                })
            }
            None => return Err(H2Error::UnknownStream(associated_id)),
        }

        let promised = self.streams.allocate_local()?;
        let mut stream = Stream::new(promised);
        if stream.apply(Transition::SendPushPromise).is_err() {
            return Err(H2Error::InvalidStreamState {
                stream_id: promised,
                operation: "reserve",
            });
        }
        stream.set_priority(PrioritySpec::new(associated_id, DEFAULT_WEIGHT, false));
        self.streams.insert(stream);
        self.send_flow.open(promised);
        self.recv_flow.open(promised);

        let header_block = Bytes::from(self.encoder.encode(&request_headers));
        self.write_frame(Frame::PushPromise {
            stream_id: associated_id,
            promised_stream_id: promised,
            header_block,
        });
        debug!(stream_id = associated_id, promised, "push promise sent");
        Ok(promised)
    }

    /// Send SETTINGS. The values take effect once the peer acknowledges them.
    pub fn send_settings(&mut self, changes: Vec<(SettingId, u32)>) -> Result<(), H2Error> {
        self.ensure_open()?;
        self.queue_settings(changes)
    }

    /// Send GOAWAY. The announced last stream id never increases, and
    /// peer streams above it are dropped.
    pub fn send_goaway(&mut self, last_stream_id: StreamId, error: Reason, debug_data: Bytes) -> Result<(), H2Error> {
        self.ensure_open()?;
        let last = self.goaway.sent.map_or(last_stream_id, |prev| prev.min(last_stream_id));
        self.write_frame(Frame::goaway(last, error.code(), debug_data));
        self.goaway.sent = Some(last);
        debug!(last_stream_id = last, %error, "GOAWAY sent");

        let dropped: Vec<StreamId> = self
            .streams
            .live_ids()
            .into_iter()
            .filter(|id| !self.streams.is_local(*id) && *id > last)
            .collect();
        for id in dropped {
            self.reset_stream(id, Reason::REFUSED_STREAM, false);
        }
        Ok(())
    }

    pub fn send_ping(&mut self, payload: [u8; 8]) -> Result<(), H2Error> {
        self.ensure_open()?;
        self.write_frame(Frame::Ping { ack: false, payload });
        Ok(())
    }

    /// Advertise an alternative service (RFC 7838). Stream 0 requires an
    /// origin; on a stream the origin must be empty.
    pub fn send_altsvc(&mut self, stream_id: StreamId, origin: Bytes, field_value: Bytes) -> Result<(), H2Error> {
        self.ensure_open()?;
        if self.role != Role::Server {
            return Err(H2Error::InvalidStreamState {
                stream_id,
                operation: "send ALTSVC",
            });
        }
        if (stream_id == 0) == origin.is_empty() {
            return Err(H2Error::InvalidStreamId(stream_id));
        }
        if stream_id != 0 && self.streams.get(stream_id).is_none() {
            return Err(H2Error::UnknownStream(stream_id));
        }
        self.write_frame(Frame::AltSvc {
            stream_id,
            origin,
            field_value,
        });
        Ok(())
    }

    /// Send an ORIGIN frame (RFC 8336).
    pub fn send_origin(&mut self, origins: Vec<Bytes>) -> Result<(), H2Error> {
        self.ensure_open()?;
        if self.role != Role::Server {
            return Err(H2Error::InvalidStreamState {
                stream_id: 0,
                operation: "send ORIGIN",
            });
        }
        self.write_frame(Frame::Origin { origins });
        Ok(())
    }

    /// Skip the local stream id counter forward.
    pub fn set_next_stream_id(&mut self, id: StreamId) -> Result<(), H2Error> {
        self.streams.set_next_local_id(id)
    }

    /// Change the connection-level receive window. Growth is announced at once
    /// with WINDOW_UPDATE; a smaller size applies as credit is returned.
    pub fn set_local_window_size(&mut self, size: u32) -> Result<(), H2Error> {
        self.ensure_open()?;
        if size > MAX_WINDOW_SIZE as u32 {
            return Err(H2Error::InvalidSetting { id: 0, value: size });
        }
        if size > self.recv_connection_target {
            let increment = size - self.recv_connection_target;
            self.recv_flow.release(0, increment)?;
            self.write_frame(Frame::window_update(0, increment));
        }
        self.recv_connection_target = size;
        Ok(())
    }

    /// Send buffered DATA for `id` until the buffer or the credit runs out.
    pub(super) fn flush_stream(&mut self, id: StreamId) {
        let max_frame = self.settings.remote().max_frame_size() as usize;
        loop {
            let Some(stream) = self.streams.get_mut(id) else {
                return;
            };
            if !stream.state().can_send() {
                return;
            }

            if stream.buffered_len() > 0 {
                let available = self.send_flow.available(id) as usize;
                if available == 0 {
                    trace!(stream_id = id, buffered = stream.buffered_len(), "waiting for credit");
                    self.send_flow.park(id);
                    return;
                }
                let len = stream.front_len().min(max_frame).min(available);
                if self.send_flow.reserve(id, len as u32).is_err() {
                    self.send_flow.park(id);
                    return;
                }
                let Some(chunk) = stream.next_chunk(len) else {
                    return;
                };
                let last = stream.buffered_len() == 0 && stream.end_stream_queued() && !stream.has_pending_trailers();
                if last {
                    stream.take_trailers();
                }
                self.write_frame(Frame::data(id, chunk, last));
                if last {
                    self.finish_send(id, Transition::SendEndStream);
                    return;
                }
                continue;
            }

            if stream.has_pending_trailers() {
                let trailers = stream.take_trailers().unwrap_or_default();
                self.write_headers(id, &trailers, None, true);
                self.finish_send(id, Transition::SendHeaders { end_stream: true });
            } else if stream.end_stream_queued() {
                stream.take_trailers();
                self.write_frame(Frame::data(id, Bytes::new(), true));
                self.finish_send(id, Transition::SendEndStream);
            }
            return;
        }
    }

    fn finish_send(&mut self, id: StreamId, event: Transition) {
        if let Err(err) = self.transition(id, event) {
            debug!(stream_id = id, error = %err, "end of stream not applied");
        }
    }
}
