//! Dispatch of frames received from the peer.

use bytes::Bytes;
use tracing::{debug, trace};

use super::Session;
use crate::error::{H2Error, Reason};
use crate::event::{Event, Promise, SettingsOrigin};
use crate::frame::{Frame, StreamId};
use crate::hpack::{header_list_size, is_informational, Header};
use crate::priority::{PrioritySpec, DEFAULT_WEIGHT};
use crate::settings::SettingId;
use crate::stream::{Stream, StreamState, Transition};
use crate::table::Role;

impl Session {
    pub(super) fn handle_frame(&mut self, frame: Frame) -> Result<(), H2Error> {
        let flow_len = frame.flow_controlled_len();
        match frame {
            Frame::Data {
                stream_id,
                data,
                end_stream,
                ..
            } => self.recv_data(stream_id, data, end_stream, flow_len),
            Frame::Headers {
                stream_id,
                priority,
                header_block,
                end_stream,
            } => self.recv_headers(stream_id, priority, header_block, end_stream),
            Frame::Priority { stream_id, spec } => self.recv_priority(stream_id, spec),
            Frame::RstStream { stream_id, error_code } => self.recv_rst_stream(stream_id, Reason::from(error_code)),
            Frame::Settings { ack: true, .. } => self.recv_settings_ack(),
            Frame::Settings { ack: false, params } => self.recv_settings(&params),
            Frame::PushPromise {
                stream_id,
                promised_stream_id,
                header_block,
            } => self.recv_push_promise(stream_id, promised_stream_id, header_block),
            Frame::Ping { ack: true, payload } => {
                debug!("ping acknowledged");
                self.emit(Event::PingAck { payload });
                Ok(())
            }
            Frame::Ping { ack: false, payload } => {
                self.write_frame(Frame::Ping { ack: true, payload });
                Ok(())
            }
            Frame::GoAway {
                last_stream_id,
                error_code,
                debug_data,
            } => {
                self.recv_goaway(last_stream_id, Reason::from(error_code), debug_data);
                Ok(())
            }
            Frame::WindowUpdate { stream_id, increment } => self.recv_window_update(stream_id, increment),
            Frame::AltSvc {
                stream_id,
                origin,
                field_value,
            } => {
                if self.role == Role::Client {
                    self.emit(Event::AltSvc {
                        stream_id,
                        origin,
                        field_value,
                    });
                }
                Ok(())
            }
            Frame::Origin { origins } => {
                if self.role == Role::Client {
                    self.emit(Event::Origin { origins });
                }
                Ok(())
            }
            Frame::Unknown { kind, .. } => {
                trace!(kind, "ignoring unknown frame type");
                Ok(())
            }
        }
    }

    /// Error for a frame that names a stream the table no longer holds.
    fn unknown_stream(&self, id: StreamId, kind: &str) -> H2Error {
        if self.streams.is_idle(id) {
            H2Error::protocol(format!("{} on idle stream {}", kind, id))
        } else {
            H2Error::connection(Reason::STREAM_CLOSED, format!("{} on closed stream {}", kind, id))
        }
    }

    fn recv_data(&mut self, id: StreamId, data: Bytes, end_stream: bool, flow_len: u32) -> Result<(), H2Error> {
        // The connection window is charged whatever happens to the stream
        self.recv_flow
            .reserve_connection(flow_len)
            .map_err(|err| H2Error::connection(Reason::FLOW_CONTROL_ERROR, err.to_string()))?;
        self.replenish_connection();

        let state = match self.stream_state(id) {
            Some(state) => state,
            None => return Err(self.unknown_stream(id, "DATA")),
        };
        match state {
            state if state.can_recv() => {}
            StreamState::HalfClosedRemote | StreamState::Closed => return Err(H2Error::stream(id, Reason::STREAM_CLOSED)),
            state => return Err(H2Error::protocol(format!("DATA on stream {} in state {}", id, state))),
        }

        if self.recv_flow.reserve_stream(id, flow_len).is_err() {
            return Err(H2Error::stream(id, Reason::FLOW_CONTROL_ERROR));
        }

        if !data.is_empty() || end_stream {
            self.emit(Event::Data {
                stream_id: id,
                data,
                end_stream,
            });
        }

        if end_stream {
            self.transition(id, Transition::RecvEndStream)?;
        } else {
            let target = self.recv_initial_window;
            if let Some(increment) = self.recv_flow.replenish(id, target) {
                self.write_frame(Frame::window_update(id, increment));
            }
        }
        Ok(())
    }

    fn replenish_connection(&mut self) {
        if let Some(increment) = self.recv_flow.replenish(0, self.recv_connection_target) {
            self.write_frame(Frame::window_update(0, increment));
        }
    }

    fn recv_headers(
        &mut self,
        id: StreamId,
        priority: Option<PrioritySpec>,
        header_block: Bytes,
        end_stream: bool,
    ) -> Result<(), H2Error> {
        // Always decode, even for streams we drop, to keep HPACK in step
        let headers = self.decoder.decode(&header_block)?;

        let malformed = priority.is_some_and(|spec| spec.dependency == id)
            || header_list_size(&headers) > self.receive_limit(SettingId::MaxHeaderListSize) as usize;

        let state = match self.stream_state(id) {
            Some(state) => state,
            // New peer stream; a reused or out-of-order id fails in accept_remote
            None if !self.streams.is_local(id) => {
                return self.open_remote_stream(id, headers, priority, end_stream, malformed);
            }
            None => return Err(self.unknown_stream(id, "HEADERS")),
        };

        if malformed {
            return Err(H2Error::stream(id, Reason::PROTOCOL_ERROR));
        }

        match state {
            StreamState::ReservedRemote => {
                self.mark_final_received(id, &headers);
                self.emit(Event::Headers {
                    stream_id: id,
                    headers,
                    end_stream,
                });
                self.transition(id, Transition::RecvHeaders { end_stream })?;
            }
            StreamState::Open | StreamState::HalfClosedLocal => {
                let final_received = self.streams.get(id).is_some_and(|s| s.final_headers_received);
                if final_received {
                    if !end_stream {
                        return Err(H2Error::stream(id, Reason::PROTOCOL_ERROR));
                    }
                    self.emit(Event::Trailers { stream_id: id, headers });
                } else {
                    if end_stream && is_informational(&headers) {
                        return Err(H2Error::stream(id, Reason::PROTOCOL_ERROR));
                    }
                    self.mark_final_received(id, &headers);
                    self.emit(Event::Headers {
                        stream_id: id,
                        headers,
                        end_stream,
                    });
                }
                if let Some(spec) = priority {
                    self.streams.reprioritize(id, spec);
                }
                if end_stream {
                    self.transition(id, Transition::RecvEndStream)?;
                }
            }
            StreamState::HalfClosedRemote | StreamState::Closed => {
                return Err(H2Error::stream(id, Reason::STREAM_CLOSED));
            }
            state => {
                return Err(H2Error::protocol(format!("HEADERS on stream {} in state {}", id, state)));
            }
        }
        Ok(())
    }

    fn mark_final_received(&mut self, id: StreamId, headers: &[Header]) {
        if let Some(stream) = self.streams.get_mut(id) {
            stream.final_headers_received = !is_informational(headers);
        }
    }

    fn open_remote_stream(
        &mut self,
        id: StreamId,
        headers: Vec<Header>,
        priority: Option<PrioritySpec>,
        end_stream: bool,
        malformed: bool,
    ) -> Result<(), H2Error> {
        self.streams.accept_remote(id)?;

        if let Some(last) = self.goaway.sent {
            if id > last {
                trace!(stream_id = id, last, "ignoring stream opened after GOAWAY");
                return Ok(());
            }
        }

        let limit = self.settings.local_latest().max_concurrent_streams() as usize;
        let refusal = if self.streams.active_count(false) >= limit {
            Some(Reason::REFUSED_STREAM)
        } else if malformed {
            Some(Reason::PROTOCOL_ERROR)
        } else {
            None
        };
        if let Some(reason) = refusal {
            debug!(stream_id = id, %reason, "refusing peer stream");
            let mut stream = Stream::new(id);
            stream.reset(reason);
            self.streams.insert(stream);
            self.streams.mark_closed(id);
            self.write_frame(Frame::rst_stream(id, reason.code()));
            return Ok(());
        }

        let mut stream = Stream::new(id);
        if stream.apply(Transition::RecvHeaders { end_stream }).is_err() {
            return Err(H2Error::protocol(format!("cannot open stream {}", id)));
        }
        stream.final_headers_received = !is_informational(&headers);
        self.streams.insert(stream);
        self.send_flow.open(id);
        self.recv_flow.open(id);
        if let Some(spec) = priority {
            self.streams.reprioritize(id, spec);
        }

        debug!(stream_id = id, end_stream, "peer opened stream");
        self.emit(Event::StreamCreated {
            stream_id: id,
            promised: None,
        });
        self.emit(Event::Headers {
            stream_id: id,
            headers,
            end_stream,
        });
        Ok(())
    }

    fn recv_priority(&mut self, id: StreamId, spec: PrioritySpec) -> Result<(), H2Error> {
        if spec.dependency == id {
            return Err(H2Error::stream(id, Reason::PROTOCOL_ERROR));
        }
        match self.stream_state(id) {
            Some(state) if !state.is_closed() => self.streams.reprioritize(id, spec),
            _ => trace!(stream_id = id, "PRIORITY for unknown or closed stream ignored"),
        }
        Ok(())
    }

    fn recv_rst_stream(&mut self, id: StreamId, reason: Reason) -> Result<(), H2Error> {
        match self.stream_state(id) {
            None if self.streams.is_idle(id) => Err(H2Error::protocol(format!("RST_STREAM on idle stream {}", id))),
            None => Ok(()),
            Some(state) if state.is_closed() => Ok(()),
            Some(_) => {
                debug!(stream_id = id, %reason, "stream reset by peer");
                self.reset_stream(id, reason, false);
                Ok(())
            }
        }
    }

    fn recv_settings_ack(&mut self) -> Result<(), H2Error> {
        let commit = self
            .settings
            .ack_local()
            .ok_or_else(|| H2Error::protocol("SETTINGS ACK without pending SETTINGS"))?;
        self.sync_receive_limits()?;
        debug!(settings = ?commit.current, "local settings acknowledged");
        self.emit(Event::SettingsChanged {
            origin: SettingsOrigin::Local,
            settings: commit.current,
        });
        Ok(())
    }

    fn recv_settings(&mut self, params: &[(u16, u32)]) -> Result<(), H2Error> {
        self.settings.stage_remote(params)?;
        self.write_frame(Frame::settings_ack());
        let Some(commit) = self.settings.commit_remote() else {
            return Ok(());
        };

        let delta = commit.initial_window_delta();
        if delta != 0 {
            let crossed = self
                .send_flow
                .apply_initial_window_change(delta)
                .map_err(|err| H2Error::connection(Reason::FLOW_CONTROL_ERROR, err.to_string()))?;
            if !crossed.is_empty() {
                self.resume_parked();
            }
        }

        debug!(settings = ?commit.current, "peer settings applied");
        self.emit(Event::SettingsChanged {
            origin: SettingsOrigin::Remote,
            settings: commit.current,
        });
        Ok(())
    }

    fn recv_push_promise(&mut self, id: StreamId, promised: StreamId, header_block: Bytes) -> Result<(), H2Error> {
        if self.role == Role::Server {
            return Err(H2Error::protocol("PUSH_PROMISE received by a server"));
        }
        if !self.settings.local().enable_push() {
            return Err(H2Error::protocol("PUSH_PROMISE received with push disabled"));
        }
        let request_headers = self.decoder.decode(&header_block)?;

        match self.stream_state(id) {
            Some(StreamState::Open) | Some(StreamState::HalfClosedLocal) => {}
            Some(state) => {
                return Err(H2Error::protocol(format!(
                    "PUSH_PROMISE on stream {} in state {}",
                    id, state
                )))
            }
            None => return Err(self.unknown_stream(id, "PUSH_PROMISE")),
        }
        self.streams.accept_remote(promised)?;

        let mut stream = Stream::new(promised);
        if stream.apply(Transition::RecvPushPromise).is_err() {
            return Err(H2Error::protocol(format!("cannot reserve stream {}", promised)));
        }
        stream.set_priority(PrioritySpec::new(id, DEFAULT_WEIGHT, false));
        self.streams.insert(stream);
        self.send_flow.open(promised);
        self.recv_flow.open(promised);

        debug!(stream_id = id, promised, "push promised");
        self.emit(Event::StreamCreated {
            stream_id: promised,
            promised: Some(Promise {
                associated_stream_id: id,
                request_headers,
            }),
        });
        Ok(())
    }

    fn recv_goaway(&mut self, last_stream_id: StreamId, error: Reason, debug_data: Bytes) {
        let last = self.goaway.received.map_or(last_stream_id, |prev| prev.min(last_stream_id));
        self.goaway.received = Some(last);
        debug!(last_stream_id = last, %error, "GOAWAY received");
        self.emit(Event::GoawayReceived {
            last_stream_id: last,
            error,
            debug_data,
        });

        // Our streams above `last` were never processed by the peer
        let refused: Vec<StreamId> = self
            .streams
            .live_ids()
            .into_iter()
            .filter(|id| self.streams.is_local(*id) && *id > last)
            .collect();
        for id in refused {
            self.reset_stream(id, Reason::REFUSED_STREAM, false);
        }
    }

    fn recv_window_update(&mut self, id: StreamId, increment: u32) -> Result<(), H2Error> {
        if id == 0 {
            if increment == 0 {
                return Err(H2Error::protocol("WINDOW_UPDATE with zero increment on connection"));
            }
            let crossed = self
                .send_flow
                .release(0, increment)
                .map_err(|err| H2Error::connection(Reason::FLOW_CONTROL_ERROR, err.to_string()))?;
            trace!(increment, window = self.send_flow.connection(), "connection window updated");
            if crossed {
                self.resume_parked();
            }
            return Ok(());
        }

        match self.stream_state(id) {
            None => return Err(self.unknown_stream(id, "WINDOW_UPDATE")),
            Some(state) if state.is_closed() => return Ok(()),
            Some(_) => {}
        }
        if increment == 0 {
            return Err(H2Error::stream(id, Reason::PROTOCOL_ERROR));
        }
        let crossed = self
            .send_flow
            .release(id, increment)
            .map_err(|_| H2Error::stream(id, Reason::FLOW_CONTROL_ERROR))?;
        if crossed && self.send_flow.available(id) > 0 && self.send_flow.unpark(id) {
            debug!(stream_id = id, "stream window reopened");
            self.flush_stream(id);
        }
        Ok(())
    }

    /// Hand new credit to parked streams, oldest registration first.
    ///
    /// Stops once the connection window is spent; streams not reached keep
    /// their place and a stream that used up the credit parks at the back.
    pub(super) fn resume_parked(&mut self) {
        let waiting = self.send_flow.parked_len();
        if waiting > 0 {
            debug!(streams = waiting, window = self.send_flow.connection(), "resuming streams waiting for credit");
        }
        for _ in 0..waiting {
            if self.send_flow.connection() <= 0 {
                break;
            }
            let Some(id) = self.send_flow.pop_parked() else {
                break;
            };
            self.flush_stream(id);
        }
    }
}
