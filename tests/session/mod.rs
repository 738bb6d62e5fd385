//! Session integration tests
//!
//! Each test drives a real [`Session`] against a scripted peer that speaks
//! raw frames through its own codec and HPACK context.

mod flow_control;

use bytes::BytesMut;
use h2_session::{
    Event, Frame, FrameCodec, Header, HpackDecoder, HpackEncoder, Session, SessionConfig, StreamId,
    CONNECTION_PREFACE,
};

/// Route session logs to the test harness; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// The far end of a session under test.
pub struct Peer {
    codec: FrameCodec,
    encoder: HpackEncoder,
    decoder: HpackDecoder,
    pending: BytesMut,
    /// Header blocks received from the session, decoded in arrival order.
    headers: Vec<(StreamId, Vec<Header>)>,
}

impl Peer {
    /// Remote end of a client session: reads the preface first.
    pub fn for_client() -> Self {
        Self::with_codec(FrameCodec::expecting_preface())
    }

    /// Remote end of a server session: opens with the preface.
    pub fn for_server() -> Self {
        let mut peer = Self::with_codec(FrameCodec::new());
        peer.pending.extend_from_slice(CONNECTION_PREFACE);
        peer
    }

    fn with_codec(codec: FrameCodec) -> Self {
        Self {
            codec,
            encoder: HpackEncoder::new(),
            decoder: HpackDecoder::new(),
            pending: BytesMut::new(),
            headers: Vec::new(),
        }
    }

    pub fn send(&mut self, frame: Frame) -> &mut Self {
        FrameCodec::encode(&frame, 16_384, &mut self.pending);
        self
    }

    pub fn send_headers(&mut self, stream_id: StreamId, headers: &[Header], end_stream: bool) -> &mut Self {
        let block = self.encoder.encode(headers);
        self.send(Frame::headers(stream_id, block, end_stream))
    }

    pub fn send_push_promise(&mut self, stream_id: StreamId, promised: StreamId, headers: &[Header]) -> &mut Self {
        let block = self.encoder.encode(headers);
        self.send(Frame::PushPromise {
            stream_id,
            promised_stream_id: promised,
            header_block: block.into(),
        })
    }

    /// Hand everything queued so far to the session.
    pub fn deliver(&mut self, session: &mut Session) -> Result<(), h2_session::H2Error> {
        let data = self.pending.split();
        session.receive(&data)
    }

    /// Decode everything the session has written.
    pub fn recv(&mut self, session: &mut Session) -> Vec<Frame> {
        let frames = self.codec.process(&session.take_outbound()).unwrap();
        for frame in &frames {
            match frame {
                Frame::Headers {
                    stream_id,
                    header_block,
                    ..
                }
                | Frame::PushPromise {
                    stream_id,
                    header_block,
                    ..
                } => {
                    let headers = self.decoder.decode(header_block).unwrap();
                    self.headers.push((*stream_id, headers));
                }
                _ => {}
            }
        }
        frames
    }

    /// Decoded header blocks received since the last call.
    pub fn take_headers(&mut self) -> Vec<(StreamId, Vec<Header>)> {
        std::mem::take(&mut self.headers)
    }
}

pub fn events(session: &mut Session) -> Vec<Event> {
    std::iter::from_fn(|| session.poll_event()).collect()
}

/// A client session with SETTINGS exchanged and acknowledged both ways.
pub fn client_handshake(config: SessionConfig, peer_settings: Vec<(u16, u32)>) -> (Session, Peer) {
    init_tracing();
    let mut session = Session::client(config).unwrap();
    let mut peer = Peer::for_client();
    handshake(&mut session, &mut peer, peer_settings);
    (session, peer)
}

/// A server session with SETTINGS exchanged and acknowledged both ways.
pub fn server_handshake(config: SessionConfig, peer_settings: Vec<(u16, u32)>) -> (Session, Peer) {
    init_tracing();
    let mut session = Session::server(config).unwrap();
    let mut peer = Peer::for_server();
    handshake(&mut session, &mut peer, peer_settings);
    (session, peer)
}

fn handshake(session: &mut Session, peer: &mut Peer, peer_settings: Vec<(u16, u32)>) {
    let frames = peer.recv(session);
    assert!(matches!(frames[0], Frame::Settings { ack: false, .. }));

    peer.send(Frame::settings(peer_settings))
        .send(Frame::settings_ack())
        .deliver(session)
        .unwrap();
    assert_eq!(peer.recv(session), vec![Frame::settings_ack()]);
    assert!(!session.stats().pending_local_settings);
    events(session);
}

pub fn request() -> Vec<Header> {
    vec![
        Header::new(":method", "GET"),
        Header::new(":scheme", "https"),
        Header::new(":path", "/"),
        Header::new(":authority", "example.com"),
    ]
}

pub fn response(status: &str) -> Vec<Header> {
    vec![Header::new(":status", status)]
}
