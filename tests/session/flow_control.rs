//! Connection and stream flow control, in both directions

use bytes::{Bytes, BytesMut};
use h2_session::{settings_id, Event, Frame, FrameCodec, Reason, Session, SessionConfig, StreamState, MAX_WINDOW_SIZE};

use super::{client_handshake, events, init_tracing, request, response, server_handshake, Peer};

fn data_len(frames: &[Frame], id: u32) -> usize {
    frames
        .iter()
        .map(|frame| match frame {
            Frame::Data { stream_id, data, .. } if *stream_id == id => data.len(),
            _ => 0,
        })
        .sum()
}

#[test]
fn test_send_blocks_on_connection_window_until_update() {
    // Large stream windows so only the connection window limits
    let (mut client, mut peer) =
        client_handshake(SessionConfig::new(), vec![(settings_id::INITIAL_WINDOW_SIZE, 1_000_000)]);

    let id = client.create_stream(request(), None, false).unwrap();
    client
        .stream(id)
        .unwrap()
        .send_data(Bytes::from(vec![1u8; 70_000]), true)
        .unwrap();

    let frames = peer.recv(&mut client);
    assert_eq!(data_len(&frames, id), 65_535);
    assert!(frames.iter().all(|f| !matches!(f, Frame::Data { end_stream: true, .. })));
    assert_eq!(client.stats().send_window, 0);
    assert_eq!(client.stream_stats(id).unwrap().buffered_bytes, 4_465);

    peer.send(Frame::window_update(0, 4_465)).deliver(&mut client).unwrap();

    let frames = peer.recv(&mut client);
    assert_eq!(frames, vec![Frame::data(id, vec![1u8; 4_465], true)]);
    assert_eq!(client.stream_stats(id).unwrap().buffered_bytes, 0);
    assert_eq!(client.stream_state(id), Some(StreamState::HalfClosedLocal));
}

#[test]
fn test_parked_streams_share_connection_credit() {
    let (mut client, mut peer) =
        client_handshake(SessionConfig::new(), vec![(settings_id::INITIAL_WINDOW_SIZE, 1_000_000)]);

    let first = client.create_stream(request(), None, false).unwrap();
    let second = client.create_stream(request(), None, false).unwrap();
    client.send_data(first, Bytes::from(vec![0u8; 75_535]), true).unwrap();
    client.send_data(second, Bytes::from(vec![0u8; 10_000]), true).unwrap();

    let frames = peer.recv(&mut client);
    assert_eq!(data_len(&frames, first), 65_535);
    assert_eq!(data_len(&frames, second), 0);

    // Each update only covers one stream; the streams take turns
    let mut served = Vec::new();
    for _ in 0..5 {
        peer.send(Frame::window_update(0, 1_000)).deliver(&mut client).unwrap();
        let frames = peer.recv(&mut client);
        assert_eq!(frames.len(), 1);
        served.push(frames[0].stream_id());
    }
    assert_eq!(served, vec![first, second, first, second, first]);
    assert_eq!(client.stream_stats(first).unwrap().buffered_bytes, 7_000);
    assert_eq!(client.stream_stats(second).unwrap().buffered_bytes, 8_000);

    // A large update serves everyone, oldest registration first
    peer.send(Frame::window_update(0, 20_000)).deliver(&mut client).unwrap();
    let frames = peer.recv(&mut client);
    assert_eq!(
        frames,
        vec![
            Frame::data(second, vec![0u8; 8_000], true),
            Frame::data(first, vec![0u8; 7_000], true),
        ]
    );
}

#[test]
fn test_data_frames_respect_peer_max_frame_size() {
    let (mut client, mut peer) = client_handshake(SessionConfig::new(), vec![]);

    let id = client.create_stream(request(), None, false).unwrap();
    client.send_data(id, Bytes::from(vec![0u8; 40_000]), true).unwrap();

    let sizes: Vec<usize> = peer
        .recv(&mut client)
        .iter()
        .filter_map(|frame| match frame {
            Frame::Data { data, .. } => Some(data.len()),
            _ => None,
        })
        .collect();
    assert_eq!(sizes, vec![16_384, 16_384, 7_232]);
}

#[test]
fn test_initial_window_shrink_goes_negative() {
    let (mut client, mut peer) = client_handshake(SessionConfig::new(), vec![]);

    let id = client.create_stream(request(), None, false).unwrap();
    client.send_data(id, Bytes::from(vec![0u8; 60_000]), false).unwrap();
    assert_eq!(data_len(&peer.recv(&mut client), id), 60_000);

    peer.send(Frame::settings(vec![(settings_id::INITIAL_WINDOW_SIZE, 10_000)]))
        .deliver(&mut client)
        .unwrap();
    assert_eq!(peer.recv(&mut client), vec![Frame::settings_ack()]);

    let window = client.stream_stats(id).unwrap().send_window.unwrap();
    assert_eq!(window, 10_000 - 60_000);
    assert!(window >= -60_000);
    assert_eq!(client.remote_settings().initial_window_size(), 10_000);

    // Nothing goes out while the window is negative
    client.send_data(id, Bytes::from(vec![0u8; 1_000]), false).unwrap();
    assert!(peer.recv(&mut client).is_empty());
    assert_eq!(client.stream_stats(id).unwrap().buffered_bytes, 1_000);

    peer.send(Frame::window_update(id, 60_000)).deliver(&mut client).unwrap();
    assert_eq!(data_len(&peer.recv(&mut client), id), 1_000);
    assert_eq!(client.stream_stats(id).unwrap().send_window, Some(10_000 - 1_000));
}

#[test]
fn test_initial_window_growth_resumes_parked_streams() {
    let (mut client, mut peer) =
        client_handshake(SessionConfig::new(), vec![(settings_id::INITIAL_WINDOW_SIZE, 100)]);

    let id = client.create_stream(request(), None, false).unwrap();
    client.send_data(id, Bytes::from(vec![0u8; 300]), true).unwrap();
    assert_eq!(data_len(&peer.recv(&mut client), id), 100);

    peer.send(Frame::settings(vec![(settings_id::INITIAL_WINDOW_SIZE, 1_000)]))
        .deliver(&mut client)
        .unwrap();

    let frames = peer.recv(&mut client);
    assert_eq!(frames[0], Frame::settings_ack());
    assert_eq!(frames[1], Frame::data(id, vec![0u8; 200], true));
}

#[test]
fn test_receive_window_replenished_at_half() {
    let (mut server, mut peer) = server_handshake(SessionConfig::new(), vec![]);

    peer.send_headers(1, &request(), false);
    peer.send(Frame::data(1, vec![0u8; 16_384], false));
    peer.deliver(&mut server).unwrap();
    assert!(peer.recv(&mut server).is_empty());

    peer.send(Frame::data(1, vec![0u8; 16_384], false)).deliver(&mut server).unwrap();
    assert_eq!(
        peer.recv(&mut server),
        vec![Frame::window_update(0, 32_768), Frame::window_update(1, 32_768)]
    );
    assert_eq!(server.stats().recv_window, 65_535);
    assert_eq!(server.stream_stats(1).unwrap().recv_window, Some(65_535));
}

#[test]
fn test_no_stream_window_update_after_end_stream() {
    let (mut server, mut peer) = server_handshake(SessionConfig::new(), vec![]);

    peer.send_headers(1, &request(), false);
    peer.send(Frame::data(1, vec![0u8; 16_384], false));
    peer.send(Frame::data(1, vec![0u8; 16_384], true));
    peer.deliver(&mut server).unwrap();

    assert_eq!(peer.recv(&mut server), vec![Frame::window_update(0, 32_768)]);
}

#[test]
fn test_stream_window_overrun_resets_stream() {
    let (mut server, mut peer) = server_handshake(SessionConfig::new().initial_window_size(100), vec![]);

    peer.send_headers(1, &request(), false);
    peer.send(Frame::data(1, vec![0u8; 101], false));
    peer.deliver(&mut server).unwrap();

    assert_eq!(
        peer.recv(&mut server),
        vec![Frame::rst_stream(1, Reason::FLOW_CONTROL_ERROR.code())]
    );
    assert!(!server.is_closed());
    let events = events(&mut server);
    assert_eq!(
        events.last(),
        Some(&Event::StreamClosed {
            stream_id: 1,
            error: Some(Reason::FLOW_CONTROL_ERROR),
        })
    );
    // The connection window is charged regardless
    assert_eq!(server.stats().recv_window, 65_535 - 101);
}

#[test]
fn test_connection_window_overrun_is_fatal() {
    let config = SessionConfig::new().max_frame_size(100_000).initial_window_size(200_000);
    let (mut server, mut peer) = server_handshake(config, vec![]);

    peer.send_headers(1, &request(), false);
    let mut raw = BytesMut::new();
    FrameCodec::encode(&Frame::data(1, vec![0u8; 70_000], false), 100_000, &mut raw);
    peer.deliver(&mut server).unwrap();

    let err = server.receive(&raw).unwrap_err();
    assert_eq!(err.reason(), Reason::FLOW_CONTROL_ERROR);
    assert!(server.is_closed());

    let frames = peer.recv(&mut server);
    assert!(matches!(
        frames.last(),
        Some(Frame::GoAway { last_stream_id: 1, error_code: 3, .. })
    ));
}

#[test]
fn test_window_update_overflow_on_stream() {
    let (mut client, mut peer) = client_handshake(SessionConfig::new(), vec![]);
    let id = client.create_stream(request(), None, false).unwrap();
    peer.recv(&mut client);
    events(&mut client);

    peer.send(Frame::window_update(id, MAX_WINDOW_SIZE as u32))
        .deliver(&mut client)
        .unwrap();

    assert_eq!(
        peer.recv(&mut client),
        vec![Frame::rst_stream(id, Reason::FLOW_CONTROL_ERROR.code())]
    );
    assert_eq!(
        events(&mut client),
        vec![Event::StreamClosed {
            stream_id: id,
            error: Some(Reason::FLOW_CONTROL_ERROR),
        }]
    );
}

#[test]
fn test_window_update_overflow_on_connection() {
    let (mut client, mut peer) = client_handshake(SessionConfig::new(), vec![]);

    let err = peer
        .send(Frame::window_update(0, MAX_WINDOW_SIZE as u32))
        .deliver(&mut client)
        .unwrap_err();
    assert_eq!(err.reason(), Reason::FLOW_CONTROL_ERROR);
    assert!(client.is_closed());
    assert!(matches!(
        events(&mut client).last(),
        Some(Event::SessionError(e)) if e.reason() == Reason::FLOW_CONTROL_ERROR
    ));
}

#[test]
fn test_zero_increment() {
    let (mut client, mut peer) = client_handshake(SessionConfig::new(), vec![]);
    let id = client.create_stream(request(), None, false).unwrap();
    peer.recv(&mut client);

    peer.send(Frame::window_update(id, 0)).deliver(&mut client).unwrap();
    assert_eq!(
        peer.recv(&mut client),
        vec![Frame::rst_stream(id, Reason::PROTOCOL_ERROR.code())]
    );

    let err = peer.send(Frame::window_update(0, 0)).deliver(&mut client).unwrap_err();
    assert_eq!(err.reason(), Reason::PROTOCOL_ERROR);
}

#[test]
fn test_larger_connection_window_announced_up_front() {
    init_tracing();
    let mut client = Session::client(SessionConfig::new().connection_window(1_048_576)).unwrap();
    let mut peer = Peer::for_client();

    let frames = peer.recv(&mut client);
    assert_eq!(frames[1], Frame::window_update(0, 1_048_576 - 65_535));
    assert_eq!(client.stats().recv_window, 1_048_576);
    assert_eq!(client.stats().local_window_target, 1_048_576);
}

#[test]
fn test_response_body_flows_back() {
    let (mut client, mut peer) = client_handshake(SessionConfig::new(), vec![]);
    let id = client.create_stream(request(), None, true).unwrap();
    peer.recv(&mut client);

    peer.send_headers(id, &response("200"), false);
    peer.send(Frame::data(id, &b"hello"[..], true));
    peer.deliver(&mut client).unwrap();

    assert_eq!(
        events(&mut client),
        vec![
            Event::Headers {
                stream_id: id,
                headers: response("200"),
                end_stream: false,
            },
            Event::Data {
                stream_id: id,
                data: Bytes::from_static(b"hello"),
                end_stream: true,
            },
            Event::StreamClosed { stream_id: id, error: None },
        ]
    );
}
