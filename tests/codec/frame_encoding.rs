//! Tests for HTTP/2 frame serialization

use bytes::{Bytes, BytesMut};
use h2_session::{flags, frame_type, Frame, FrameCodec, PrioritySpec, Reason};

fn encode(frame: &Frame) -> BytesMut {
    let mut buf = BytesMut::new();
    FrameCodec::encode(frame, 16_384, &mut buf);
    buf
}

/// Encode `frame` and decode it back with a fresh codec.
fn reparse(frame: &Frame) -> Frame {
    let mut codec = FrameCodec::new();
    let mut frames = codec.process(&encode(frame)).unwrap();
    assert_eq!(frames.len(), 1);
    frames.remove(0)
}

#[test]
fn test_encode_rst_stream() {
    let frame = encode(&Frame::rst_stream(1, Reason::HTTP_1_1_REQUIRED.code()));
    assert_eq!(frame.len(), 13);
    assert_eq!(&frame[0..3], &[0, 0, 4]);
    assert_eq!(frame[3], frame_type::RST_STREAM);
    assert_eq!(&frame[9..], &[0, 0, 0, 0xd]);
}

#[test]
fn test_encode_settings_ack() {
    let frame = encode(&Frame::settings_ack());
    assert_eq!(&frame[..], &[0, 0, 0, frame_type::SETTINGS, flags::ACK, 0, 0, 0, 0]);
}

#[test]
fn test_encode_settings_with_window() {
    let frame = encode(&Frame::settings(vec![(4, 1_048_576)]));
    assert_eq!(frame.len(), 15);
    assert_eq!(&frame[9..11], &[0, 4]);
    assert_eq!(&frame[11..], &1_048_576u32.to_be_bytes());
}

#[test]
fn test_encode_ping_ack() {
    let payload = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
    let frame = encode(&Frame::Ping { ack: true, payload });
    assert_eq!(frame.len(), 17);
    assert_eq!(frame[3], frame_type::PING);
    assert_eq!(frame[4], flags::ACK);
    assert_eq!(&frame[9..], &payload);
}

#[test]
fn test_encode_window_update() {
    let frame = encode(&Frame::window_update(7, 32_768));
    assert_eq!(frame.len(), 13);
    assert_eq!(frame[3], frame_type::WINDOW_UPDATE);
    assert_eq!(&frame[5..9], &[0, 0, 0, 7]);
}

#[test]
fn test_encode_goaway() {
    let frame = encode(&Frame::goaway(5, Reason::NO_ERROR.code(), Bytes::new()));
    assert_eq!(frame.len(), 17);
    assert_eq!(frame[3], frame_type::GOAWAY);
    assert_eq!(&frame[9..13], &[0, 0, 0, 5]);
}

#[test]
fn test_encode_padded_data() {
    let frame = Frame::Data {
        stream_id: 3,
        data: Bytes::from_static(b"abc"),
        end_stream: false,
        padding: Some(2),
    };
    let raw = encode(&frame);
    assert_eq!(&raw[0..3], &[0, 0, 6]);
    assert_eq!(raw[4], flags::PADDED);
    assert_eq!(reparse(&frame), frame);
}

#[test]
fn test_headers_with_priority_reparse() {
    let frame = Frame::Headers {
        stream_id: 5,
        priority: Some(PrioritySpec::new(3, 200, true)),
        header_block: Bytes::from_static(&[0x82, 0x87]),
        end_stream: false,
    };
    let raw = encode(&frame);
    assert_eq!(raw[4], flags::END_HEADERS | flags::PRIORITY);
    assert_eq!(reparse(&frame), frame);
}

#[test]
fn test_push_promise_reparse() {
    let frame = Frame::PushPromise {
        stream_id: 1,
        promised_stream_id: 4,
        header_block: Bytes::from_static(&[0x82, 0x84, 0x86]),
    };
    assert_eq!(reparse(&frame), frame);
}

#[test]
fn test_origin_reparse() {
    let frame = Frame::Origin {
        origins: vec![Bytes::from_static(b"https://a.example")],
    };
    assert_eq!(reparse(&frame), frame);
}

#[test]
fn test_kind_and_stream_id() {
    let frame = Frame::window_update(9, 1);
    assert_eq!(frame.kind_name(), "WINDOW_UPDATE");
    assert_eq!(frame.stream_id(), 9);
    assert_eq!(Frame::settings_ack().stream_id(), 0);
    assert_eq!(Frame::data(1, &b"abc"[..], false).flow_controlled_len(), 3);
    assert_eq!(Frame::window_update(0, 10).flow_controlled_len(), 0);
}
