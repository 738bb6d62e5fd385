//! Tests for HTTP/2 frame parsing

use bytes::Bytes;
use h2_session::{flags, frame_type, Frame, FrameCodec, FrameHeader, PrioritySpec};

use super::raw_frame;

#[test]
fn test_frame_header_parse() {
    let data = [0, 0, 5, 0, 1, 0, 0, 0, 1];
    let header = FrameHeader::parse(&data).unwrap();
    assert_eq!(header.length, 5);
    assert_eq!(header.kind, frame_type::DATA);
    assert!(header.has_flag(flags::END_STREAM));
    assert_eq!(header.stream_id, 1);
    assert_eq!(header.total_size(), 14);
}

#[test]
fn test_frame_header_parse_clears_reserved_bit() {
    let data = [0, 0, 0, 4, 0, 0x80, 0, 0, 3];
    assert_eq!(FrameHeader::parse(&data).unwrap().stream_id, 3);
}

#[test]
fn test_frame_header_incomplete() {
    assert!(FrameHeader::parse(&[0, 0, 5, 0]).is_none());
}

#[test]
fn test_parse_data() {
    let mut codec = FrameCodec::new();
    let frames = codec.process(&raw_frame(0, 1, 1, b"hello")).unwrap();
    assert_eq!(frames, vec![Frame::data(1, &b"hello"[..], true)]);
}

#[test]
fn test_padded_data_frame() {
    let mut codec = FrameCodec::new();

    // 0x9 = END_STREAM | PADDED, pad length 4
    let mut payload = vec![4];
    payload.extend_from_slice(b"hello");
    payload.extend_from_slice(&[0, 0, 0, 0]);

    let frames = codec.process(&raw_frame(0, 0x9, 1, &payload)).unwrap();
    match &frames[0] {
        Frame::Data {
            stream_id,
            data,
            end_stream,
            padding,
        } => {
            assert_eq!(*stream_id, 1);
            assert_eq!(&data[..], b"hello");
            assert!(*end_stream);
            assert_eq!(*padding, Some(4));
        }
        other => panic!("Expected Data frame, got {:?}", other),
    }
    // Padding counts against flow control
    assert_eq!(frames[0].flow_controlled_len(), 10);
}

#[test]
fn test_parse_headers() {
    let mut codec = FrameCodec::new();
    let frames = codec.process(&raw_frame(1, 0x5, 3, &[0x82, 0x86, 0x84])).unwrap();
    assert_eq!(
        frames,
        vec![Frame::Headers {
            stream_id: 3,
            priority: None,
            header_block: Bytes::from_static(&[0x82, 0x86, 0x84]),
            end_stream: true,
        }]
    );
}

#[test]
fn test_headers_with_priority_flag() {
    let mut codec = FrameCodec::new();

    // 0x24 = END_HEADERS | PRIORITY; exclusive dependency on 3, weight 256
    let payload = [0x80, 0, 0, 3, 255, 0x82, 0x86];
    let frames = codec.process(&raw_frame(1, 0x24, 5, &payload)).unwrap();

    match &frames[0] {
        Frame::Headers {
            priority, header_block, ..
        } => {
            assert_eq!(*priority, Some(PrioritySpec::new(3, 256, true)));
            assert_eq!(&header_block[..], &[0x82, 0x86]);
        }
        other => panic!("Expected Headers frame, got {:?}", other),
    }
}

#[test]
fn test_padded_headers_with_priority() {
    let mut codec = FrameCodec::new();

    // 0x2c = END_HEADERS | PADDED | PRIORITY
    let payload = [2, 0, 0, 0, 0, 15, 0x82, 0, 0];
    let frames = codec.process(&raw_frame(1, 0x2c, 1, &payload)).unwrap();
    match &frames[0] {
        Frame::Headers {
            priority, header_block, ..
        } => {
            assert_eq!(*priority, Some(PrioritySpec::new(0, 16, false)));
            assert_eq!(&header_block[..], &[0x82]);
        }
        other => panic!("Expected Headers frame, got {:?}", other),
    }
}

#[test]
fn test_parse_priority_frame() {
    let mut codec = FrameCodec::new();
    let frames = codec.process(&raw_frame(2, 0, 5, &[0, 0, 0, 1, 31])).unwrap();
    assert_eq!(
        frames,
        vec![Frame::Priority {
            stream_id: 5,
            spec: PrioritySpec::new(1, 32, false),
        }]
    );
}

#[test]
fn test_parse_rst_stream() {
    let mut codec = FrameCodec::new();
    let frames = codec.process(&raw_frame(3, 0, 1, &[0, 0, 0, 8])).unwrap();
    assert_eq!(frames, vec![Frame::rst_stream(1, 8)]);
}

#[test]
fn test_parse_settings() {
    let mut codec = FrameCodec::new();
    let payload = [0, 4, 0, 0x10, 0, 0, 0, 3, 0, 0, 0, 100];
    let frames = codec.process(&raw_frame(4, 0, 0, &payload)).unwrap();
    assert_eq!(frames, vec![Frame::settings(vec![(4, 0x100000), (3, 100)])]);
}

#[test]
fn test_settings_keeps_unknown_identifiers() {
    let mut codec = FrameCodec::new();
    let payload = [0, 0x99, 0, 0, 0, 1];
    let frames = codec.process(&raw_frame(4, 0, 0, &payload)).unwrap();
    assert_eq!(frames, vec![Frame::settings(vec![(0x99, 1)])]);
}

#[test]
fn test_parse_ping_and_ack() {
    let mut codec = FrameCodec::new();
    let mut data = raw_frame(6, 0, 0, &[1, 2, 3, 4, 5, 6, 7, 8]);
    data.extend(raw_frame(6, 1, 0, &[0xde, 0xad, 0xbe, 0xef, 0xca, 0xfe, 0xba, 0xbe]));

    let frames = codec.process(&data).unwrap();
    assert_eq!(
        frames,
        vec![
            Frame::Ping {
                ack: false,
                payload: [1, 2, 3, 4, 5, 6, 7, 8],
            },
            Frame::Ping {
                ack: true,
                payload: [0xde, 0xad, 0xbe, 0xef, 0xca, 0xfe, 0xba, 0xbe],
            },
        ]
    );
}

#[test]
fn test_parse_goaway_with_debug_data() {
    let mut codec = FrameCodec::new();
    let mut payload = vec![0, 0, 0, 7, 0, 0, 0, 2];
    payload.extend_from_slice(b"bye");
    let frames = codec.process(&raw_frame(7, 0, 0, &payload)).unwrap();
    assert_eq!(frames, vec![Frame::goaway(7, 2, &b"bye"[..])]);
}

#[test]
fn test_window_update_clears_reserved_bit() {
    let mut codec = FrameCodec::new();
    let frames = codec.process(&raw_frame(8, 0, 0, &[0x80, 0x01, 0x00, 0x00])).unwrap();
    assert_eq!(frames, vec![Frame::window_update(0, 65_536)]);
}

#[test]
fn test_parse_push_promise() {
    let mut codec = FrameCodec::new();
    let payload = [0, 0, 0, 2, 0x82, 0x84];
    let frames = codec.process(&raw_frame(5, 4, 1, &payload)).unwrap();
    assert_eq!(
        frames,
        vec![Frame::PushPromise {
            stream_id: 1,
            promised_stream_id: 2,
            header_block: Bytes::from_static(&[0x82, 0x84]),
        }]
    );
}

#[test]
fn test_parse_altsvc() {
    let mut codec = FrameCodec::new();
    let mut payload = vec![0, 11];
    payload.extend_from_slice(b"example.com");
    payload.extend_from_slice(b"h2=\":443\"");

    let frames = codec.process(&raw_frame(frame_type::ALTSVC, 0, 0, &payload)).unwrap();
    assert_eq!(
        frames,
        vec![Frame::AltSvc {
            stream_id: 0,
            origin: Bytes::from_static(b"example.com"),
            field_value: Bytes::from_static(b"h2=\":443\""),
        }]
    );
}

#[test]
fn test_malformed_altsvc_ignored() {
    let mut codec = FrameCodec::new();
    // Origin length runs past the payload
    let frames = codec.process(&raw_frame(frame_type::ALTSVC, 0, 0, &[0, 50, b'a'])).unwrap();
    assert!(frames.is_empty());
}

#[test]
fn test_parse_origin() {
    let mut codec = FrameCodec::new();
    let mut payload = vec![0, 19];
    payload.extend_from_slice(b"https://example.com");
    payload.extend_from_slice(&[0, 15]);
    payload.extend_from_slice(b"https://foo.com");

    let frames = codec.process(&raw_frame(frame_type::ORIGIN, 0, 0, &payload)).unwrap();
    assert_eq!(
        frames,
        vec![Frame::Origin {
            origins: vec![
                Bytes::from_static(b"https://example.com"),
                Bytes::from_static(b"https://foo.com"),
            ],
        }]
    );
}

#[test]
fn test_origin_on_stream_ignored() {
    let mut codec = FrameCodec::new();
    let frames = codec.process(&raw_frame(frame_type::ORIGIN, 0, 1, &[0, 1, b'a'])).unwrap();
    assert!(frames.is_empty());
}

#[test]
fn test_unknown_frame_type_passed_through() {
    let mut codec = FrameCodec::new();
    let frames = codec.process(&raw_frame(0xff, 0x3, 1, &[1, 2, 3])).unwrap();
    assert_eq!(
        frames,
        vec![Frame::Unknown {
            kind: 0xff,
            flags: 0x3,
            stream_id: 1,
            payload: Bytes::from_static(&[1, 2, 3]),
        }]
    );
    assert_eq!(frames[0].kind_name(), "UNKNOWN");
}
