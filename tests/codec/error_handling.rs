//! Tests for FrameCodec error handling

use h2_session::{FrameCodec, Reason};

use super::raw_frame;

fn reason_of(data: &[u8]) -> Reason {
    let mut codec = FrameCodec::new();
    let err = codec.process(data).unwrap_err();
    assert!(err.is_connection_error(), "{:?} should be connection-fatal", err);
    err.reason()
}

#[test]
fn test_window_update_wrong_length() {
    assert_eq!(reason_of(&raw_frame(8, 0, 1, &[0, 0])), Reason::FRAME_SIZE_ERROR);
}

#[test]
fn test_ping_wrong_length() {
    assert_eq!(reason_of(&raw_frame(6, 0, 0, &[1, 2, 3, 4])), Reason::FRAME_SIZE_ERROR);
}

#[test]
fn test_goaway_too_short() {
    assert_eq!(reason_of(&raw_frame(7, 0, 0, &[0, 0, 0, 5])), Reason::FRAME_SIZE_ERROR);
}

#[test]
fn test_rst_stream_wrong_length() {
    assert_eq!(reason_of(&raw_frame(3, 0, 1, &[0, 0])), Reason::FRAME_SIZE_ERROR);
}

#[test]
fn test_priority_wrong_length() {
    assert_eq!(reason_of(&raw_frame(2, 0, 1, &[0, 0, 0, 0])), Reason::FRAME_SIZE_ERROR);
}

#[test]
fn test_settings_not_multiple_of_six() {
    assert_eq!(reason_of(&raw_frame(4, 0, 0, &[0, 4, 0, 0, 0])), Reason::FRAME_SIZE_ERROR);
}

#[test]
fn test_settings_ack_with_payload() {
    assert_eq!(
        reason_of(&raw_frame(4, 1, 0, &[0, 4, 0, 0, 0, 1])),
        Reason::FRAME_SIZE_ERROR
    );
}

#[test]
fn test_padded_data_frame_invalid_padding() {
    // Pad length 10 > remaining 5 bytes
    let mut payload = vec![10];
    payload.extend_from_slice(b"hello");
    assert_eq!(reason_of(&raw_frame(0, 0x8, 1, &payload)), Reason::PROTOCOL_ERROR);
}

#[test]
fn test_data_on_stream_zero() {
    assert_eq!(reason_of(&raw_frame(0, 0, 0, b"x")), Reason::PROTOCOL_ERROR);
}

#[test]
fn test_headers_on_stream_zero() {
    assert_eq!(reason_of(&raw_frame(1, 4, 0, &[0x82])), Reason::PROTOCOL_ERROR);
}

#[test]
fn test_settings_on_stream() {
    assert_eq!(reason_of(&raw_frame(4, 0, 1, &[])), Reason::PROTOCOL_ERROR);
}

#[test]
fn test_ping_on_stream() {
    assert_eq!(reason_of(&raw_frame(6, 0, 1, &[0; 8])), Reason::PROTOCOL_ERROR);
}

#[test]
fn test_goaway_on_stream() {
    assert_eq!(reason_of(&raw_frame(7, 0, 3, &[0; 8])), Reason::PROTOCOL_ERROR);
}

#[test]
fn test_rst_stream_on_stream_zero() {
    assert_eq!(reason_of(&raw_frame(3, 0, 0, &[0, 0, 0, 8])), Reason::PROTOCOL_ERROR);
}
