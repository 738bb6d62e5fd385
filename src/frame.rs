//! HTTP/2 frame vocabulary (RFC 7540 Section 4 and 6).
//!
//! Frames here are typed values; turning them into bytes and back is the job of
//! [`FrameCodec`](crate::codec::FrameCodec). Header blocks stay HPACK-encoded
//! at this layer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::priority::PrioritySpec;

/// Stream identifier (31 bits). Stream 0 is the connection itself.
pub type StreamId = u32;

/// Largest usable stream id.
pub const MAX_STREAM_ID: StreamId = (1 << 31) - 1;

/// Length of every frame header.
pub const FRAME_HEADER_LEN: usize = 9;

/// The HTTP/2 connection preface (24 bytes)
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Check if data starts with HTTP/2 connection preface (h2c detection)
pub fn is_h2c_preface(data: &[u8]) -> bool {
    data.len() >= CONNECTION_PREFACE.len() && &data[..CONNECTION_PREFACE.len()] == CONNECTION_PREFACE
}

/// HTTP/2 frame types (RFC 7540 Section 6, RFC 7838, RFC 8336)
pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
    pub const ALTSVC: u8 = 0xa;
    pub const ORIGIN: u8 = 0xc;
}

/// HTTP/2 frame flags
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    /// Shares its bit with END_STREAM; only meaningful on SETTINGS and PING.
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// A parsed HTTP/2 frame header (9 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32, // 24 bits
    pub kind: u8,
    pub flags: u8,
    pub stream_id: StreamId, // 31 bits (high bit reserved)
}

impl FrameHeader {
    pub fn new(length: usize, kind: u8, flags: u8, stream_id: StreamId) -> Self {
        Self {
            length: length as u32,
            kind,
            flags,
            stream_id,
        }
    }

    /// Parse a 9-byte frame header
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return None;
        }

        let length = ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | (data[2] as u32);
        let stream_id = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) & MAX_STREAM_ID;

        Some(Self {
            length,
            kind: data[3],
            flags: data[4],
            stream_id,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_uint(self.length as u64, 3);
        dst.put_u8(self.kind);
        dst.put_u8(self.flags);
        dst.put_u32(self.stream_id & MAX_STREAM_ID);
    }

    /// Total frame size including header
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_LEN + self.length as usize
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// A decoded (or to-be-encoded) HTTP/2 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data {
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
        /// Pad length when the frame was (or should be) padded.
        padding: Option<u8>,
    },
    /// A complete header block, CONTINUATION frames already folded in.
    Headers {
        stream_id: StreamId,
        priority: Option<PrioritySpec>,
        header_block: Bytes,
        end_stream: bool,
    },
    Priority {
        stream_id: StreamId,
        spec: PrioritySpec,
    },
    RstStream {
        stream_id: StreamId,
        error_code: u32,
    },
    Settings {
        ack: bool,
        /// Raw (identifier, value) pairs, unknown identifiers included.
        params: Vec<(u16, u32)>,
    },
    PushPromise {
        stream_id: StreamId,
        promised_stream_id: StreamId,
        header_block: Bytes,
    },
    Ping {
        ack: bool,
        payload: [u8; 8],
    },
    GoAway {
        last_stream_id: StreamId,
        error_code: u32,
        debug_data: Bytes,
    },
    WindowUpdate {
        stream_id: StreamId,
        increment: u32,
    },
    AltSvc {
        stream_id: StreamId,
        origin: Bytes,
        field_value: Bytes,
    },
    Origin {
        origins: Vec<Bytes>,
    },
    /// Extension frame this crate does not interpret.
    Unknown {
        kind: u8,
        flags: u8,
        stream_id: StreamId,
        payload: Bytes,
    },
}

impl Frame {
    pub fn data(stream_id: StreamId, data: impl Into<Bytes>, end_stream: bool) -> Self {
        Frame::Data {
            stream_id,
            data: data.into(),
            end_stream,
            padding: None,
        }
    }

    pub fn headers(stream_id: StreamId, header_block: impl Into<Bytes>, end_stream: bool) -> Self {
        Frame::Headers {
            stream_id,
            priority: None,
            header_block: header_block.into(),
            end_stream,
        }
    }

    pub fn settings(params: Vec<(u16, u32)>) -> Self {
        Frame::Settings { ack: false, params }
    }

    pub fn settings_ack() -> Self {
        Frame::Settings {
            ack: true,
            params: Vec::new(),
        }
    }

    pub fn rst_stream(stream_id: StreamId, error_code: u32) -> Self {
        Frame::RstStream { stream_id, error_code }
    }

    pub fn window_update(stream_id: StreamId, increment: u32) -> Self {
        Frame::WindowUpdate { stream_id, increment }
    }

    pub fn goaway(last_stream_id: StreamId, error_code: u32, debug_data: impl Into<Bytes>) -> Self {
        Frame::GoAway {
            last_stream_id,
            error_code,
            debug_data: debug_data.into(),
        }
    }

    /// Stream the frame belongs to; 0 for connection-level frames.
    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::Data { stream_id, .. }
            | Frame::Headers { stream_id, .. }
            | Frame::Priority { stream_id, .. }
            | Frame::RstStream { stream_id, .. }
            | Frame::PushPromise { stream_id, .. }
            | Frame::WindowUpdate { stream_id, .. }
            | Frame::AltSvc { stream_id, .. }
            | Frame::Unknown { stream_id, .. } => *stream_id,
            Frame::Settings { .. } | Frame::Ping { .. } | Frame::GoAway { .. } | Frame::Origin { .. } => 0,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Frame::Data { .. } => "DATA",
            Frame::Headers { .. } => "HEADERS",
            Frame::Priority { .. } => "PRIORITY",
            Frame::RstStream { .. } => "RST_STREAM",
            Frame::Settings { .. } => "SETTINGS",
            Frame::PushPromise { .. } => "PUSH_PROMISE",
            Frame::Ping { .. } => "PING",
            Frame::GoAway { .. } => "GOAWAY",
            Frame::WindowUpdate { .. } => "WINDOW_UPDATE",
            Frame::AltSvc { .. } => "ALTSVC",
            Frame::Origin { .. } => "ORIGIN",
            Frame::Unknown { .. } => "UNKNOWN",
        }
    }

    /// Bytes this frame charges against flow-control windows.
    ///
    /// Only DATA is flow controlled; padding counts, including the pad length octet.
    pub fn flow_controlled_len(&self) -> u32 {
        match self {
            Frame::Data { data, padding, .. } => data.len() as u32 + padding.map_or(0, |pad| pad as u32 + 1),
            _ => 0,
        }
    }
}
