//! HTTP/2 frame codec.
//!
//! Sans-I/O: feed raw bytes in, pull typed [`Frame`]s out, and encode frames
//! into a caller-owned buffer. Header blocks split across CONTINUATION frames
//! are reassembled here, so callers only ever see complete blocks.
//!
//! Reference: RFC 7540 Section 4 and 6

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{H2Error, Reason};
use crate::frame::{
    flags, frame_type, Frame, FrameHeader, StreamId, CONNECTION_PREFACE, FRAME_HEADER_LEN, MAX_STREAM_ID,
};
use crate::priority::PrioritySpec;
use crate::settings::DEFAULT_MAX_FRAME_SIZE;

/// Maximum accumulated header block size (256 KB).
/// Prevents unbounded memory growth from malicious/buggy CONTINUATION floods.
pub const MAX_HEADER_BLOCK_SIZE: usize = 256 * 1024;

/// Outcome of one [`FrameCodec::decode`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Frame(Frame),
    NeedMoreData,
}

/// A header block waiting for CONTINUATION frames.
#[derive(Debug)]
struct PendingHeaders {
    stream_id: StreamId,
    end_stream: bool,
    priority: Option<PrioritySpec>,
    /// Set when the block started with PUSH_PROMISE.
    promised_stream_id: Option<StreamId>,
    block: BytesMut,
}

#[derive(Debug)]
pub struct FrameCodec {
    /// Buffer for incomplete frames
    buffer: BytesMut,
    /// Waiting for the client connection preface (servers only)
    preface_pending: bool,
    /// Largest frame payload we accept
    max_frame_size: u32,
    max_header_block_size: usize,
    pending_headers: Option<PendingHeaders>,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            preface_pending: false,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_header_block_size: MAX_HEADER_BLOCK_SIZE,
            pending_headers: None,
        }
    }

    /// A codec for the server side, which must see the client preface first.
    pub fn expecting_preface() -> Self {
        Self {
            preface_pending: true,
            ..Self::new()
        }
    }

    pub fn set_max_frame_size(&mut self, size: u32) {
        self.max_frame_size = size;
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    pub fn set_max_header_block_size(&mut self, size: usize) {
        self.max_header_block_size = size;
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append received bytes.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Decode the next complete frame from the buffer.
    pub fn decode(&mut self) -> Result<Decoded, H2Error> {
        if self.preface_pending {
            let n = CONNECTION_PREFACE.len().min(self.buffer.len());
            if self.buffer[..n] != CONNECTION_PREFACE[..n] {
                return Err(H2Error::protocol("invalid connection preface"));
            }
            if n < CONNECTION_PREFACE.len() {
                return Ok(Decoded::NeedMoreData);
            }
            self.buffer.advance(CONNECTION_PREFACE.len());
            self.preface_pending = false;
        }

        loop {
            let header = match FrameHeader::parse(&self.buffer) {
                Some(h) => h,
                None => return Ok(Decoded::NeedMoreData),
            };

            // Reject before buffering the payload
            if header.length > self.max_frame_size {
                return Err(H2Error::frame_size(format!(
                    "frame of {} bytes exceeds max frame size {}",
                    header.length, self.max_frame_size
                )));
            }

            if self.buffer.len() < header.total_size() {
                return Ok(Decoded::NeedMoreData);
            }

            let mut raw = self.buffer.split_to(header.total_size());
            raw.advance(FRAME_HEADER_LEN);
            let payload = raw.freeze();

            if let Some(frame) = self.parse_frame(&header, payload)? {
                return Ok(Decoded::Frame(frame));
            }
        }
    }

    /// Feed `data` and decode every complete frame.
    pub fn process(&mut self, data: &[u8]) -> Result<Vec<Frame>, H2Error> {
        self.feed(data);
        let mut frames = Vec::new();
        while let Decoded::Frame(frame) = self.decode()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Parse a single frame; `None` while a header block is still incomplete
    /// or for frames that are dropped.
    fn parse_frame(&mut self, header: &FrameHeader, mut payload: Bytes) -> Result<Option<Frame>, H2Error> {
        if let Some(pending) = &self.pending_headers {
            if header.kind != frame_type::CONTINUATION {
                return Err(H2Error::protocol(format!(
                    "expected CONTINUATION for stream {}, got frame type {:#x}",
                    pending.stream_id, header.kind
                )));
            }
        }

        let stream_id = header.stream_id;
        match header.kind {
            frame_type::DATA => {
                require_stream(header, "DATA")?;
                let padding = strip_padding(header, &mut payload)?;
                Ok(Some(Frame::Data {
                    stream_id,
                    data: payload,
                    end_stream: header.has_flag(flags::END_STREAM),
                    padding,
                }))
            }
            frame_type::HEADERS => {
                require_stream(header, "HEADERS")?;
                strip_padding(header, &mut payload)?;
                let priority = if header.has_flag(flags::PRIORITY) {
                    if payload.len() < 5 {
                        return Err(H2Error::frame_size("HEADERS priority block truncated"));
                    }
                    let mut raw = [0u8; 5];
                    payload.copy_to_slice(&mut raw);
                    Some(PrioritySpec::parse(&raw))
                } else {
                    None
                };
                let end_stream = header.has_flag(flags::END_STREAM);
                if header.has_flag(flags::END_HEADERS) {
                    return Ok(Some(Frame::Headers {
                        stream_id,
                        priority,
                        header_block: payload,
                        end_stream,
                    }));
                }
                self.start_header_block(PendingHeaders {
                    stream_id,
                    end_stream,
                    priority,
                    promised_stream_id: None,
                    block: BytesMut::from(&payload[..]),
                })?;
                Ok(None)
            }
            frame_type::PRIORITY => {
                require_stream(header, "PRIORITY")?;
                if payload.len() != 5 {
                    return Err(H2Error::frame_size("PRIORITY frame must be 5 bytes"));
                }
                let mut raw = [0u8; 5];
                payload.copy_to_slice(&mut raw);
                Ok(Some(Frame::Priority {
                    stream_id,
                    spec: PrioritySpec::parse(&raw),
                }))
            }
            frame_type::RST_STREAM => {
                require_stream(header, "RST_STREAM")?;
                if payload.len() != 4 {
                    return Err(H2Error::frame_size("RST_STREAM frame must be 4 bytes"));
                }
                Ok(Some(Frame::RstStream {
                    stream_id,
                    error_code: payload.get_u32(),
                }))
            }
            frame_type::SETTINGS => {
                require_connection(header, "SETTINGS")?;
                let ack = header.has_flag(flags::ACK);
                if ack && !payload.is_empty() {
                    return Err(H2Error::frame_size("SETTINGS ACK with payload"));
                }
                if payload.len() % 6 != 0 {
                    return Err(H2Error::frame_size("SETTINGS payload not a multiple of 6"));
                }
                let mut params = Vec::with_capacity(payload.len() / 6);
                while payload.has_remaining() {
                    let id = payload.get_u16();
                    let value = payload.get_u32();
                    params.push((id, value));
                }
                Ok(Some(Frame::Settings { ack, params }))
            }
            frame_type::PUSH_PROMISE => {
                require_stream(header, "PUSH_PROMISE")?;
                strip_padding(header, &mut payload)?;
                if payload.len() < 4 {
                    return Err(H2Error::frame_size("PUSH_PROMISE frame too short"));
                }
                let promised_stream_id = payload.get_u32() & MAX_STREAM_ID;
                if header.has_flag(flags::END_HEADERS) {
                    return Ok(Some(Frame::PushPromise {
                        stream_id,
                        promised_stream_id,
                        header_block: payload,
                    }));
                }
                self.start_header_block(PendingHeaders {
                    stream_id,
                    end_stream: false,
                    priority: None,
                    promised_stream_id: Some(promised_stream_id),
                    block: BytesMut::from(&payload[..]),
                })?;
                Ok(None)
            }
            frame_type::PING => {
                require_connection(header, "PING")?;
                if payload.len() != 8 {
                    return Err(H2Error::frame_size("PING frame must be 8 bytes"));
                }
                let mut data = [0u8; 8];
                payload.copy_to_slice(&mut data);
                Ok(Some(Frame::Ping {
                    ack: header.has_flag(flags::ACK),
                    payload: data,
                }))
            }
            frame_type::GOAWAY => {
                require_connection(header, "GOAWAY")?;
                if payload.len() < 8 {
                    return Err(H2Error::frame_size("GOAWAY frame too short"));
                }
                let last_stream_id = payload.get_u32() & MAX_STREAM_ID;
                let error_code = payload.get_u32();
                Ok(Some(Frame::GoAway {
                    last_stream_id,
                    error_code,
                    debug_data: payload,
                }))
            }
            frame_type::WINDOW_UPDATE => {
                if payload.len() != 4 {
                    return Err(H2Error::frame_size("WINDOW_UPDATE frame must be 4 bytes"));
                }
                Ok(Some(Frame::WindowUpdate {
                    stream_id,
                    increment: payload.get_u32() & MAX_STREAM_ID,
                }))
            }
            frame_type::CONTINUATION => {
                let Some(mut pending) = self.pending_headers.take() else {
                    return Err(H2Error::protocol(format!(
                        "unexpected CONTINUATION frame for stream {}",
                        stream_id
                    )));
                };
                if pending.stream_id != stream_id {
                    return Err(H2Error::protocol(format!(
                        "CONTINUATION for stream {} but pending headers on stream {}",
                        stream_id, pending.stream_id
                    )));
                }
                pending.block.extend_from_slice(&payload);
                self.check_header_block(pending.block.len())?;
                if !header.has_flag(flags::END_HEADERS) {
                    self.pending_headers = Some(pending);
                    return Ok(None);
                }
                let header_block = pending.block.freeze();
                Ok(Some(match pending.promised_stream_id {
                    Some(promised_stream_id) => Frame::PushPromise {
                        stream_id,
                        promised_stream_id,
                        header_block,
                    },
                    None => Frame::Headers {
                        stream_id,
                        priority: pending.priority,
                        header_block,
                        end_stream: pending.end_stream,
                    },
                }))
            }
            frame_type::ALTSVC => {
                // Malformed ALTSVC frames are ignored (RFC 7838 Section 4)
                if payload.len() < 2 {
                    return Ok(None);
                }
                let origin_len = payload.get_u16() as usize;
                if origin_len > payload.len() {
                    return Ok(None);
                }
                let origin = payload.split_to(origin_len);
                Ok(Some(Frame::AltSvc {
                    stream_id,
                    origin,
                    field_value: payload,
                }))
            }
            frame_type::ORIGIN => {
                // Only meaningful on stream 0 (RFC 8336 Section 2)
                if stream_id != 0 {
                    return Ok(None);
                }
                let mut origins = Vec::new();
                while payload.remaining() >= 2 {
                    let len = payload.get_u16() as usize;
                    if len > payload.len() {
                        return Ok(None);
                    }
                    origins.push(payload.split_to(len));
                }
                Ok(Some(Frame::Origin { origins }))
            }
            kind => Ok(Some(Frame::Unknown {
                kind,
                flags: header.flags,
                stream_id,
                payload,
            })),
        }
    }

    fn start_header_block(&mut self, pending: PendingHeaders) -> Result<(), H2Error> {
        self.check_header_block(pending.block.len())?;
        self.pending_headers = Some(pending);
        Ok(())
    }

    /// Guard against unbounded header block accumulation
    fn check_header_block(&self, len: usize) -> Result<(), H2Error> {
        if len > self.max_header_block_size {
            return Err(H2Error::connection(
                Reason::ENHANCE_YOUR_CALM,
                format!("header block too large ({} bytes, max {})", len, self.max_header_block_size),
            ));
        }
        Ok(())
    }

    /// Reset codec state (e.g., after upstream reconnect)
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending_headers = None;
    }

    /// Serialize `frame` into `dst`.
    ///
    /// Header blocks longer than `max_frame_size` are split into CONTINUATION
    /// frames. DATA frames are written as given; callers size them.
    pub fn encode(frame: &Frame, max_frame_size: u32, dst: &mut BytesMut) {
        let max = max_frame_size.max(DEFAULT_MAX_FRAME_SIZE) as usize;
        match frame {
            Frame::Data {
                stream_id,
                data,
                end_stream,
                padding,
            } => {
                let mut fl = if *end_stream { flags::END_STREAM } else { 0 };
                match padding {
                    Some(pad) => {
                        fl |= flags::PADDED;
                        FrameHeader::new(data.len() + *pad as usize + 1, frame_type::DATA, fl, *stream_id).encode(dst);
                        dst.put_u8(*pad);
                        dst.put_slice(data);
                        dst.put_bytes(0, *pad as usize);
                    }
                    None => {
                        FrameHeader::new(data.len(), frame_type::DATA, fl, *stream_id).encode(dst);
                        dst.put_slice(data);
                    }
                }
            }
            Frame::Headers {
                stream_id,
                priority,
                header_block,
                end_stream,
            } => {
                let mut fl = if *end_stream { flags::END_STREAM } else { 0 };
                let prefix = if priority.is_some() {
                    fl |= flags::PRIORITY;
                    5
                } else {
                    0
                };
                let (first, rest) = header_block.split_at(header_block.len().min(max - prefix));
                if rest.is_empty() {
                    fl |= flags::END_HEADERS;
                }
                FrameHeader::new(prefix + first.len(), frame_type::HEADERS, fl, *stream_id).encode(dst);
                if let Some(spec) = priority {
                    spec.encode(dst);
                }
                dst.put_slice(first);
                encode_continuations(*stream_id, rest, max, dst);
            }
            Frame::Priority { stream_id, spec } => {
                FrameHeader::new(5, frame_type::PRIORITY, 0, *stream_id).encode(dst);
                spec.encode(dst);
            }
            Frame::RstStream { stream_id, error_code } => {
                FrameHeader::new(4, frame_type::RST_STREAM, 0, *stream_id).encode(dst);
                dst.put_u32(*error_code);
            }
            Frame::Settings { ack, params } => {
                let fl = if *ack { flags::ACK } else { 0 };
                FrameHeader::new(params.len() * 6, frame_type::SETTINGS, fl, 0).encode(dst);
                for (id, value) in params {
                    dst.put_u16(*id);
                    dst.put_u32(*value);
                }
            }
            Frame::PushPromise {
                stream_id,
                promised_stream_id,
                header_block,
            } => {
                let (first, rest) = header_block.split_at(header_block.len().min(max - 4));
                let fl = if rest.is_empty() { flags::END_HEADERS } else { 0 };
                FrameHeader::new(4 + first.len(), frame_type::PUSH_PROMISE, fl, *stream_id).encode(dst);
                dst.put_u32(*promised_stream_id & MAX_STREAM_ID);
                dst.put_slice(first);
                encode_continuations(*stream_id, rest, max, dst);
            }
            Frame::Ping { ack, payload } => {
                let fl = if *ack { flags::ACK } else { 0 };
                FrameHeader::new(8, frame_type::PING, fl, 0).encode(dst);
                dst.put_slice(payload);
            }
            Frame::GoAway {
                last_stream_id,
                error_code,
                debug_data,
            } => {
                FrameHeader::new(8 + debug_data.len(), frame_type::GOAWAY, 0, 0).encode(dst);
                dst.put_u32(*last_stream_id & MAX_STREAM_ID);
                dst.put_u32(*error_code);
                dst.put_slice(debug_data);
            }
            Frame::WindowUpdate { stream_id, increment } => {
                FrameHeader::new(4, frame_type::WINDOW_UPDATE, 0, *stream_id).encode(dst);
                dst.put_u32(*increment & MAX_STREAM_ID);
            }
            Frame::AltSvc {
                stream_id,
                origin,
                field_value,
            } => {
                FrameHeader::new(2 + origin.len() + field_value.len(), frame_type::ALTSVC, 0, *stream_id).encode(dst);
                dst.put_u16(origin.len() as u16);
                dst.put_slice(origin);
                dst.put_slice(field_value);
            }
            Frame::Origin { origins } => {
                let len = origins.iter().map(|o| 2 + o.len()).sum();
                FrameHeader::new(len, frame_type::ORIGIN, 0, 0).encode(dst);
                for origin in origins {
                    dst.put_u16(origin.len() as u16);
                    dst.put_slice(origin);
                }
            }
            Frame::Unknown {
                kind,
                flags,
                stream_id,
                payload,
            } => {
                FrameHeader::new(payload.len(), *kind, *flags, *stream_id).encode(dst);
                dst.put_slice(payload);
            }
        }
    }
}

fn encode_continuations(stream_id: StreamId, mut rest: &[u8], max: usize, dst: &mut BytesMut) {
    while !rest.is_empty() {
        let (chunk, tail) = rest.split_at(rest.len().min(max));
        let fl = if tail.is_empty() { flags::END_HEADERS } else { 0 };
        FrameHeader::new(chunk.len(), frame_type::CONTINUATION, fl, stream_id).encode(dst);
        dst.put_slice(chunk);
        rest = tail;
    }
}

fn require_stream(header: &FrameHeader, name: &str) -> Result<(), H2Error> {
    if header.stream_id == 0 {
        return Err(H2Error::protocol(format!("{} frame on stream 0", name)));
    }
    Ok(())
}

fn require_connection(header: &FrameHeader, name: &str) -> Result<(), H2Error> {
    if header.stream_id != 0 {
        return Err(H2Error::protocol(format!(
            "{} frame on stream {}, expected stream 0",
            name, header.stream_id
        )));
    }
    Ok(())
}

/// Strip the PADDED prefix and trailing padding, returning the pad length.
fn strip_padding(header: &FrameHeader, payload: &mut Bytes) -> Result<Option<u8>, H2Error> {
    if !header.has_flag(flags::PADDED) {
        return Ok(None);
    }
    if payload.is_empty() {
        return Err(H2Error::frame_size("PADDED frame with no payload"));
    }
    let pad_length = payload.get_u8();
    if pad_length as usize > payload.len() {
        return Err(H2Error::protocol("invalid padding length"));
    }
    payload.truncate(payload.len() - pad_length as usize);
    Ok(Some(pad_length))
}
