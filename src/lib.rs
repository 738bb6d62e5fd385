//! h2-session: a sans-I/O HTTP/2 session and stream multiplexing core
//!
//! This crate implements the connection-level half of HTTP/2 (RFC 7540)
//! without owning a socket or an async runtime: you hand it bytes, it hands
//! you events and bytes to write.
//!
//! # Features
//!
//! - **Sans-I/O Design**: No async runtime dependencies, one `&mut Session` per connection
//! - **Stream State Machine**: idle, reserved, open, half-closed and closed per RFC 7540 Section 5.1
//! - **Flow Control**: connection and stream windows in both directions, automatic WINDOW_UPDATE
//! - **Settings Negotiation**: values apply only once acknowledged, with an ACK deadline
//! - **Priority Tree**: weights and dependencies, cycles broken by re-parenting
//! - **Server Push, GOAWAY, PING, ALTSVC and ORIGIN**
//! - **HPACK Support**: Header compression via fluke-hpack
//!
//! # Quick Start
//!
//! ```rust
//! use h2_session::{Event, Header, Session, SessionConfig};
//!
//! let mut client = Session::client(SessionConfig::new()).unwrap();
//! let mut server = Session::server(SessionConfig::new()).unwrap();
//!
//! let request = vec![
//!     Header::new(":method", "GET"),
//!     Header::new(":scheme", "https"),
//!     Header::new(":path", "/"),
//!     Header::new(":authority", "example.com"),
//! ];
//! let id = client.create_stream(request, None, true).unwrap();
//!
//! // Shuttle bytes between the two ends
//! server.receive(&client.take_outbound()).unwrap();
//! client.receive(&server.take_outbound()).unwrap();
//!
//! while let Some(event) = server.poll_event() {
//!     if let Event::Headers { stream_id, .. } = event {
//!         let mut stream = server.stream(stream_id).unwrap();
//!         stream.respond(vec![Header::new(":status", "200")], true).unwrap();
//!     }
//! }
//! client.receive(&server.take_outbound()).unwrap();
//!
//! let closed = std::iter::from_fn(|| client.poll_event())
//!     .any(|event| matches!(event, Event::StreamClosed { stream_id, error: None } if stream_id == id));
//! assert!(closed);
//! ```
//!
//! # Architecture
//!
//! - [`FrameCodec`]: bytes to [`Frame`]s and back, CONTINUATION reassembly
//! - [`WindowTracker`]: per-connection and per-stream credit
//! - [`SettingsNegotiator`]: committed and pending settings for both directions
//! - [`StreamTable`]: stream ownership, id allocation, closed-stream grace window
//! - [`Session`]: applies inbound frames in order and serializes outbound ones
//!
//! It does NOT provide:
//! - TCP transport or TLS (you provide the bytes)
//! - HTTP semantics beyond header framing (no request routing, no body decoding)

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod flow;
pub mod frame;
pub mod hpack;
pub mod priority;
pub mod session;
pub mod settings;
pub mod stream;
pub mod table;

pub use codec::{Decoded, FrameCodec, MAX_HEADER_BLOCK_SIZE};
pub use config::SessionConfig;
pub use error::{error_string, FlowControlError, H2Error, Reason};
pub use event::{Event, Promise, SettingsOrigin};
pub use flow::{WindowTracker, DEFAULT_WINDOW_SIZE, MAX_WINDOW_SIZE};
pub use frame::{flags, frame_type, is_h2c_preface, Frame, FrameHeader, StreamId, CONNECTION_PREFACE};
pub use hpack::{Header, HpackDecoder, HpackEncoder};
pub use priority::PrioritySpec;
pub use session::{GoawayState, Role, Session, SessionStats, StreamHandle, StreamStats, Transport};
pub use settings::{settings_id, SettingId, Settings, SettingsNegotiator};
pub use stream::{StreamState, Transition};
pub use table::StreamTable;
