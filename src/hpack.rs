//! HPACK: Header Compression for HTTP/2 (RFC 7541)
//!
//! Thin wrapper around `fluke-hpack`. The session treats it as an opaque
//! collaborator: one encoder and one decoder per connection, fed strictly in
//! frame order so both dynamic tables stay in step with the peer.

use crate::error::H2Error;

/// Per-entry overhead used when sizing header lists (RFC 7540 Section 6.5.2).
const HEADER_ENTRY_OVERHEAD: usize = 32;

/// A decoded HTTP/2 header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is_pseudo(&self) -> bool {
        self.name.starts_with(':')
    }

    /// Size of this entry as counted against `max-header-list-size`.
    pub fn list_size(&self) -> usize {
        self.name.len() + self.value.len() + HEADER_ENTRY_OVERHEAD
    }
}

/// Sum of [`Header::list_size`] over a header list.
pub fn header_list_size(headers: &[Header]) -> usize {
    headers.iter().map(Header::list_size).sum()
}

/// True for a `:status` of 1xx, which is followed by more response headers.
pub fn is_informational(headers: &[Header]) -> bool {
    headers
        .iter()
        .find(|h| h.name == ":status")
        .is_some_and(|h| h.value.len() == 3 && h.value.starts_with('1'))
}

/// HPACK decoder for HTTP/2 header blocks.
/// Wraps `fluke_hpack::Decoder` which maintains dynamic table state per-connection.
pub struct HpackDecoder {
    inner: fluke_hpack::Decoder<'static>,
}

impl std::fmt::Debug for HpackDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackDecoder").finish()
    }
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackDecoder {
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Decoder::new(),
        }
    }

    /// Decode an HPACK-encoded header block.
    ///
    /// A failure leaves the dynamic table in an unknown state, so it is
    /// reported as a connection-fatal COMPRESSION_ERROR.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<Header>, H2Error> {
        let pairs = self
            .inner
            .decode(data)
            .map_err(|e| H2Error::compression(format!("HPACK decode error: {:?}", e)))?;
        Ok(pairs
            .into_iter()
            .map(|(name, value)| {
                Header::new(
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                )
            })
            .collect())
    }
}

/// HPACK encoder for HTTP/2 header blocks.
/// Wraps `fluke_hpack::Encoder` which maintains dynamic table state per-connection.
pub struct HpackEncoder {
    inner: fluke_hpack::Encoder<'static>,
}

impl std::fmt::Debug for HpackEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackEncoder").finish()
    }
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackEncoder {
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Encoder::new(),
        }
    }

    /// Encode headers into an HPACK header block.
    pub fn encode(&mut self, headers: &[Header]) -> Vec<u8> {
        let pairs: Vec<(&[u8], &[u8])> = headers
            .iter()
            .map(|h| (h.name.as_bytes(), h.value.as_bytes()))
            .collect();
        self.inner.encode(pairs)
    }
}

// ============================================================================
// Tests
// ============================================================================
