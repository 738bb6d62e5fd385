//! SETTINGS negotiation (RFC 7540 Section 6.5).
//!
//! Each direction keeps a committed value set plus what is still in flight.
//! Local changes stay pending until the peer acknowledges them; remote changes
//! are staged and committed when our acknowledgement is written. Window
//! arithmetic only ever reads committed values.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{H2Error, Reason};
use crate::flow::{DEFAULT_WINDOW_SIZE, MAX_WINDOW_SIZE};

/// HTTP/2 SETTINGS identifiers (RFC 7540 Section 6.5.2)
pub mod settings_id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
pub const MAX_MAX_FRAME_SIZE: u32 = (1 << 24) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingId {
    HeaderTableSize,
    EnablePush,
    MaxConcurrentStreams,
    InitialWindowSize,
    MaxFrameSize,
    MaxHeaderListSize,
}

impl SettingId {
    pub const ALL: [SettingId; 6] = [
        SettingId::HeaderTableSize,
        SettingId::EnablePush,
        SettingId::MaxConcurrentStreams,
        SettingId::InitialWindowSize,
        SettingId::MaxFrameSize,
        SettingId::MaxHeaderListSize,
    ];

    /// Unknown identifiers yield `None` and must be ignored.
    pub fn from_wire(id: u16) -> Option<Self> {
        match id {
            settings_id::HEADER_TABLE_SIZE => Some(SettingId::HeaderTableSize),
            settings_id::ENABLE_PUSH => Some(SettingId::EnablePush),
            settings_id::MAX_CONCURRENT_STREAMS => Some(SettingId::MaxConcurrentStreams),
            settings_id::INITIAL_WINDOW_SIZE => Some(SettingId::InitialWindowSize),
            settings_id::MAX_FRAME_SIZE => Some(SettingId::MaxFrameSize),
            settings_id::MAX_HEADER_LIST_SIZE => Some(SettingId::MaxHeaderListSize),
            _ => None,
        }
    }

    pub fn wire_id(self) -> u16 {
        match self {
            SettingId::HeaderTableSize => settings_id::HEADER_TABLE_SIZE,
            SettingId::EnablePush => settings_id::ENABLE_PUSH,
            SettingId::MaxConcurrentStreams => settings_id::MAX_CONCURRENT_STREAMS,
            SettingId::InitialWindowSize => settings_id::INITIAL_WINDOW_SIZE,
            SettingId::MaxFrameSize => settings_id::MAX_FRAME_SIZE,
            SettingId::MaxHeaderListSize => settings_id::MAX_HEADER_LIST_SIZE,
        }
    }

    /// Check a value against the bounds of RFC 7540 Section 6.5.2.
    ///
    /// The error is the code a peer violating the bound is answered with.
    pub fn validate(self, value: u32) -> Result<(), Reason> {
        match self {
            SettingId::EnablePush if value > 1 => Err(Reason::PROTOCOL_ERROR),
            SettingId::InitialWindowSize if value > MAX_WINDOW_SIZE as u32 => Err(Reason::FLOW_CONTROL_ERROR),
            SettingId::MaxFrameSize if !(DEFAULT_MAX_FRAME_SIZE..=MAX_MAX_FRAME_SIZE).contains(&value) => {
                Err(Reason::PROTOCOL_ERROR)
            }
            _ => Ok(()),
        }
    }
}

/// One direction's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    header_table_size: u32,
    enable_push: bool,
    max_concurrent_streams: u32,
    initial_window_size: u32,
    max_frame_size: u32,
    max_header_list_size: u32,
}

impl Default for Settings {
    /// Protocol defaults; unlimited values are `u32::MAX`.
    fn default() -> Self {
        Self {
            header_table_size: DEFAULT_HEADER_TABLE_SIZE,
            enable_push: true,
            max_concurrent_streams: u32::MAX,
            initial_window_size: DEFAULT_WINDOW_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_header_list_size: u32::MAX,
        }
    }
}

impl Settings {
    pub fn header_table_size(&self) -> u32 {
        self.header_table_size
    }

    pub fn enable_push(&self) -> bool {
        self.enable_push
    }

    pub fn max_concurrent_streams(&self) -> u32 {
        self.max_concurrent_streams
    }

    pub fn initial_window_size(&self) -> u32 {
        self.initial_window_size
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    pub fn max_header_list_size(&self) -> u32 {
        self.max_header_list_size
    }

    pub fn get(&self, id: SettingId) -> u32 {
        match id {
            SettingId::HeaderTableSize => self.header_table_size,
            SettingId::EnablePush => self.enable_push as u32,
            SettingId::MaxConcurrentStreams => self.max_concurrent_streams,
            SettingId::InitialWindowSize => self.initial_window_size,
            SettingId::MaxFrameSize => self.max_frame_size,
            SettingId::MaxHeaderListSize => self.max_header_list_size,
        }
    }

    /// Set one value; out-of-range values leave `self` untouched.
    pub fn set(&mut self, id: SettingId, value: u32) -> Result<(), H2Error> {
        id.validate(value).map_err(|_| H2Error::InvalidSetting {
            id: id.wire_id(),
            value,
        })?;
        self.store(id, value);
        Ok(())
    }

    /// Write a value that already passed [`SettingId::validate`].
    fn store(&mut self, id: SettingId, value: u32) {
        match id {
            SettingId::HeaderTableSize => self.header_table_size = value,
            SettingId::EnablePush => self.enable_push = value == 1,
            SettingId::MaxConcurrentStreams => self.max_concurrent_streams = value,
            SettingId::InitialWindowSize => self.initial_window_size = value,
            SettingId::MaxFrameSize => self.max_frame_size = value,
            SettingId::MaxHeaderListSize => self.max_header_list_size = value,
        }
    }

    /// Entries that differ from the protocol defaults, for an initial SETTINGS frame.
    pub fn diff_from_default(&self) -> Vec<(SettingId, u32)> {
        let defaults = Settings::default();
        SettingId::ALL
            .iter()
            .filter(|id| self.get(**id) != defaults.get(**id))
            .map(|id| (*id, self.get(*id)))
            .collect()
    }

    fn with(mut self, changes: &[(SettingId, u32)]) -> Self {
        for (id, value) in changes {
            self.store(*id, *value);
        }
        self
    }
}

/// Result of committing a batch of settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsCommit {
    pub previous: Settings,
    pub current: Settings,
}

impl SettingsCommit {
    /// New initial window size minus the old one.
    pub fn initial_window_delta(&self) -> i64 {
        self.current.initial_window_size as i64 - self.previous.initial_window_size as i64
    }

    pub fn changed(&self, id: SettingId) -> bool {
        self.previous.get(id) != self.current.get(id)
    }
}

#[derive(Debug)]
struct PendingLocal {
    changes: Vec<(SettingId, u32)>,
    sent_at: Instant,
}

/// Two-slot (committed, pending) settings state for both directions.
#[derive(Debug, Default)]
pub struct SettingsNegotiator {
    local: Settings,
    local_pending: VecDeque<PendingLocal>,
    remote: Settings,
    remote_pending: Option<Vec<(SettingId, u32)>>,
}

impl SettingsNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Our settings as acknowledged by the peer.
    pub fn local(&self) -> &Settings {
        &self.local
    }

    /// Peer settings we have acknowledged.
    pub fn remote(&self) -> &Settings {
        &self.remote
    }

    /// Our settings with every unacknowledged change applied.
    ///
    /// Used for limits we impose on ourselves, never for window arithmetic.
    pub fn local_latest(&self) -> Settings {
        self.local_pending
            .iter()
            .fold(self.local, |settings, pending| settings.with(&pending.changes))
    }

    pub fn has_pending_local(&self) -> bool {
        !self.local_pending.is_empty()
    }

    /// Record a SETTINGS frame we are about to send.
    pub fn queue_local(&mut self, changes: Vec<(SettingId, u32)>, now: Instant) -> Result<(), H2Error> {
        for (id, value) in &changes {
            id.validate(*value).map_err(|_| H2Error::InvalidSetting {
                id: id.wire_id(),
                value: *value,
            })?;
        }
        self.local_pending.push_back(PendingLocal { changes, sent_at: now });
        Ok(())
    }

    /// The peer acknowledged our oldest outstanding SETTINGS frame.
    ///
    /// `None` means there was nothing to acknowledge.
    pub fn ack_local(&mut self) -> Option<SettingsCommit> {
        let pending = self.local_pending.pop_front()?;
        let previous = self.local;
        self.local = previous.with(&pending.changes);
        Some(SettingsCommit {
            previous,
            current: self.local,
        })
    }

    /// Stage a received SETTINGS frame; unknown identifiers are dropped.
    pub fn stage_remote(&mut self, params: &[(u16, u32)]) -> Result<(), H2Error> {
        let mut staged = self.remote_pending.take().unwrap_or_default();
        for (raw_id, value) in params {
            let Some(id) = SettingId::from_wire(*raw_id) else {
                continue;
            };
            if let Err(reason) = id.validate(*value) {
                let message = format!("invalid value {} for setting {:?}", value, id);
                return Err(match reason {
                    Reason::FLOW_CONTROL_ERROR => H2Error::connection(reason, message),
                    _ => H2Error::protocol(message),
                });
            }
            staged.push((id, *value));
        }
        self.remote_pending = Some(staged);
        Ok(())
    }

    /// Commit what was staged, once our ACK is on its way.
    pub fn commit_remote(&mut self) -> Option<SettingsCommit> {
        let staged = self.remote_pending.take()?;
        let previous = self.remote;
        self.remote = previous.with(&staged);
        Some(SettingsCommit {
            previous,
            current: self.remote,
        })
    }

    /// When the oldest unacknowledged SETTINGS frame times out.
    pub fn ack_deadline(&self, timeout: Duration) -> Option<Instant> {
        self.local_pending.front().map(|pending| pending.sent_at + timeout)
    }
}
