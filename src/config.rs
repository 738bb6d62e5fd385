use std::time::Duration;

use crate::codec::MAX_HEADER_BLOCK_SIZE;
use crate::error::H2Error;
use crate::flow::{DEFAULT_WINDOW_SIZE, MAX_WINDOW_SIZE};
use crate::settings::{SettingId, Settings};

/// Session configuration.
///
/// Built with chained setters and checked when the session is created.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Settings advertised in the initial SETTINGS frame
    pub(crate) settings: Vec<(SettingId, u32)>,
    /// Connection-level receive window
    pub(crate) connection_window: u32,
    /// How long the peer has to acknowledge our SETTINGS
    pub(crate) settings_timeout: Duration,
    /// Closed streams kept around to classify late frames
    pub(crate) closed_stream_retention: usize,
    pub(crate) max_header_block_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settings: Vec::new(),
            connection_window: DEFAULT_WINDOW_SIZE,
            settings_timeout: Duration::from_secs(10),
            closed_stream_retention: 32,
            max_header_block_size: MAX_HEADER_BLOCK_SIZE,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise `value` for `id`. A later call for the same id wins.
    pub fn setting(mut self, id: SettingId, value: u32) -> Self {
        self.settings.retain(|(existing, _)| *existing != id);
        self.settings.push((id, value));
        self
    }

    pub fn max_concurrent_streams(self, max: u32) -> Self {
        self.setting(SettingId::MaxConcurrentStreams, max)
    }

    pub fn initial_window_size(self, size: u32) -> Self {
        self.setting(SettingId::InitialWindowSize, size)
    }

    pub fn max_frame_size(self, size: u32) -> Self {
        self.setting(SettingId::MaxFrameSize, size)
    }

    pub fn max_header_list_size(self, size: u32) -> Self {
        self.setting(SettingId::MaxHeaderListSize, size)
    }

    pub fn enable_push(self, enabled: bool) -> Self {
        self.setting(SettingId::EnablePush, enabled as u32)
    }

    pub fn header_table_size(self, size: u32) -> Self {
        self.setting(SettingId::HeaderTableSize, size)
    }

    pub fn connection_window(mut self, size: u32) -> Self {
        self.connection_window = size;
        self
    }

    pub fn settings_timeout(mut self, timeout: Duration) -> Self {
        self.settings_timeout = timeout;
        self
    }

    pub fn closed_stream_retention(mut self, count: usize) -> Self {
        self.closed_stream_retention = count;
        self
    }

    pub fn max_header_block_size(mut self, size: usize) -> Self {
        self.max_header_block_size = size;
        self
    }

    /// The settings we will run with once the peer acknowledges them.
    pub fn local_settings(&self) -> Result<Settings, H2Error> {
        let mut settings = Settings::default();
        for (id, value) in &self.settings {
            settings.set(*id, *value)?;
        }
        Ok(settings)
    }

    pub(crate) fn validate(&self) -> Result<(), H2Error> {
        self.local_settings()?;
        if self.connection_window < DEFAULT_WINDOW_SIZE || self.connection_window > MAX_WINDOW_SIZE as u32 {
            return Err(H2Error::InvalidSetting {
                id: 0,
                value: self.connection_window,
            });
        }
        Ok(())
    }
}
