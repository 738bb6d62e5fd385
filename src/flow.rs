//! Flow-control window tracking (RFC 7540 Section 5.2 and 6.9).
//!
//! A [`WindowTracker`] holds one connection window and one window per live
//! stream. The session keeps two of them: one for credit the peer granted us
//! (send side) and one for credit we granted the peer (receive side).

use std::collections::{HashMap, VecDeque};

use crate::error::FlowControlError;
use crate::frame::StreamId;

/// Initial window size for both connection and streams.
pub const DEFAULT_WINDOW_SIZE: u32 = 65_535;

/// Largest legal window (2^31 - 1).
pub const MAX_WINDOW_SIZE: i32 = i32::MAX;

#[derive(Debug)]
pub struct WindowTracker {
    connection: i32,
    streams: HashMap<StreamId, i32>,
    /// Window a newly opened stream starts with.
    initial: i32,
    /// Streams waiting for credit, in registration order.
    parked: VecDeque<StreamId>,
}

impl Default for WindowTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE, DEFAULT_WINDOW_SIZE)
    }
}

impl WindowTracker {
    pub fn new(connection: u32, initial: u32) -> Self {
        Self {
            connection: connection.min(MAX_WINDOW_SIZE as u32) as i32,
            streams: HashMap::new(),
            initial: initial.min(MAX_WINDOW_SIZE as u32) as i32,
            parked: VecDeque::new(),
        }
    }

    pub fn open(&mut self, id: StreamId) {
        self.streams.entry(id).or_insert(self.initial);
    }

    pub fn remove(&mut self, id: StreamId) {
        self.streams.remove(&id);
        self.unpark(id);
    }

    pub fn connection(&self) -> i32 {
        self.connection
    }

    pub fn stream(&self, id: StreamId) -> Option<i32> {
        self.streams.get(&id).copied()
    }

    pub fn initial(&self) -> i32 {
        self.initial
    }

    /// Bytes that may be sent on `id` right now.
    pub fn available(&self, id: StreamId) -> u32 {
        let stream = self.stream(id).unwrap_or(0);
        self.connection.min(stream).max(0) as u32
    }

    /// Take `n` bytes from both the stream and the connection window.
    ///
    /// Either both windows are charged or neither is.
    pub fn reserve(&mut self, id: StreamId, n: u32) -> Result<(), FlowControlError> {
        let stream = self.stream(id).unwrap_or(0);
        if n as i64 > self.connection as i64 {
            return Err(FlowControlError::Exhausted {
                stream_id: 0,
                requested: n,
                available: self.connection,
            });
        }
        if n as i64 > stream as i64 {
            return Err(FlowControlError::Exhausted {
                stream_id: id,
                requested: n,
                available: stream,
            });
        }
        self.connection -= n as i32;
        if let Some(window) = self.streams.get_mut(&id) {
            *window -= n as i32;
        }
        Ok(())
    }

    /// Take `n` bytes from the connection window only.
    pub fn reserve_connection(&mut self, n: u32) -> Result<(), FlowControlError> {
        if n as i64 > self.connection as i64 {
            return Err(FlowControlError::Exhausted {
                stream_id: 0,
                requested: n,
                available: self.connection,
            });
        }
        self.connection -= n as i32;
        Ok(())
    }

    /// Take `n` bytes from a stream window only.
    pub fn reserve_stream(&mut self, id: StreamId, n: u32) -> Result<(), FlowControlError> {
        let window = self.streams.get_mut(&id).ok_or(FlowControlError::Exhausted {
            stream_id: id,
            requested: n,
            available: 0,
        })?;
        if n as i64 > *window as i64 {
            return Err(FlowControlError::Exhausted {
                stream_id: id,
                requested: n,
                available: *window,
            });
        }
        *window -= n as i32;
        Ok(())
    }

    /// Add `n` to the window of `id` (0 = connection).
    ///
    /// Returns `true` when the window went from zero or below to positive.
    /// Unknown streams are ignored.
    pub fn release(&mut self, id: StreamId, n: u32) -> Result<bool, FlowControlError> {
        let window = if id == 0 {
            &mut self.connection
        } else {
            match self.streams.get_mut(&id) {
                Some(window) => window,
                None => return Ok(false),
            }
        };
        let updated = *window as i64 + n as i64;
        if updated > MAX_WINDOW_SIZE as i64 {
            return Err(FlowControlError::Overflow { stream_id: id });
        }
        let crossed = *window <= 0 && updated > 0;
        *window = updated as i32;
        Ok(crossed)
    }

    /// Shift every stream window by `delta` after an initial-window-size change.
    ///
    /// The connection window is untouched. Nothing changes if any stream
    /// would overflow. Returns the streams that became positive, ascending.
    pub fn apply_initial_window_change(&mut self, delta: i64) -> Result<Vec<StreamId>, FlowControlError> {
        if let Some((&id, _)) = self
            .streams
            .iter()
            .find(|(_, window)| **window as i64 + delta > MAX_WINDOW_SIZE as i64)
        {
            return Err(FlowControlError::Overflow { stream_id: id });
        }

        let mut crossed = Vec::new();
        for (id, window) in self.streams.iter_mut() {
            let updated = *window as i64 + delta;
            if *window <= 0 && updated > 0 {
                crossed.push(*id);
            }
            *window = updated as i32;
        }
        self.initial = (self.initial as i64 + delta).clamp(0, MAX_WINDOW_SIZE as i64) as i32;
        crossed.sort_unstable();
        Ok(crossed)
    }

    /// Top a window back up to `target` once half of it has been consumed.
    ///
    /// Returns the increment to announce in a WINDOW_UPDATE.
    pub fn replenish(&mut self, id: StreamId, target: u32) -> Option<u32> {
        let target = target.min(MAX_WINDOW_SIZE as u32) as i64;
        let window = if id == 0 {
            &mut self.connection
        } else {
            self.streams.get_mut(&id)?
        };
        let current = *window as i64;
        if current * 2 > target {
            return None;
        }
        let increment = target - current;
        if increment <= 0 {
            return None;
        }
        *window = target as i32;
        Some(increment as u32)
    }

    // ===== waiting for credit =====

    /// Register `id` to be resumed when credit arrives. Registering twice
    /// keeps the original position.
    pub fn park(&mut self, id: StreamId) {
        if !self.parked.contains(&id) {
            self.parked.push_back(id);
        }
    }

    pub fn unpark(&mut self, id: StreamId) -> bool {
        match self.parked.iter().position(|parked| *parked == id) {
            Some(index) => {
                self.parked.remove(index);
                true
            }
            None => false,
        }
    }

    /// Oldest parked stream. Parking it again puts it at the back.
    pub fn pop_parked(&mut self) -> Option<StreamId> {
        self.parked.pop_front()
    }

    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }

    /// Every parked stream, oldest registration first.
    pub fn take_parked(&mut self) -> Vec<StreamId> {
        self.parked.drain(..).collect()
    }

    pub fn is_parked(&self, id: StreamId) -> bool {
        self.parked.contains(&id)
    }
}
