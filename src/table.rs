//! The set of streams a session knows about.
//!
//! Owns every [`Stream`], hands out local stream ids, checks peer ids for
//! parity and monotonicity, and keeps a bounded number of closed streams
//! around so late frames for them can be told apart from frames for streams
//! that never existed.

use std::collections::hash_map::{self, HashMap};
use std::collections::VecDeque;

use crate::error::H2Error;
use crate::frame::{StreamId, MAX_STREAM_ID};
use crate::stream::Stream;

/// Which end of the connection we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// Parity of ids this role initiates: odd for clients, even for servers.
    pub fn initiates(self, id: StreamId) -> bool {
        match self {
            Role::Client => id % 2 == 1,
            Role::Server => id != 0 && id % 2 == 0,
        }
    }

    fn first_stream_id(self) -> StreamId {
        match self {
            Role::Client => 1,
            Role::Server => 2,
        }
    }

    pub fn peer(self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

#[derive(Debug)]
pub struct StreamTable {
    role: Role,
    streams: HashMap<StreamId, Stream>,
    /// Closed ids still retained, oldest first.
    closed: VecDeque<StreamId>,
    retention: usize,
    next_local_id: StreamId,
    last_remote_id: StreamId,
}

impl StreamTable {
    pub fn new(role: Role, retention: usize) -> Self {
        Self {
            role,
            streams: HashMap::new(),
            closed: VecDeque::new(),
            retention,
            next_local_id: role.first_stream_id(),
            last_remote_id: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn get(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    pub fn iter(&self) -> hash_map::Values<'_, StreamId, Stream> {
        self.streams.values()
    }

    /// Ids of every retained stream, ascending.
    pub fn ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self.streams.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn insert(&mut self, stream: Stream) {
        self.streams.insert(stream.id(), stream);
    }

    pub fn is_local(&self, id: StreamId) -> bool {
        self.role.initiates(id)
    }

    pub fn next_local_id(&self) -> StreamId {
        self.next_local_id
    }

    pub fn last_remote_id(&self) -> StreamId {
        self.last_remote_id
    }

    /// Hand out the next local id.
    pub fn allocate_local(&mut self) -> Result<StreamId, H2Error> {
        let id = self.next_local_id;
        if id > MAX_STREAM_ID {
            return Err(H2Error::StreamIdsExhausted);
        }
        self.next_local_id = id + 2;
        Ok(id)
    }

    /// Skip the local counter forward to `id`.
    pub fn set_next_local_id(&mut self, id: StreamId) -> Result<(), H2Error> {
        if !self.is_local(id) || id < self.next_local_id || id > MAX_STREAM_ID {
            return Err(H2Error::InvalidStreamId(id));
        }
        self.next_local_id = id;
        Ok(())
    }

    /// Accept `id` as a new peer-initiated stream.
    ///
    /// Peer ids must have the peer's parity and grow strictly.
    pub fn accept_remote(&mut self, id: StreamId) -> Result<(), H2Error> {
        if !self.role.peer().initiates(id) {
            return Err(H2Error::protocol(format!("stream id {} has the wrong parity", id)));
        }
        if id <= self.last_remote_id {
            return Err(H2Error::protocol(format!(
                "stream id {} is not greater than last peer stream {}",
                id, self.last_remote_id
            )));
        }
        self.last_remote_id = id;
        Ok(())
    }

    /// True if `id` was never opened by either side.
    pub fn is_idle(&self, id: StreamId) -> bool {
        if self.is_local(id) {
            id >= self.next_local_id
        } else {
            id > self.last_remote_id
        }
    }

    /// Open or half-closed streams initiated by us (`local`) or by the peer.
    pub fn active_count(&self, local: bool) -> usize {
        self.streams
            .values()
            .filter(|s| s.state().is_active() && self.is_local(s.id()) == local)
            .count()
    }

    /// Record that `id` reached `closed` and drop the oldest closed
    /// streams beyond the retention count. Returns the dropped ids.
    pub fn mark_closed(&mut self, id: StreamId) -> Vec<StreamId> {
        if !self.closed.contains(&id) {
            self.closed.push_back(id);
        }
        let mut evicted = Vec::new();
        while self.closed.len() > self.retention {
            if let Some(old) = self.closed.pop_front() {
                self.streams.remove(&old);
                evicted.push(old);
            }
        }
        evicted
    }

    /// Streams that are not closed, ascending by id.
    pub fn live_ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self
            .streams
            .values()
            .filter(|s| !s.state().is_closed())
            .map(|s| s.id())
            .collect();
        ids.sort_unstable();
        ids
    }
}
