//! Stream priority (RFC 7540 Section 5.3).
//!
//! The tree is implicit: every stream stores the id of its parent and a
//! weight. Nothing owns anything else, so closing a parent never leaves a
//! dangling link; its children are moved to the root instead.

use bytes::{BufMut, BytesMut};

use crate::frame::{StreamId, MAX_STREAM_ID};
use crate::table::StreamTable;

pub const DEFAULT_WEIGHT: u16 = 16;
pub const MIN_WEIGHT: u16 = 1;
pub const MAX_WEIGHT: u16 = 256;

/// Dependency, weight and exclusivity of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrioritySpec {
    pub dependency: StreamId,
    /// 1..=256
    pub weight: u16,
    pub exclusive: bool,
}

impl Default for PrioritySpec {
    fn default() -> Self {
        Self {
            dependency: 0,
            weight: DEFAULT_WEIGHT,
            exclusive: false,
        }
    }
}

impl PrioritySpec {
    pub fn new(dependency: StreamId, weight: u16, exclusive: bool) -> Self {
        Self {
            dependency,
            weight,
            exclusive,
        }
    }

    pub fn is_valid_weight(&self) -> bool {
        (MIN_WEIGHT..=MAX_WEIGHT).contains(&self.weight)
    }

    /// Parse the 5-byte wire form (exclusive bit, 31-bit dependency, weight - 1).
    pub fn parse(data: &[u8; 5]) -> Self {
        let raw = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        Self {
            dependency: raw & MAX_STREAM_ID,
            weight: data[4] as u16 + 1,
            exclusive: raw & !MAX_STREAM_ID != 0,
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        let mut raw = self.dependency & MAX_STREAM_ID;
        if self.exclusive {
            raw |= !MAX_STREAM_ID;
        }
        dst.put_u32(raw);
        dst.put_u8((self.weight.clamp(MIN_WEIGHT, MAX_WEIGHT) - 1) as u8);
    }
}

impl StreamTable {
    /// Parent of a live stream, 0 for the root.
    pub fn parent_of(&self, id: StreamId) -> Option<StreamId> {
        self.get(id).filter(|s| !s.state().is_closed()).map(|s| s.priority().dependency)
    }

    /// Live streams whose parent is `id`, in ascending id order.
    pub fn children_of(&self, id: StreamId) -> Vec<StreamId> {
        let mut children: Vec<StreamId> = self
            .iter()
            .filter(|s| !s.state().is_closed() && s.priority().dependency == id && s.id() != id)
            .map(|s| s.id())
            .collect();
        children.sort_unstable();
        children
    }

    /// Whether `candidate` sits somewhere below `ancestor`.
    pub fn is_descendant(&self, candidate: StreamId, ancestor: StreamId) -> bool {
        let mut current = candidate;
        // a well-formed tree is never deeper than the number of streams
        for _ in 0..=self.len() {
            match self.parent_of(current) {
                None | Some(0) => return false,
                Some(parent) if parent == ancestor => return true,
                Some(parent) => current = parent,
            }
        }
        false
    }

    /// Move `id` under `spec.dependency`.
    ///
    /// A parent that is not a live stream means the default priority. If the
    /// new parent is a descendant of `id`, it is first moved to the root,
    /// taking its own subtree along. With `exclusive` set, every
    /// other child of the new parent moves below `id`. Self-dependency is
    /// rejected by callers.
    pub fn reprioritize(&mut self, id: StreamId, spec: PrioritySpec) {
        let mut spec = spec;
        if spec.dependency != 0 && self.parent_of(spec.dependency).is_none() {
            spec = PrioritySpec::default();
        }
        let parent = spec.dependency;

        if parent != 0 && self.is_descendant(parent, id) {
            if let Some(stream) = self.get_mut(parent) {
                stream.set_dependency(0);
            }
        }

        if spec.exclusive {
            for sibling in self.children_of(parent) {
                if sibling == id {
                    continue;
                }
                if let Some(stream) = self.get_mut(sibling) {
                    stream.set_dependency(id);
                }
            }
        }

        if let Some(stream) = self.get_mut(id) {
            stream.set_priority(PrioritySpec::new(parent, spec.weight, false));
        }
    }

    /// Re-parent the children of a closing stream to the root.
    pub fn detach_children(&mut self, id: StreamId) {
        for child in self.children_of(id) {
            if let Some(stream) = self.get_mut(child) {
                stream.set_dependency(0);
            }
        }
    }
}
