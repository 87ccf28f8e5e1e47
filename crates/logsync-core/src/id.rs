//! Causal id generation.

use crate::types::{ActionId, NodeId};

/// Issues monotonic [`ActionId`]s for one node.
///
/// If the clock has not moved past the last issued time (same millisecond,
/// or the clock went backwards), the last time is reused and the sequence
/// is bumped instead.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    node_id: NodeId,
    last_time: i64,
    sequence: u64,
}

impl IdGenerator {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            last_time: 0,
            sequence: 0,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Issue the next id for the given wall-clock time.
    pub fn next(&mut self, now: i64) -> ActionId {
        if now <= self.last_time {
            self.sequence += 1;
        } else {
            self.last_time = now;
            self.sequence = 0;
        }
        ActionId::new(self.last_time, self.node_id.clone(), self.sequence)
    }
}
