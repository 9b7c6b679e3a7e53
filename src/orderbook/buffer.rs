//! FIFO of diff events received before the book is synchronized.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::types::DepthUpdate;

/// Log a progress line every this many buffered events
const PROGRESS_EVERY: usize = 50;

/// Arrival-ordered queue of not-yet-applied [`DepthUpdate`]s
///
/// Nothing is filtered on the way in; stale entries are sorted out when the
/// buffer is replayed against a snapshot.
#[derive(Debug, Default)]
pub struct UpdateBuffer {
    updates: VecDeque<DepthUpdate>,
}

impl UpdateBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn push(&mut self, update: DepthUpdate) {
        self.updates.push_back(update);

        let len = self.updates.len();
        if len == 1 {
            info!(
                first_update_id = self.updates[0].first_update_id,
                final_update_id = self.updates[0].final_update_id,
                "first buffered update"
            );
        } else if len % PROGRESS_EVERY == 0 {
            debug!(buffered = len, "buffering updates");
        }
    }

    /// Earliest buffered event, without removing it
    pub fn front(&self) -> Option<&DepthUpdate> {
        self.updates.front()
    }

    /// Remove and yield every event in arrival order
    pub fn drain(&mut self) -> impl Iterator<Item = DepthUpdate> + '_ {
        self.updates.drain(..)
    }

    /// Discard all buffered events
    pub fn clear(&mut self) {
        self.updates.clear();
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}
