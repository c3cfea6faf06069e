//! Pending update requests plus the single worker slot.
//!
//! One mutex guards both the FIFO and the worker flag. Nothing here blocks
//! or waits: producers enqueue and try to claim the slot, the worker polls
//! until the queue reports empty.

use std::collections::VecDeque;

use parking_lot::Mutex;
use sky_weather::TargetId;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<TargetId>,
    worker_active: bool,
}

/// FIFO of targets waiting for a refresh
#[derive(Debug, Default)]
pub struct UpdateQueue {
    state: Mutex<QueueState>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append ids in order. An id already pending before this call is not
    /// added again; repeats inside `ids` are all kept.
    pub fn enqueue(&self, ids: &[TargetId]) {
        let mut state = self.state.lock();
        let already_pending = state.pending.len();

        for &id in ids {
            if state.pending.iter().take(already_pending).any(|&p| p == id) {
                continue;
            }
            state.pending.push_back(id);
        }

        tracing::debug!("Queued {:?}, {} pending", ids, state.pending.len());
    }

    /// Claim the worker slot. Returns false when a worker is already running.
    pub fn try_claim_worker(&self) -> bool {
        let mut state = self.state.lock();
        if state.worker_active {
            false
        } else {
            state.worker_active = true;
            true
        }
    }

    /// Whether another id is waiting. Answering `false` also releases the
    /// worker slot, so a producer enqueuing right after must claim it again.
    pub fn has_next(&self) -> bool {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            state.worker_active = false;
            false
        } else {
            true
        }
    }

    /// Pop the oldest id; `None` when the queue is empty
    pub fn next(&self) -> Option<TargetId> {
        self.state.lock().pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    pub fn is_worker_active(&self) -> bool {
        self.state.lock().worker_active
    }
}
