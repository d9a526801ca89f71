//! Shared node tracker: claims each vertex into at most one concurrent FM
//! search via CAS.
//!
//! Search ids grow monotonically across rounds, so "free" simply means "not
//! claimed by a search of the current round" and no clearing pass is needed.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::datastructures::NodeId;

#[derive(Debug)]
pub struct NodeTracker {
    search_of: Vec<AtomicU32>,
    /// Monotonic search-id counter.
    next_id: AtomicU32,
    /// Claims at or below this value belong to finished rounds.
    round_floor: AtomicU32,
}

impl NodeTracker {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            search_of: (0..num_nodes).map(|_| AtomicU32::new(0)).collect(),
            next_id: AtomicU32::new(0),
            round_floor: AtomicU32::new(0),
        }
    }

    /// Invalidate all claims and return the base for the next round's search
    /// ids; search `i` of the round uses id `base + 1 + i`.
    pub fn start_round(&self, num_searches: u32) -> u32 {
        let base = self.next_id.fetch_add(num_searches, Ordering::AcqRel);
        self.round_floor.store(base, Ordering::Release);
        base
    }

    /// Claim `v` for `search` (an id above the current round floor). Returns
    /// false if any current-round search already owns it.
    pub fn claim(&self, v: NodeId, search: u32) -> bool {
        let floor = self.round_floor.load(Ordering::Acquire);
        debug_assert!(search > floor);
        let cell = &self.search_of[v as usize];
        let mut current = cell.load(Ordering::Acquire);
        loop {
            if current > floor {
                return false;
            }
            match cell.compare_exchange_weak(current, search, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Does `search` own `v`?
    pub fn owner_is(&self, v: NodeId, search: u32) -> bool {
        self.search_of[v as usize].load(Ordering::Acquire) == search
    }
}
