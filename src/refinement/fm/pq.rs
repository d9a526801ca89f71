//! Gain priority queues for FM: an indexed binary max-heap with external
//! handles, and the two-level block/vertex queue built from it.
//!
//! Every vertex sits in at most one per-block vertex queue (the queue of its
//! current block), so one shared handle array suffices for all blocks.

use crate::datastructures::{Gain, NodeId, PartitionId};

const ABSENT: u32 = u32::MAX;

/// Binary max-heap over dense ids with `adjust_key`/`remove` via handles.
#[derive(Debug, Clone)]
pub struct IndexedMaxHeap {
    heap: Vec<(Gain, u32)>,
    pos: Vec<u32>,
}

impl IndexedMaxHeap {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Vec::new(),
            pos: vec![ABSENT; capacity],
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.pos[id as usize] != ABSENT
    }

    pub fn key_of(&self, id: u32) -> Gain {
        self.heap[self.pos[id as usize] as usize].0
    }

    pub fn clear(&mut self) {
        for &(_, id) in &self.heap {
            self.pos[id as usize] = ABSENT;
        }
        self.heap.clear();
    }

    pub fn insert(&mut self, id: u32, key: Gain) {
        debug_assert!(!self.contains(id));
        self.pos[id as usize] = self.heap.len() as u32;
        self.heap.push((key, id));
        self.sift_up(self.heap.len() - 1);
    }

    pub fn adjust_key(&mut self, id: u32, key: Gain) {
        let i = self.pos[id as usize] as usize;
        let old = self.heap[i].0;
        self.heap[i].0 = key;
        if key > old {
            self.sift_up(i);
        } else if key < old {
            self.sift_down(i);
        }
    }

    pub fn top(&self) -> Option<(u32, Gain)> {
        self.heap.first().map(|&(k, id)| (id, k))
    }

    pub fn pop(&mut self) -> Option<(u32, Gain)> {
        let &(key, id) = self.heap.first()?;
        self.remove(id);
        Some((id, key))
    }

    pub fn remove(&mut self, id: u32) {
        let i = self.pos[id as usize] as usize;
        self.pos[id as usize] = ABSENT;
        let last = self.heap.len() - 1;
        if i != last {
            self.heap.swap(i, last);
            self.heap.pop();
            let moved = self.heap[i].1;
            self.pos[moved as usize] = i as u32;
            self.sift_down(i);
            self.sift_up(i);
        } else {
            self.heap.pop();
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent].0 >= self.heap[i].0 {
                break;
            }
            self.swap_entries(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let left = 2 * i + 1;
            if left >= self.heap.len() {
                break;
            }
            let right = left + 1;
            let largest = if right < self.heap.len() && self.heap[right].0 > self.heap[left].0 {
                right
            } else {
                left
            };
            if self.heap[i].0 >= self.heap[largest].0 {
                break;
            }
            self.swap_entries(i, largest);
            i = largest;
        }
    }

    fn swap_entries(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.pos[self.heap[a].1 as usize] = a as u32;
        self.pos[self.heap[b].1 as usize] = b as u32;
    }
}

/// Two-level queue: a block heap keyed by each block's best vertex gain over
/// per-block vertex heaps sharing one handle array.
#[derive(Debug)]
pub struct BlockVertexPq {
    block_pq: IndexedMaxHeap,
    heaps: Vec<Vec<(Gain, NodeId)>>,
    /// Shared handles: position of a vertex within its block's heap.
    pos: Vec<u32>,
}

impl BlockVertexPq {
    pub fn new(k: usize, num_nodes: usize) -> Self {
        Self {
            block_pq: IndexedMaxHeap::new(k),
            heaps: vec![Vec::new(); k],
            pos: vec![ABSENT; num_nodes],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heaps.iter().all(|h| h.is_empty())
    }

    pub fn contains(&self, v: NodeId) -> bool {
        self.pos[v as usize] != ABSENT
    }

    pub fn clear(&mut self) {
        for heap in &mut self.heaps {
            for &(_, v) in heap.iter() {
                self.pos[v as usize] = ABSENT;
            }
            heap.clear();
        }
        self.block_pq.clear();
    }

    pub fn insert(&mut self, block: PartitionId, v: NodeId, gain: Gain) {
        debug_assert!(!self.contains(v));
        let heap = &mut self.heaps[block as usize];
        self.pos[v as usize] = heap.len() as u32;
        heap.push((gain, v));
        let last = heap.len() - 1;
        Self::sift_up(heap, &mut self.pos, last);
    }

    pub fn adjust_key(&mut self, block: PartitionId, v: NodeId, gain: Gain) {
        let heap = &mut self.heaps[block as usize];
        let i = self.pos[v as usize] as usize;
        debug_assert_eq!(heap[i].1, v);
        let old = heap[i].0;
        heap[i].0 = gain;
        if gain > old {
            Self::sift_up(heap, &mut self.pos, i);
        } else {
            Self::sift_down(heap, &mut self.pos, i);
        }
    }

    pub fn key_of(&self, block: PartitionId, v: NodeId) -> Gain {
        self.heaps[block as usize][self.pos[v as usize] as usize].0
    }

    /// Best vertex of `block`, if any.
    pub fn top_of(&self, block: PartitionId) -> Option<(NodeId, Gain)> {
        self.heaps[block as usize].first().map(|&(g, v)| (v, g))
    }

    pub fn remove(&mut self, block: PartitionId, v: NodeId) {
        let heap = &mut self.heaps[block as usize];
        let i = self.pos[v as usize] as usize;
        debug_assert_eq!(heap[i].1, v);
        self.pos[v as usize] = ABSENT;
        let last = heap.len() - 1;
        if i != last {
            heap.swap(i, last);
            heap.pop();
            self.pos[heap[i].1 as usize] = i as u32;
            Self::sift_down(heap, &mut self.pos, i);
            Self::sift_up(heap, &mut self.pos, i);
        } else {
            heap.pop();
        }
    }

    /// Re-key the block heap from the vertex heaps' tops; call after a batch
    /// of vertex updates.
    pub fn update_block_pq(&mut self) {
        for block in 0..self.heaps.len() as PartitionId {
            match self.top_of(block) {
                Some((_, gain)) => {
                    if self.block_pq.contains(block) {
                        self.block_pq.adjust_key(block, gain);
                    } else {
                        self.block_pq.insert(block, gain);
                    }
                }
                None => {
                    if self.block_pq.contains(block) {
                        self.block_pq.remove(block);
                    }
                }
            }
        }
    }

    /// Globally best (block, vertex, gain) according to the block heap.
    pub fn top(&self) -> Option<(PartitionId, NodeId, Gain)> {
        let (block, _) = self.block_pq.top()?;
        let (v, gain) = self.top_of(block)?;
        Some((block, v, gain))
    }

    fn sift_up(heap: &mut [(Gain, NodeId)], pos: &mut [u32], mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if heap[parent].0 >= heap[i].0 {
                break;
            }
            heap.swap(i, parent);
            pos[heap[i].1 as usize] = i as u32;
            pos[heap[parent].1 as usize] = parent as u32;
            i = parent;
        }
    }

    fn sift_down(heap: &mut [(Gain, NodeId)], pos: &mut [u32], mut i: usize) {
        loop {
            let left = 2 * i + 1;
            if left >= heap.len() {
                break;
            }
            let right = left + 1;
            let largest = if right < heap.len() && heap[right].0 > heap[left].0 {
                right
            } else {
                left
            };
            if heap[i].0 >= heap[largest].0 {
                break;
            }
            heap.swap(i, largest);
            pos[heap[i].1 as usize] = i as u32;
            pos[heap[largest].1 as usize] = largest as u32;
            i = largest;
        }
    }
}
