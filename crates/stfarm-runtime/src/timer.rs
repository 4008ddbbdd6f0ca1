//! Sleep queue
//!
//! Min-heap of wake deadlines. Entries carry the wait token that was
//! current when the thread went to sleep; a thread woken early (its fd
//! became ready first) bumps its token, so the stale entry is dropped
//! when it finally expires. Long deadlines would pile up that way, so the
//! scheduler counts stale entries and sweeps them out once they make up
//! most of the heap.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use stfarm_core::id::ThreadHandle;

#[derive(Debug, Clone, Copy)]
pub struct SleepEntry {
    pub deadline: Instant,
    /// Insertion order, so equal deadlines wake FIFO
    seq: u64,
    pub handle: ThreadHandle,
    pub token: u64,
}

// Min-heap ordering (earliest deadline first)
impl Ord for SleepEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for SleepEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SleepEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for SleepEntry {}

/// Stale entries tolerated before a sweep is considered
const COMPACT_MIN_STALE: usize = 64;

#[derive(Default)]
pub struct SleepQueue {
    heap: BinaryHeap<SleepEntry>,
    next_seq: u64,
    /// Entries known to belong to waits that already ended
    stale: usize,
}

impl SleepQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, deadline: Instant, handle: ThreadHandle, token: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(SleepEntry {
            deadline,
            seq,
            handle,
            token,
        });
    }

    /// Pop the earliest entry if its deadline is at or before `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<SleepEntry> {
        match self.heap.peek() {
            Some(top) if top.deadline <= now => self.heap.pop(),
            _ => None,
        }
    }

    /// Note that one queued entry will never wake anything.
    pub fn mark_stale(&mut self) {
        self.stale += 1;
    }

    /// An expired entry turned out to be stale.
    pub fn unmark_stale(&mut self) {
        self.stale = self.stale.saturating_sub(1);
    }

    /// More than half the heap is known stale.
    pub fn needs_compaction(&self) -> bool {
        self.stale > COMPACT_MIN_STALE && self.stale * 2 > self.heap.len()
    }

    /// Keep only entries for which `live` holds; resets the stale count.
    pub fn retain(&mut self, live: impl FnMut(&SleepEntry) -> bool) {
        self.heap.retain(live);
        self.stale = 0;
    }

    /// Time until the earliest deadline; `None` when empty.
    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.heap
            .peek()
            .map(|top| top.deadline.saturating_duration_since(now))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
