//! Deferred dispatch of future-dated bundles

use oscwire_core::{Packet, TimeTag};
use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tracing::trace;

use crate::error::{Result, ServerError};

/// Receives bundles whose time tag has not arrived yet
pub trait Scheduler: Send + Sync {
    fn schedule(&self, packet: Packet, due: TimeTag) -> Result<()>;
}

struct Pending {
    due: TimeTag,
    // Insertion order breaks ties so equal time tags stay FIFO
    seq: u64,
    packet: Packet,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

struct Inner {
    heap: BinaryHeap<Reverse<Pending>>,
    next_seq: u64,
}

/// Bounded priority queue of packets keyed by due time
pub struct PendingQueue {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    /// Earliest due time, if anything is queued
    pub fn next_due(&self) -> Option<TimeTag> {
        self.inner.lock().heap.peek().map(|Reverse(p)| p.due)
    }

    /// Remove and return everything due at or before `now`, earliest first
    pub fn pop_due(&self, now: TimeTag) -> Vec<Packet> {
        let mut inner = self.inner.lock();
        let mut due = Vec::new();
        while inner.heap.peek().map_or(false, |Reverse(p)| p.due <= now) {
            if let Some(Reverse(p)) = inner.heap.pop() {
                due.push(p.packet);
            }
        }
        due
    }

    /// Drop everything queued; returns how many were abandoned
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let abandoned = inner.heap.len();
        inner.heap.clear();
        abandoned
    }
}

impl Scheduler for PendingQueue {
    fn schedule(&self, packet: Packet, due: TimeTag) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.heap.len() >= self.capacity {
            return Err(ServerError::QueueFull {
                capacity: self.capacity,
            });
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(Reverse(Pending { due, seq, packet }));
        trace!("Scheduled packet for {} ({} pending)", due, inner.heap.len());
        Ok(())
    }
}
