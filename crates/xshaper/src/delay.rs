use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::frame::Frame;

const INITIAL_CAPACITY: usize = 8192;
// Arrivals count up from here and requeued packets count down, so both
// directions have half the sequence space.
const SEQ_START: u64 = u64::MAX / 2;

/// A received packet waiting for its release time.
#[derive(Debug)]
pub struct PendingPacket {
    pub due: Instant,
    pub frame: Frame,
    pub len: u32,
}

struct Entry {
    due: Instant,
    seq: u64,
    packet: PendingPacket,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the max-heap pops the earliest (due, seq) first.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Packets ordered by release time; equal times leave in arrival order.
pub struct DelayQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    front_seq: u64,
}

impl Default for DelayQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayQueue {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            next_seq: SEQ_START,
            front_seq: SEQ_START,
        }
    }

    pub fn push(&mut self, packet: PendingPacket) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            due: packet.due,
            seq,
            packet,
        });
    }

    /// Put back packets that were drained but could not be transmitted.
    ///
    /// They keep their release time. The caller requeues in drain order, so
    /// they still leave before anything that arrived later with the same time.
    pub fn requeue(&mut self, packets: Vec<PendingPacket>) {
        let count = packets.len() as u64;
        let Some(start) = self.front_seq.checked_sub(count) else {
            for packet in packets {
                self.push(packet);
            }
            return;
        };
        self.front_seq = start;
        for (i, packet) in packets.into_iter().enumerate() {
            self.heap.push(Entry {
                due: packet.due,
                seq: start + i as u64,
                packet,
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Release time of the earliest packet.
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.due)
    }

    pub fn has_ready(&self, now: Instant) -> bool {
        self.next_due().is_some_and(|due| due <= now)
    }

    /// Move up to `limit` packets with `due <= now` into `out`, earliest first.
    ///
    /// Returns how many were moved.
    pub fn drain_ready(&mut self, now: Instant, limit: usize, out: &mut Vec<PendingPacket>) -> usize {
        let mut moved = 0;
        while moved < limit && self.has_ready(now) {
            match self.heap.pop() {
                Some(entry) => out.push(entry.packet),
                None => break,
            }
            moved += 1;
        }
        moved
    }
}
