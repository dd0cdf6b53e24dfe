use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

use crate::events::SimulationEvent;

/// Heap entry. Ties on `(timestamp, priority)` break on insertion order via
/// the monotone sequence number.
struct QueuedEvent {
    event: SimulationEvent,
    seq: u64,
}

impl QueuedEvent {
    fn key(&self) -> (DateTime<Utc>, i32, u64) {
        (self.event.timestamp, self.event.priority, self.seq)
    }
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Chronological priority queue of simulation events.
#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<QueuedEvent>>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: SimulationEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(QueuedEvent { event, seq }));
    }

    pub fn pop(&mut self) -> Option<SimulationEvent> {
        self.heap.pop().map(|Reverse(q)| q.event)
    }

    pub fn peek(&self) -> Option<&SimulationEvent> {
        self.heap.peek().map(|Reverse(q)| &q.event)
    }

    /// Remove and return every event with `timestamp <= until`, in order.
    pub fn pop_until(&mut self, until: DateTime<Utc>) -> Vec<SimulationEvent> {
        let mut drained = Vec::new();
        while let Some(Reverse(q)) = self.heap.peek() {
            if q.event.timestamp > until {
                break;
            }
            drained.push(self.heap.pop().map(|Reverse(q)| q.event).unwrap());
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
