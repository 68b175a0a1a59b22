use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::entry::LogEntry;

/// Bounded FIFO of pending entries. On overflow the oldest entry is
/// evicted and counted; producers never block and never grow the queue
/// past capacity.
///
/// All operations take one mutex, held only for the queue manipulation
/// itself. Serialization and file I/O happen elsewhere, so producer
/// latency stays flat regardless of disk speed.
#[derive(Debug)]
pub struct RingBuffer {
    capacity: usize,
    inner: Mutex<RingState>,
}

#[derive(Debug)]
struct RingState {
    queue: VecDeque<LogEntry>,
    dropped: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RingStats {
    pub size: usize,
    pub capacity: usize,
    pub dropped_entries: u64,
    pub utilization: f64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(RingState {
                queue: VecDeque::with_capacity(capacity),
                dropped: 0,
            }),
        }
    }

    // A poisoned lock still guards a coherent queue (no operation leaves
    // it mid-mutation), so recover instead of propagating the panic.
    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// O(1), never blocks past the queue op, never panics. At capacity
    /// the single oldest entry is evicted and the drop counter bumped
    /// before the new entry goes in.
    pub fn append(&self, entry: LogEntry) {
        let mut state = self.lock();
        if state.queue.len() >= self.capacity {
            state.queue.pop_front();
            state.dropped += 1;
        }
        state.queue.push_back(entry);
    }

    /// Removes and returns up to `max_n` oldest entries in FIFO order.
    /// Empty buffer yields an empty vec with no side effects.
    pub fn take_batch(&self, max_n: usize) -> Vec<LogEntry> {
        let mut state = self.lock();
        let n = max_n.min(state.queue.len());
        state.queue.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the queue and resets the drop counter.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.queue.clear();
        state.dropped = 0;
    }

    pub fn stats(&self) -> RingStats {
        let state = self.lock();
        RingStats {
            size: state.queue.len(),
            capacity: self.capacity,
            dropped_entries: state.dropped,
            utilization: state.queue.len() as f64 / self.capacity as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn entry(tag: &str) -> LogEntry {
        LogEntry::new(tag, None, None, Map::new())
    }

    #[test]
    fn overflow_evicts_oldest_and_counts() {
        let ring = RingBuffer::new(3);
        for tag in ["a", "b", "c", "d", "e"] {
            ring.append(entry(tag));
        }

        let stats = ring.stats();
        assert_eq!(stats.size, 3);
        assert_eq!(stats.dropped_entries, 2);

        let batch = ring.take_batch(10);
        let stages: Vec<&str> = batch.iter().map(|e| e.stage.as_str()).collect();
        assert_eq!(stages, vec!["c", "d", "e"]);
        assert!(ring.is_empty());
    }

    #[test]
    fn take_batch_respects_limit_and_order() {
        let ring = RingBuffer::new(8);
        for i in 0..6 {
            ring.append(entry(&format!("e{}", i)));
        }

        let first = ring.take_batch(4);
        assert_eq!(first.len(), 4);
        assert_eq!(first[0].stage, "e0");
        assert_eq!(first[3].stage, "e3");

        let rest = ring.take_batch(4);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[1].stage, "e5");

        assert!(ring.take_batch(4).is_empty());
    }

    #[test]
    fn clear_resets_drop_counter() {
        let ring = RingBuffer::new(2);
        for _ in 0..5 {
            ring.append(entry("x"));
        }
        assert_eq!(ring.stats().dropped_entries, 3);

        ring.clear();
        let stats = ring.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.dropped_entries, 0);
        assert_eq!(stats.utilization, 0.0);
    }
}
