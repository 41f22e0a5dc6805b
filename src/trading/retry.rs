//! Bounded retry queue drained once per cycle

use std::collections::VecDeque;

/// Queued item with its attempt count and the cycle it is due in
#[derive(Debug, Clone, PartialEq)]
pub struct RetryEntry<T> {
    pub item: T,
    pub attempts: u32,
    pub due_cycle: u64,
}

/// Failed operations waiting for another attempt
///
/// Backoff doubles per attempt: an entry that failed `n` times is due
/// `backoff_cycles * 2^(n-1)` cycles later. Nothing sleeps; the owner
/// drains due entries at the start of each cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryQueue<T> {
    capacity: usize,
    max_attempts: u32,
    backoff_cycles: u64,
    entries: VecDeque<RetryEntry<T>>,
}

impl<T> RetryQueue<T> {
    pub fn new(capacity: usize, max_attempts: u32, backoff_cycles: u64) -> Self {
        Self {
            capacity,
            max_attempts,
            backoff_cycles,
            entries: VecDeque::new(),
        }
    }

    fn due_after(&self, attempts: u32, cycle: u64) -> u64 {
        let exponent = attempts.saturating_sub(1).min(16);
        cycle + self.backoff_cycles.saturating_mul(1 << exponent)
    }

    /// Queue an item after its first failure in `cycle`. `false` when the
    /// queue is full or no retries are allowed; the item is dropped.
    pub fn push(&mut self, item: T, cycle: u64) -> bool {
        if self.max_attempts <= 1 || self.entries.len() >= self.capacity {
            log::warn!("retry queue full or retries disabled, entry dropped");
            return false;
        }
        let due_cycle = self.due_after(1, cycle);
        self.entries.push_back(RetryEntry {
            item,
            attempts: 1,
            due_cycle,
        });
        true
    }

    /// Remove and return the entries due in `cycle`.
    pub fn drain_due(&mut self, cycle: u64) -> Vec<RetryEntry<T>> {
        let (due, pending): (VecDeque<_>, VecDeque<_>) =
            self.entries.drain(..).partition(|e| e.due_cycle <= cycle);
        self.entries = pending;
        due.into_iter().collect()
    }

    /// Requeue an entry that failed again. `false` once it used up its
    /// attempts; the entry is dropped.
    pub fn reschedule(&mut self, mut entry: RetryEntry<T>, cycle: u64) -> bool {
        entry.attempts += 1;
        if entry.attempts >= self.max_attempts || self.entries.len() >= self.capacity {
            log::warn!("retry entry dropped after {} attempts", entry.attempts);
            return false;
        }
        entry.due_cycle = self.due_after(entry.attempts, cycle);
        self.entries.push_back(entry);
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_with_backoff() {
        let mut queue = RetryQueue::new(4, 4, 1);
        assert!(queue.push("a", 10));
        assert!(queue.drain_due(10).is_empty());
        let due = queue.drain_due(11);
        assert_eq!(due.len(), 1);
        assert!(queue.is_empty());

        // second failure doubles the wait
        let entry = due.into_iter().next().unwrap();
        assert!(queue.reschedule(entry, 11));
        assert!(queue.drain_due(12).is_empty());
        assert_eq!(queue.drain_due(13).len(), 1);
    }

    #[test]
    fn test_attempts_exhausted() {
        let mut queue = RetryQueue::new(4, 2, 1);
        queue.push(1, 0);
        let entry = queue.drain_due(1).remove(0);
        assert!(!queue.reschedule(entry, 1));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_capacity_overflow_drops() {
        let mut queue = RetryQueue::new(2, 3, 1);
        assert!(queue.push(1, 0));
        assert!(queue.push(2, 0));
        assert!(!queue.push(3, 0));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_single_attempt_disables_retries() {
        let mut queue = RetryQueue::new(2, 1, 1);
        assert!(!queue.push(1, 0));
    }
}
