/// Fixed-capacity session log with oldest-half eviction.
use heapless::Deque;

/// Bounded log of session events.
///
/// When a push finds the log full, the oldest half is dropped first, so the
/// log keeps the most recent history without shifting on every insert.
#[derive(Debug)]
pub struct EventLog<T, const N: usize> {
    entries: Deque<T, N>,
    evicted: u32,
}

impl<T, const N: usize> EventLog<T, N> {
    pub const fn new() -> Self {
        Self {
            entries: Deque::new(),
            evicted: 0,
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.entries.is_full() {
            for _ in 0..(N / 2).max(1) {
                self.entries.pop_front();
            }
            self.evicted = self.evicted.saturating_add((N / 2).max(1) as u32);
        }
        // Cannot fail after eviction.
        let _ = self.entries.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.evicted = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped by eviction since the last clear.
    pub fn evicted(&self) -> u32 {
        self.evicted
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T, const N: usize> Default for EventLog<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
