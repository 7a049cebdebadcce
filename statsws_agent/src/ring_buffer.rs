//! Fixed-capacity history of the most recent values.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// Keeps the last `capacity` values; adding to a full buffer evicts the oldest.
/// Not synchronized, callers serialize access.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    cap: usize,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        let cap = capacity.get();
        Self {
            buf: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn add(&mut self, v: T) {
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(v);
    }

    /// Current contents, oldest first.
    pub fn values(&self) -> Vec<T> {
        self.buf.iter().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(cap: usize) -> RingBuffer<u32> {
        RingBuffer::new(NonZeroUsize::new(cap).unwrap())
    }

    #[test]
    fn empty_buffer_has_no_values() {
        let rb = ring(4);
        assert!(rb.values().is_empty());
        assert!(rb.is_empty());
    }

    #[test]
    fn partial_fill_keeps_insertion_order() {
        let mut rb = ring(4);
        for v in [7, 8, 9] {
            rb.add(v);
        }
        assert_eq!(rb.values(), vec![7, 8, 9]);
    }

    #[test]
    fn overflow_keeps_last_n_oldest_first() {
        let mut rb = ring(3);
        for v in 1..=10 {
            rb.add(v);
        }
        assert_eq!(rb.values(), vec![8, 9, 10]);
        assert_eq!(rb.len(), 3);
    }

    #[test]
    fn exactly_full_returns_all() {
        let mut rb = ring(3);
        for v in 1..=3 {
            rb.add(v);
        }
        assert_eq!(rb.values(), vec![1, 2, 3]);
    }

    #[test]
    fn capacity_one_holds_latest() {
        let mut rb = ring(1);
        rb.add(1);
        rb.add(2);
        assert_eq!(rb.values(), vec![2]);
    }

    #[test]
    fn values_is_repeatable() {
        let mut rb = ring(2);
        rb.add(1);
        rb.add(2);
        rb.add(3);
        assert_eq!(rb.values(), rb.values());
    }
}
