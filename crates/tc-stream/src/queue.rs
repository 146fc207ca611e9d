//! Bounded FIFO of look-ahead bundles awaiting the transport clock.
//!
//! On overflow the oldest unplayed bundle is dropped: playing slightly stale
//! material is preferred to an ever-growing lag behind the producer.

use std::collections::VecDeque;

use tc_core::Bundle;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct BundleQueue {
    items: VecDeque<Bundle>,
    capacity: usize,
    dropped: u64,
}

impl BundleQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Enqueue a bundle, returning the bundle dropped to make room, if any.
    pub fn push(&mut self, bundle: Bundle) -> Option<Bundle> {
        self.items.push_back(bundle);
        if self.items.len() > self.capacity {
            self.dropped += 1;
            let oldest = self.items.pop_front();
            if let Some(ref b) = oldest {
                warn!("[queue] full, dropping bundle start_tick={}", b.start_tick);
            }
            return oldest;
        }
        None
    }

    pub fn pop(&mut self) -> Option<Bundle> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total bundles dropped on overflow since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::bundle;

    #[test]
    fn overflow_drops_oldest() {
        let mut q = BundleQueue::new(4);
        for t in 0..4 {
            assert!(q.push(bundle(t, &[Some(60)])).is_none());
        }
        let dropped = q.push(bundle(4, &[Some(60)])).expect("oldest dropped");
        assert_eq!(dropped.start_tick, 0);
        assert_eq!(q.len(), 4);
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.pop().map(|b| b.start_tick), Some(1));
    }

    #[test]
    fn fifo_order() {
        let mut q = BundleQueue::new(4);
        q.push(bundle(7, &[Some(60)]));
        q.push(bundle(8, &[Some(60)]));
        assert_eq!(q.pop().map(|b| b.start_tick), Some(7));
        assert_eq!(q.pop().map(|b| b.start_tick), Some(8));
        assert!(q.pop().is_none());
    }
}
