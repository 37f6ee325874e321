//! Bounded FIFO pool for consume-once database rows (§4.2). Items leave in
//! enqueue order; the caller (`PoolManager`) is responsible for emitting an
//! update-batcher mark on every successful pop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::kind::PoolItem;

/// A single-group consume-once FIFO, bounded by `max`.
pub struct MemoryPool {
    items: Mutex<VecDeque<PoolItem>>,
    max: AtomicUsize,
}

impl MemoryPool {
    /// Creates an empty pool with the given capacity.
    pub fn new(max: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(max)),
            max: AtomicUsize::new(max),
        }
    }

    /// Removes and returns the oldest item, or `None` if the pool is empty.
    /// A `None` return signals the caller to refill on demand and retry once
    /// before surfacing `ErrPoolEmpty`.
    pub fn pop(&self) -> Option<PoolItem> {
        self.items.lock().unwrap().pop_front()
    }

    /// Appends `batch` in order, bounded by remaining headroom. Oversize
    /// batches are truncated; the number actually accepted is returned.
    pub fn push(&self, mut batch: Vec<PoolItem>) -> usize {
        let mut items = self.items.lock().unwrap();
        let room = self.max.load(Ordering::Relaxed).saturating_sub(items.len());
        let take = batch.len().min(room);
        items.extend(batch.drain(..take));
        take
    }

    /// Current item count.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// `true` if the pool holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.max.load(Ordering::Relaxed)
    }

    /// Drops every queued item.
    pub fn clear(&self) {
        self.items.lock().unwrap().clear();
    }

    /// Changes capacity, truncating the tail if shrinking below the current
    /// length.
    pub fn resize(&self, new_max: usize) {
        self.max.store(new_max, Ordering::Relaxed);
        let mut items = self.items.lock().unwrap();
        while items.len() > new_max {
            items.pop_back();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64) -> PoolItem {
        PoolItem { id, text: format!("text-{id}") }
    }

    #[test]
    fn fifo_order_within_a_single_fill() {
        let pool = MemoryPool::new(10);
        pool.push(vec![item(1), item(2), item(3)]);
        assert_eq!(pool.pop().unwrap().id, 1);
        assert_eq!(pool.pop().unwrap().id, 2);
        assert_eq!(pool.pop().unwrap().id, 3);
        assert!(pool.pop().is_none());
    }

    #[test]
    fn push_truncates_oversize_batches() {
        let pool = MemoryPool::new(2);
        let accepted = pool.push(vec![item(1), item(2), item(3)]);
        assert_eq!(accepted, 2);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn capacity_bound_holds_after_resize() {
        let pool = MemoryPool::new(5);
        pool.push(vec![item(1), item(2), item(3), item(4), item(5)]);
        pool.resize(2);
        assert!(pool.len() <= 2);
        pool.push(vec![item(6), item(7), item(8)]);
        assert!(pool.len() <= 2);
    }

    #[test]
    fn clear_empties_the_pool() {
        let pool = MemoryPool::new(5);
        pool.push(vec![item(1), item(2)]);
        pool.clear();
        assert!(pool.is_empty());
    }
}
