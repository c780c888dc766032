//! Blocking FIFO handoff queue connecting adjacent pipeline stages

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
};

use crate::error::{Result, TomoflowError};

/// Blocking FIFO channel between two adjacent pipeline stages
///
/// The baseline queue is unbounded: producers never block, and the memory
/// pool's fixed quotas already bound the number of in-flight images. The
/// bounded variant additionally blocks producers while the queue is full,
/// for pipelines that want explicit queue-depth backpressure.
///
/// Delivery is strictly FIFO, so frame ordering established upstream is
/// preserved end-to-end. The end-of-stream sentinel travels through the
/// queue as an ordinary item; well-behaved producers enqueue nothing after
/// it, making it the last item a consumer ever observes.
#[derive(Debug)]
pub struct HandoffQueue<T> {
    items: Mutex<VecDeque<T>>,
    item_available: Condvar,
    space_available: Condvar,
    capacity: Option<usize>,
}

impl<T> HandoffQueue<T> {
    /// Create an unbounded queue
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            item_available: Condvar::new(),
            space_available: Condvar::new(),
            capacity: None,
        }
    }

    /// Create a queue that blocks producers at the given depth
    pub fn bounded(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(TomoflowError::invalid_parameter(
                "capacity",
                "Queue capacity cannot be zero",
            ));
        }
        Ok(Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            item_available: Condvar::new(),
            space_available: Condvar::new(),
            capacity: Some(capacity),
        })
    }

    /// Append an item, blocking while a bounded queue is full
    pub fn push(&self, item: T) {
        let mut items = self.items.lock().unwrap();
        if let Some(capacity) = self.capacity {
            while items.len() >= capacity {
                items = self.space_available.wait(items).unwrap();
            }
        }
        items.push_back(item);
        drop(items);
        self.item_available.notify_one();
    }

    /// Remove the oldest item, blocking while the queue is empty
    pub fn pop(&self) -> T {
        let mut items = self.items.lock().unwrap();
        loop {
            if let Some(item) = items.pop_front() {
                drop(items);
                self.space_available.notify_one();
                return item;
            }
            items = self.item_available.wait(items).unwrap();
        }
    }

    /// Remove the oldest item if one is present
    pub fn try_pop(&self) -> Option<T> {
        let item = self.items.lock().unwrap().pop_front();
        if item.is_some() {
            self.space_available.notify_one();
        }
        item
    }

    /// Current queue depth
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }

    /// Configured bound, `None` for unbounded
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
