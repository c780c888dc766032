//! Multi-slot registration-based memory pool

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, Condvar, Mutex,
};

use log::{debug, info};

use crate::{
    allocators::BufferAllocator,
    error::{Result, TomoflowError},
    image::Image,
};

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Registered slots
    pub slots: usize,
    /// Total images associated with any slot since construction
    pub buffers_reserved: usize,
    /// Total bytes reserved at registration time
    pub bytes_reserved: usize,
    /// Completed `request_memory` calls
    pub requests: u64,
    /// Completed `return_memory` calls
    pub returns: u64,
}

/// Multi-slot object pool of pre-allocated image buffers
///
/// Each pipeline stage registers exactly once, receiving a slot index and a
/// fixed quota of equally sized images, then cycles those images through
/// [`request_memory`](MemoryPool::request_memory) and
/// [`return_memory`](MemoryPool::return_memory) for the lifetime of the
/// pipeline. All allocation happens at registration; the request/return hot
/// path only moves images between the slot free list and the caller.
///
/// A requester whose slot is momentarily exhausted blocks until another
/// holder returns an image. That blocking is the pipeline's backpressure: a
/// stage producing faster than downstream consumes stalls at its quota
/// instead of growing memory without bound.
///
/// The pool is explicitly constructed and shared via `Arc`; it is not a
/// process-wide singleton.
#[derive(Debug)]
pub struct MemoryPool {
    /// Slot table, index to LIFO free list, under one shared lock
    slots: Mutex<Vec<Vec<Image>>>,
    /// Shared wait condition, broadcast on every return
    available: Condvar,
    /// Backend used for registration-time allocation
    allocator: Arc<dyn BufferAllocator>,
    requests: AtomicU64,
    returns: AtomicU64,
    buffers_reserved: AtomicUsize,
    bytes_reserved: AtomicUsize,
}

impl MemoryPool {
    /// Create an empty pool over the given allocation backend
    pub fn new(allocator: Arc<dyn BufferAllocator>) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            available: Condvar::new(),
            allocator,
            requests: AtomicU64::new(0),
            returns: AtomicU64::new(0),
            buffers_reserved: AtomicUsize::new(0),
            bytes_reserved: AtomicUsize::new(0),
        }
    }

    /// Register a stage, reserving `count` buffers of `element_size` bytes
    ///
    /// Returns the new slot's index. Indices are assigned densely and
    /// monotonically from 0, serialized under the pool lock. Must be called
    /// once per stage before that stage requests or returns memory.
    ///
    /// An allocation failure aborts the registration; buffers already
    /// allocated for the failed slot are released and no slot index is
    /// consumed.
    pub fn register_stage(&self, count: usize, element_size: usize) -> Result<usize> {
        if element_size == 0 {
            return Err(TomoflowError::invalid_parameter(
                "element_size",
                "Element size cannot be zero",
            ));
        }

        let mut slots = self.slots.lock().unwrap();
        let index = slots.len();

        let mut images = Vec::with_capacity(count);
        for _ in 0..count {
            // On failure `images` drops here and releases what was already
            // allocated for this slot.
            let ptr = self.allocator.allocate(element_size)?;
            images.push(Image::new(
                ptr,
                element_size,
                index,
                Arc::clone(&self.allocator),
            ));
        }
        slots.push(images);

        self.buffers_reserved.fetch_add(count, Ordering::Relaxed);
        self.bytes_reserved
            .fetch_add(count * element_size, Ordering::Relaxed);

        info!(
            "pool: registered slot {} ({} buffers x {} bytes, backend {})",
            index,
            count,
            element_size,
            self.allocator.backend_name()
        );
        Ok(index)
    }

    /// Take one image from the identified slot, blocking while it is empty
    ///
    /// Fails immediately, without blocking, if `index` was never registered.
    /// Reuse within a slot is LIFO: the most recently returned buffer comes
    /// back first. No allocation happens on this path.
    pub fn request_memory(&self, index: usize) -> Result<Image> {
        let mut slots = self.slots.lock().unwrap();
        if slots.len() <= index {
            return Err(TomoflowError::unregistered_slot(index, slots.len()));
        }

        loop {
            if let Some(image) = slots[index].pop() {
                self.requests.fetch_add(1, Ordering::Relaxed);
                return Ok(image);
            }
            slots = self.available.wait(slots).unwrap();
        }
    }

    /// Give an image back to its owning slot and wake waiters
    ///
    /// Fails for a sentinel or for an image whose slot index is out of
    /// range; a rejected image releases its buffer when dropped, it is
    /// never adopted by a slot it does not belong to.
    pub fn return_memory(&self, image: Image) -> Result<()> {
        if !image.valid() {
            return Err(TomoflowError::invalid_image(
                "cannot return a sentinel to the pool",
            ));
        }

        let mut slots = self.slots.lock().unwrap();
        let index = image.pool_index();
        if slots.len() <= index {
            return Err(TomoflowError::unregistered_slot(index, slots.len()));
        }
        slots[index].push(image);
        self.returns.fetch_add(1, Ordering::Relaxed);
        drop(slots);

        // Broadcast: every waiter re-checks its own slot and re-blocks if
        // this return was for another slot.
        self.available.notify_all();
        Ok(())
    }

    /// Release every currently-available buffer in the identified slot
    ///
    /// Images checked out by stages are unaffected; they may still be
    /// returned afterwards. The slot index stays reserved. Teardown only.
    pub fn free_memory(&self, index: usize) -> Result<()> {
        let mut slots = self.slots.lock().unwrap();
        if slots.len() <= index {
            return Err(TomoflowError::unregistered_slot(index, slots.len()));
        }

        let mut freed = 0usize;
        for mut image in slots[index].drain(..) {
            image.invalidate();
            freed += 1;
        }
        debug!("pool: freed {} buffers from slot {}", freed, index);
        Ok(())
    }

    /// Number of registered slots
    pub fn slot_count(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    /// Number of images currently available (not checked out) in a slot
    pub fn available_in_slot(&self, index: usize) -> Result<usize> {
        let slots = self.slots.lock().unwrap();
        slots
            .get(index)
            .map(Vec::len)
            .ok_or_else(|| TomoflowError::unregistered_slot(index, slots.len()))
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            slots: self.slot_count(),
            buffers_reserved: self.buffers_reserved.load(Ordering::Relaxed),
            bytes_reserved: self.bytes_reserved.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
        }
    }
}
