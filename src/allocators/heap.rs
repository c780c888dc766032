//! Host-heap allocation backend

use std::{
    alloc::{alloc, dealloc, Layout},
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use super::traits::BufferAllocator;
use crate::error::{Result, TomoflowError};

/// Host-heap allocator with configurable alignment
///
/// The default backend for CPU-side pipelines. Accelerator deployments
/// substitute their own [`BufferAllocator`] implementation at pool
/// construction.
#[derive(Debug)]
pub struct HeapAllocator {
    /// Alignment applied to every allocation
    alignment: usize,
    /// Outstanding bytes, for leak diagnostics
    in_use: AtomicUsize,
}

impl HeapAllocator {
    /// Create an allocator with the default alignment
    pub fn new() -> Self {
        Self {
            alignment: crate::config::DEFAULT_ALIGNMENT,
            in_use: AtomicUsize::new(0),
        }
    }

    /// Create an allocator with a custom alignment
    pub fn with_alignment(alignment: usize) -> Result<Self> {
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(TomoflowError::invalid_parameter(
                "alignment",
                "Alignment must be a power of two",
            ));
        }
        Ok(Self {
            alignment,
            in_use: AtomicUsize::new(0),
        })
    }

    fn layout_for(&self, size: usize) -> Result<Layout> {
        Layout::from_size_align(size, self.alignment)
            .map_err(|_| TomoflowError::allocation(format!("invalid layout for {} bytes", size)))
    }
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferAllocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>> {
        if size == 0 {
            return Err(TomoflowError::invalid_parameter(
                "size",
                "Buffer size cannot be zero",
            ));
        }

        let layout = self.layout_for(size)?;
        let ptr = unsafe { alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            TomoflowError::allocation(format!("host heap exhausted allocating {} bytes", size))
        })?;

        self.in_use.fetch_add(size, Ordering::Relaxed);
        Ok(ptr)
    }

    fn release(&self, ptr: NonNull<u8>, size: usize) -> Result<()> {
        let layout = self.layout_for(size)?;
        unsafe { dealloc(ptr.as_ptr(), layout) };
        self.in_use.fetch_sub(size, Ordering::Relaxed);
        Ok(())
    }

    fn alignment(&self) -> usize {
        self.alignment
    }

    fn bytes_in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    fn backend_name(&self) -> &'static str {
        "host-heap"
    }
}
