//! Image value type passed between pipeline stages

use std::{ptr::NonNull, slice, sync::Arc};

use log::warn;

use crate::allocators::BufferAllocator;

/// An image buffer handed out by the memory pool
///
/// An `Image` is either *valid* (owns a live buffer belonging to one pool
/// slot, fixed at registration) or *invalid* (the end-of-stream sentinel,
/// carrying no buffer). The type is move-only; buffer ownership travels
/// with the value as it moves between pool, queue and stage, so two live
/// images can never alias one buffer.
#[derive(Debug)]
pub struct Image {
    /// Buffer pointer; `None` marks the sentinel/invalid state
    data: Option<NonNull<u8>>,
    /// Buffer capacity in bytes
    size: usize,
    /// Auxiliary tag, by convention the width in pixels
    width: u32,
    /// Auxiliary tag, by convention the height in pixels
    height: u32,
    /// Owning pool slot
    pool_index: usize,
    /// Backend that allocated the buffer and will release it
    allocator: Option<Arc<dyn BufferAllocator>>,
}

impl Image {
    /// Wrap a freshly allocated buffer; called during stage registration
    pub(crate) fn new(
        data: NonNull<u8>,
        size: usize,
        pool_index: usize,
        allocator: Arc<dyn BufferAllocator>,
    ) -> Self {
        Self {
            data: Some(data),
            size,
            width: 0,
            height: 0,
            pool_index,
            allocator: Some(allocator),
        }
    }

    /// Create the invalid end-of-stream sentinel
    pub fn sentinel() -> Self {
        Self {
            data: None,
            size: 0,
            width: 0,
            height: 0,
            pool_index: 0,
            allocator: None,
        }
    }

    /// Whether this image owns a live buffer
    pub fn valid(&self) -> bool {
        self.data.is_some()
    }

    /// Release the buffer and clear all metadata
    ///
    /// No-op on an already-invalid image.
    pub fn invalidate(&mut self) {
        let (Some(ptr), Some(allocator)) = (self.data.take(), self.allocator.take()) else {
            return;
        };
        if let Err(e) = allocator.release(ptr, self.size) {
            warn!("failed to release image buffer: {}", e);
        }
        self.size = 0;
        self.width = 0;
        self.height = 0;
        self.pool_index = 0;
    }

    /// Owning pool slot index; meaningless on an invalid image
    pub fn pool_index(&self) -> usize {
        self.pool_index
    }

    /// Buffer capacity in bytes (0 for the sentinel)
    pub fn size(&self) -> usize {
        self.size
    }

    /// Width tag in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height tag in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Set the dimension tags
    pub fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Buffer contents as a byte slice (empty for the sentinel)
    pub fn as_slice(&self) -> &[u8] {
        match self.data {
            Some(ptr) => unsafe { slice::from_raw_parts(ptr.as_ptr(), self.size) },
            None => &[],
        }
    }

    /// Buffer contents as a mutable byte slice (empty for the sentinel)
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.data {
            Some(ptr) => unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), self.size) },
            None => &mut [],
        }
    }
}

// Buffer ownership is exclusive to the holding Image, so moving one across
// threads is sound.
unsafe impl Send for Image {}
unsafe impl Sync for Image {}

impl Drop for Image {
    fn drop(&mut self) {
        // Leak backstop for images dropped instead of returned to the pool.
        self.invalidate();
    }
}
