//! Allocation capability trait

use std::ptr::NonNull;

use crate::error::Result;

/// Trait for pipeline buffer allocation backends
///
/// An implementation produces contiguous byte buffers for the memory pool
/// and takes them back at teardown. The backend may be host heap, pinned
/// host memory or device memory; the pool never looks inside the buffer.
///
/// Allocation and release happen during stage registration and pipeline
/// teardown only, never on the per-image hot path.
pub trait BufferAllocator: Send + Sync + std::fmt::Debug {
    /// Allocate a buffer of the given size in bytes
    fn allocate(&self, size: usize) -> Result<NonNull<u8>>;

    /// Release a previously allocated buffer of the given size
    fn release(&self, ptr: NonNull<u8>, size: usize) -> Result<()>;

    /// Alignment guaranteed for allocated buffers
    fn alignment(&self) -> usize {
        crate::config::DEFAULT_ALIGNMENT
    }

    /// Total bytes currently handed out and not yet released
    fn bytes_in_use(&self) -> usize;

    /// Get backend name for diagnostics
    fn backend_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
