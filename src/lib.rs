//! # Tomoflow - Staged Image Pipeline Flow Core
//!
//! Tomoflow is the resource-management and flow-control core for staged
//! image-processing pipelines (tomographic reconstruction and similar),
//! where stages pass large image buffers downstream and buffer allocation
//! is expensive enough that it must be amortized across the pipeline's
//! steady state rather than paid per item.
//!
//! ## Features
//!
//! - **Registration-based memory pool**: each stage reserves a slot of
//!   pre-allocated, equally sized image buffers once, then cycles them
//!   request/return for the pipeline's lifetime
//! - **Blocking backpressure**: a stage that outruns its quota stalls in
//!   `request_memory` instead of growing memory without bound
//! - **Pluggable allocation backends**: host heap provided, device/pinned
//!   memory expressible through the same trait
//! - **Handoff queues**: blocking FIFO channels between stages, unbounded
//!   or bounded
//! - **Poison-pill shutdown**: one sentinel image drains the whole
//!   pipeline, no polling or timeouts
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  HandoffQueue   ┌────────────┐  HandoffQueue   ┌────────────┐
//! │   source   │ ──────────────▶ │ FilterStage│ ──────────────▶ │  SinkStage │
//! └────────────┘                 └────────────┘                 └────────────┘
//!       │ request                      │ request/return              │ return
//!       ▼                              ▼                             ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    MemoryPool (slot per stage, LIFO)                    │
//! │                      BufferAllocator backend                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

// Core modules
pub mod allocators;
pub mod error;
pub mod image;
pub mod pipeline;
pub mod pool;
pub mod queue;

// Main API re-exports
pub use allocators::{BufferAllocator, HeapAllocator};
pub use error::{Result, TomoflowError};
pub use image::Image;
pub use pipeline::{
    FileNumbering, FilterStage, ImageSaver, RawImageSaver, SinkStage, SinkStageConfig,
    StageKernel, StageState,
};
pub use pool::{MemoryPool, PoolStats};
pub use queue::HandoffQueue;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration constants
pub mod config {
    /// Default alignment for buffer allocations
    pub const DEFAULT_ALIGNMENT: usize = 64;

    /// Default capacity for bounded handoff queues
    pub const DEFAULT_QUEUE_CAPACITY: usize = 16;
}
