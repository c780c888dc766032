//! Generic interior stage skeleton

use std::sync::Arc;

use log::{debug, info};

use crate::{error::Result, image::Image, pool::MemoryPool, queue::HandoffQueue};

/// Lifecycle of a pipeline stage
///
/// A stage never restarts once terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Pulling and processing images
    Running,
    /// Sentinel received, finishing in-flight work
    Draining,
    /// Run-loop exited
    Terminated,
}

/// Business logic of one interior pipeline stage
///
/// The kernel sees one valid image at a time. A typical implementation
/// requests a fresh image from the stage's registered pool slot, writes
/// its result there, returns the input to the pool and hands the result
/// back for the downstream queue.
pub trait StageKernel: Send {
    /// Stage name for logging
    fn name(&self) -> &str;

    /// Transform one image
    fn process(&mut self, input: Image, pool: &MemoryPool, slot: usize) -> Result<Image>;
}

/// Interior pipeline stage: pulls from its input queue, applies a kernel,
/// pushes results downstream
///
/// Shutdown follows the poison-pill protocol: on receiving the sentinel
/// the stage stops pulling, forwards the sentinel downstream exactly once
/// and terminates. Exactly one sentinel flows end-to-end, so every stage
/// observes shutdown without polling or timeouts.
///
/// The stage holds its queue endpoints, pool handle and kernel as plain
/// fields; stages share no other mutable state.
pub struct FilterStage<K> {
    kernel: K,
    input: Arc<HandoffQueue<Image>>,
    output: Arc<HandoffQueue<Image>>,
    pool: Arc<MemoryPool>,
    slot: usize,
    state: StageState,
}

impl<K: StageKernel> FilterStage<K> {
    /// Wire a stage between two queues, bound to its registered pool slot
    pub fn new(
        kernel: K,
        input: Arc<HandoffQueue<Image>>,
        output: Arc<HandoffQueue<Image>>,
        pool: Arc<MemoryPool>,
        slot: usize,
    ) -> Self {
        Self {
            kernel,
            input,
            output,
            pool,
            slot,
            state: StageState::Running,
        }
    }

    /// Pool slot this stage requests images from
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Current lifecycle state
    pub fn state(&self) -> StageState {
        self.state
    }

    /// Run the stage to completion, returning the number of images processed
    ///
    /// A kernel error is fatal to the stage; the sentinel is still forwarded
    /// so downstream stages drain instead of blocking forever.
    pub fn run(&mut self) -> Result<u64> {
        let mut processed = 0u64;
        loop {
            let image = self.input.pop();
            if !image.valid() {
                self.state = StageState::Draining;
                info!("{}: sentinel received, terminating", self.kernel.name());
                // Forward the received sentinel itself; it is pushed once.
                self.output.push(image);
                self.state = StageState::Terminated;
                return Ok(processed);
            }

            match self.kernel.process(image, &self.pool, self.slot) {
                Ok(result) => {
                    self.output.push(result);
                    processed += 1;
                    debug!("{}: processed image {}", self.kernel.name(), processed);
                }
                Err(e) => {
                    self.state = StageState::Draining;
                    self.output.push(Image::sentinel());
                    self.state = StageState::Terminated;
                    return Err(e);
                }
            }
        }
    }
}
