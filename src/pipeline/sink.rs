//! Terminal sink stage persisting images

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::stage::StageState;
use crate::{
    error::{Result, TomoflowError},
    image::Image,
    pool::MemoryPool,
    queue::HandoffQueue,
};

/// Image persistence capability used by the sink stage
///
/// The sink is responsible for directory existence and naming only; the
/// on-disk encoding is the saver's concern.
pub trait ImageSaver: Send {
    /// Persist one image at the given path
    fn save_image(&self, image: &Image, path: &Path) -> Result<()>;
}

/// Saver that writes the raw buffer bytes unencoded
#[derive(Debug, Default)]
pub struct RawImageSaver;

impl ImageSaver for RawImageSaver {
    fn save_image(&self, image: &Image, path: &Path) -> Result<()> {
        fs::write(path, image.as_slice())?;
        Ok(())
    }
}

/// How saved files are numbered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileNumbering {
    /// `<prefix>0`, `<prefix>1`, ... one per saved image
    Sequential,
    /// Every file uses the same literal number, overwriting prior saves
    Fixed(u64),
}

impl Default for FileNumbering {
    fn default() -> Self {
        Self::Sequential
    }
}

/// Configuration for a sink stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkStageConfig {
    /// Output directory, created at stage construction
    pub path: PathBuf,
    /// Filename prefix
    pub prefix: String,
    /// Numbering scheme for saved files
    pub numbering: FileNumbering,
}

impl SinkStageConfig {
    /// Create a configuration with default sequential numbering
    pub fn new(path: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            prefix: prefix.into(),
            numbering: FileNumbering::default(),
        }
    }

    /// Set the numbering scheme
    pub fn with_numbering(mut self, numbering: FileNumbering) -> Self {
        self.numbering = numbering;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(TomoflowError::invalid_parameter(
                "prefix",
                "Filename prefix cannot be empty",
            ));
        }
        Ok(())
    }
}

/// Terminal pipeline stage persisting every image it receives
///
/// Saved buffers go back to the pool so the producing stage can reuse
/// them; the sink is where the pipeline's images complete their cycle.
pub struct SinkStage<S> {
    saver: S,
    input: Arc<HandoffQueue<Image>>,
    pool: Arc<MemoryPool>,
    config: SinkStageConfig,
    state: StageState,
}

impl<S: ImageSaver> SinkStage<S> {
    /// Create the sink, ensuring the output directory exists
    ///
    /// Fails fast when the directory cannot be created; a sink without a
    /// destination must not enter its run-loop.
    pub fn new(
        saver: S,
        config: SinkStageConfig,
        input: Arc<HandoffQueue<Image>>,
        pool: Arc<MemoryPool>,
    ) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.path).map_err(|e| {
            TomoflowError::filesystem(
                config.path.clone(),
                format!("could not create target directory: {}", e),
            )
        })?;

        Ok(Self {
            saver,
            input,
            pool,
            config,
            state: StageState::Running,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> StageState {
        self.state
    }

    fn target_path(&self, counter: u64) -> PathBuf {
        let number = match self.config.numbering {
            FileNumbering::Sequential => counter,
            FileNumbering::Fixed(n) => n,
        };
        self.config
            .path
            .join(format!("{}{}", self.config.prefix, number))
    }

    /// Run the sink to completion, returning the number of images persisted
    pub fn run(&mut self) -> Result<u64> {
        let mut counter = 0u64;
        loop {
            let image = self.input.pop();
            if !image.valid() {
                self.state = StageState::Draining;
                info!("sink: sentinel received, terminating after {} images", counter);
                self.state = StageState::Terminated;
                return Ok(counter);
            }

            let path = self.target_path(counter);
            debug!("sink: saving image to {}", path.display());
            self.saver.save_image(&image, &path)?;
            counter += 1;

            self.pool.return_memory(image)?;
        }
    }
}
