//! Pipeline stage skeletons and the sentinel shutdown protocol

pub mod sink;
pub mod stage;

pub use sink::{FileNumbering, ImageSaver, RawImageSaver, SinkStage, SinkStageConfig};
pub use stage::{FilterStage, StageKernel, StageState};
