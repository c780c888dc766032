//! Error types and handling for Tomoflow

use std::path::PathBuf;

/// Result type alias for Tomoflow operations
pub type Result<T> = std::result::Result<T, TomoflowError>;

/// Error types for the Tomoflow pipeline core
#[derive(Debug, thiserror::Error)]
pub enum TomoflowError {
    /// A pool slot index that was never returned by `register_stage`
    #[error("unregistered pool slot {index} (registered slots: {registered})")]
    UnregisteredSlot { index: usize, registered: usize },

    /// Buffer allocation failed during stage registration
    #[error("allocation failed: {message}")]
    Allocation { message: String },

    /// Filesystem setup failure (sink output directory, etc.)
    #[error("filesystem error at {path:?}: {message}")]
    Filesystem { path: PathBuf, message: String },

    /// Invalid parameters or configuration
    #[error("invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// An operation was handed an image in the wrong validity state
    #[error("invalid image: {message}")]
    InvalidImage { message: String },

    /// I/O related errors (image persistence, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TomoflowError {
    /// Create an unregistered-slot error
    pub fn unregistered_slot(index: usize, registered: usize) -> Self {
        Self::UnregisteredSlot { index, registered }
    }

    /// Create an allocation error
    pub fn allocation(message: impl Into<String>) -> Self {
        Self::Allocation {
            message: message.into(),
        }
    }

    /// Create a filesystem error
    pub fn filesystem(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Filesystem {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an invalid image error
    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage {
            message: message.into(),
        }
    }
}
