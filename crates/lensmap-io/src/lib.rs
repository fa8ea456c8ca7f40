//! Loading of ray-direction lookup tables from image files.
//!
//! Lookup tables are stored as float images (typically OpenEXR) whose first
//! three channels hold the ray direction of each sensor cell and whose
//! optional fourth channel holds vignetting.

use lensmap_camera_models::CameraModelError;
use std::fmt::Display;
use thiserror::Error;
use tracing::error;

pub mod lut;

pub use lut::LutLoader;

/// Errors that can occur while loading lookup tables
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("LUT image has {found} channels, at least 3 are required")]
    ChannelCount { found: u8 },

    #[error("Invalid LUT: {0}")]
    InvalidLut(#[from] CameraModelError),
}

impl IoError {
    /// Logs the error and hands it back for propagation.
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Logs the error with context describing the failed operation.
    #[must_use]
    pub fn log_with_source(self, context: impl Display) -> Self {
        error!("{}: {}", context, self);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let err = IoError::ChannelCount { found: 2 };
        assert_eq!(
            err.to_string(),
            "LUT image has 2 channels, at least 3 are required"
        );

        let err = IoError::from(CameraModelError::InvalidLut("empty".to_string()))
            .log_with_source("while testing");
        assert!(err.to_string().contains("empty"));

        let err = IoError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")).log();
        assert!(matches!(err, IoError::Io(_)));
    }
}
