//! Error types for the lensmap library
//!
//! All fallible operations of the camera views return [`LensmapResult`].
//! Errors of the workspace crates convert into [`LensmapError`] through `From`.

use lensmap_camera_models::CameraModelError;
use lensmap_io::IoError;
use thiserror::Error;

/// Result alias of the camera view API
pub type LensmapResult<T> = Result<T, LensmapError>;

/// Errors raised while building or evaluating camera views
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LensmapError {
    /// Malformed or contradictory camera configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Lens model construction or evaluation failures
    #[error("Camera model error: {0}")]
    CameraModel(String),

    /// Undistortion did not converge
    #[error("Convergence error: {0}")]
    Convergence(String),

    /// Lookup table loading failures
    #[error("IO error: {0}")]
    Io(String),
}

impl From<CameraModelError> for LensmapError {
    fn from(err: CameraModelError) -> Self {
        match err {
            CameraModelError::NotConverged { .. } => LensmapError::Convergence(err.to_string()),
            _ => LensmapError::CameraModel(err.to_string()),
        }
    }
}

impl From<IoError> for LensmapError {
    fn from(err: IoError) -> Self {
        LensmapError::Io(err.to_string())
    }
}

impl From<std::io::Error> for LensmapError {
    fn from(err: std::io::Error) -> Self {
        LensmapError::Io(err.to_string())
    }
}
