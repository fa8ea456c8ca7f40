//! Lens Models for Camera Simulation
//!
//! This crate holds the numerical engine behind lensmap: everything that maps
//! between 3D ray directions and sensor pixels for real lenses.
//!
//! # Key Components
//!
//! - **`RadialDistortionModel`**: 3-coefficient radial distortion with a
//!   Newton-iteration inverse and ray-direction lookup generation
//! - **`RayDirectionLut`**: per-pixel ray-direction tables with sub-pixel
//!   inverse projection and frustum mesh extraction
//! - **`PolynomialFisheyeModel`**: fisheye lens described by a radial angle
//!   polynomial, fitted from coefficients or from a lookup table
//!
//! # Conventions
//!
//! Camera-local frame: x right, y up, the camera looks along -z.
//! Lookup tables are row-major images whose row 0 is the top of the sensor.
//! Sensor pixel coordinates are (x, y) with y measured upwards from the bottom
//! edge unless stated otherwise.

use serde::{Deserialize, Serialize};

pub mod kdtree;
pub mod mesh;
pub mod polyfit;
pub mod polynomial_fisheye;
pub mod radial_distortion;
pub mod ray_image;
pub mod ray_lut;

pub use kdtree::KdTree3;
pub use mesh::FrustumMesh;
pub use polyfit::{FitQuality, Polynomial};
pub use polynomial_fisheye::{PolynomialFisheyeModel, PolynomialSpec};
pub use radial_distortion::{
    DistortionLimit, LookupConfig, LookupTable, RadialDistortionModel,
};
pub use ray_image::RayImage;
pub use ray_lut::{FrustumConfig, LutConfig, RayDirectionLut, RenderCrop};

/// Lengths below this are treated as zero-length rays.
pub const MIN_RAY_NORM: f64 = 1e-6;

/// Stored LUT rays shorter than this mark an invalid sensor cell.
pub const VALID_RAY_NORM: f64 = 0.9;

/// Lens model errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraModelError {
    #[error("Invalid camera parameters: {0}")]
    InvalidParams(String),
    #[error("Invalid lookup table: {0}")]
    InvalidLut(String),
    #[error("Degenerate lens parameters: {0}")]
    DegenerateLens(String),
    #[error("Undistortion did not converge within {max_iterations} iterations")]
    NotConverged { max_iterations: usize },
    #[error("NumericalError: {0}")]
    NumericalError(String),
}

/// Pinhole intrinsics in pixel units.
///
/// The principal point follows the OpenCV convention (origin at the top-left
/// corner, v pointing down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeParams {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl PinholeParams {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self, CameraModelError> {
        let params = Self { fx, fy, cx, cy };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), CameraModelError> {
        if !(self.fx.is_finite() && self.fy.is_finite()) || self.fx <= 0.0 || self.fy <= 0.0 {
            return Err(CameraModelError::InvalidParams(format!(
                "focal length must be positive and finite, got ({}, {})",
                self.fx, self.fy
            )));
        }
        if !self.cx.is_finite() || !self.cy.is_finite() {
            return Err(CameraModelError::InvalidParams(
                "principal point must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rejects non-finite or non-positive scalars.
pub(crate) fn require_positive(name: &str, value: f64) -> Result<(), CameraModelError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CameraModelError::InvalidParams(format!(
            "{name} must be positive and finite, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinhole_params_validation() {
        assert!(PinholeParams::new(1500.0, 1500.0, 968.0, 620.0).is_ok());
        assert!(PinholeParams::new(0.0, 1500.0, 968.0, 620.0).is_err());
        assert!(PinholeParams::new(1500.0, -1.0, 968.0, 620.0).is_err());
        assert!(PinholeParams::new(1500.0, 1500.0, f64::NAN, 620.0).is_err());
    }

    #[test]
    fn test_error_display() {
        let err = CameraModelError::NotConverged {
            max_iterations: 1000,
        };
        assert_eq!(
            err.to_string(),
            "Undistortion did not converge within 1000 iterations"
        );
        let err = CameraModelError::InvalidLut("too few channels".to_string());
        assert!(err.to_string().contains("too few channels"));
    }
}
