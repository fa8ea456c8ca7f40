//! Camera description records
//!
//! Plain, serializable records supplied by the surrounding system: the field
//! of view of a view ([`FovSpec`]), its placement in the world
//! ([`CameraFrame`]) and the summary every view reports back
//! ([`CameraViewSummary`]).

use crate::error::{LensmapError, LensmapResult};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Angular extent of a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FovExtent {
    /// Full FOV (x, y) in degrees, centred on the optical axis. A zero
    /// component is derived from the other axis and the pixel aspect ratio.
    Symmetric([f64; 2]),
    /// Angle range [[x_min, x_max], [y_min, y_max]] in degrees.
    Range([[f64; 2]; 2]),
}

/// Field of view and sensor layout of a camera view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FovSpec {
    /// Pixels (horizontal, vertical).
    pub pixel_count: [usize; 2],
    pub pixel_size_um: f64,
    /// Upper bound for the full FOV in degrees.
    pub fov_max_deg: Option<f64>,
    pub fov: FovExtent,
    /// Expand the narrower FOV axis so that pixels stay square.
    pub ensure_square_pixel: bool,
}

impl FovSpec {
    pub fn new(pixel_count: [usize; 2], pixel_size_um: f64, fov: FovExtent) -> Self {
        Self {
            pixel_count,
            pixel_size_um,
            fov_max_deg: None,
            fov,
            ensure_square_pixel: false,
        }
    }

    /// Symmetric FOV around the optical axis.
    pub fn symmetric(pixel_count: [usize; 2], pixel_size_um: f64, fov_deg: [f64; 2]) -> Self {
        Self::new(pixel_count, pixel_size_um, FovExtent::Symmetric(fov_deg))
    }

    pub fn with_fov_max(mut self, fov_max_deg: f64) -> Self {
        self.fov_max_deg = Some(fov_max_deg);
        self
    }

    pub fn with_square_pixel(mut self, ensure_square_pixel: bool) -> Self {
        self.ensure_square_pixel = ensure_square_pixel;
        self
    }

    pub fn validate(&self) -> LensmapResult<()> {
        if self.pixel_count[0] == 0 || self.pixel_count[1] == 0 {
            return Err(LensmapError::InvalidConfig(format!(
                "pixel count must be non-zero, got {:?}",
                self.pixel_count
            )));
        }
        if !self.pixel_size_um.is_finite() || self.pixel_size_um <= 0.0 {
            return Err(LensmapError::InvalidConfig(format!(
                "pixel size must be positive, got {} um",
                self.pixel_size_um
            )));
        }
        if let Some(fov_max) = self.fov_max_deg
            && (!fov_max.is_finite() || fov_max <= 0.0)
        {
            return Err(LensmapError::InvalidConfig(format!(
                "maximal FOV must be positive, got {fov_max} deg"
            )));
        }
        let finite = match &self.fov {
            FovExtent::Symmetric(fov) => fov.iter().all(|v| v.is_finite()),
            FovExtent::Range(range) => range.iter().flatten().all(|v| v.is_finite()),
        };
        if !finite {
            return Err(LensmapError::InvalidConfig(
                "field of view must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Placement of a camera in the world.
///
/// `axes` holds the camera's right, up and backward axes in world
/// coordinates, one per row. Points in front of the camera have negative
/// local z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraFrame {
    pub axes: [[f64; 3]; 3],
    /// Origin in world coordinates (m).
    pub origin: [f64; 3],
}

impl Default for CameraFrame {
    fn default() -> Self {
        Self {
            axes: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            origin: [0.0; 3],
        }
    }
}

impl CameraFrame {
    pub fn new(axes: [[f64; 3]; 3], origin: [f64; 3]) -> Self {
        Self { axes, origin }
    }

    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    /// World-to-camera rotation, rows are the camera axes.
    pub fn rotation(&self) -> Matrix3<f64> {
        let [x, y, z] = self.axes;
        Matrix3::new(x[0], x[1], x[2], y[0], y[1], y[2], z[0], z[1], z[2])
    }

    pub fn origin(&self) -> Vector3<f64> {
        Vector3::from(self.origin)
    }

    /// Transforms world points (m) into the camera frame.
    pub fn points_to_camera_frame(&self, points: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        let rotation = self.rotation();
        let origin = self.origin();
        points.iter().map(|p| rotation * (p - origin)).collect()
    }

    /// Rotates world directions into the camera frame.
    pub fn dirs_to_camera_frame(&self, dirs: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        let rotation = self.rotation();
        dirs.iter().map(|d| rotation * d).collect()
    }

    /// Transforms camera-frame points back into the world.
    pub fn points_to_world(&self, points: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        let rotation_t = self.rotation().transpose();
        let origin = self.origin();
        points.iter().map(|p| rotation_t * p + origin).collect()
    }
}

/// Variant-specific part of a [`CameraViewSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewDetails {
    Pinhole {
        focal_length_pix: [f64; 2],
        /// Optical centre relative to the sensor centre, x right and y up.
        image_center_pix: [f64; 2],
    },
    Equidistant {
        pixel_count_max: [usize; 2],
    },
    Equirectangular,
    PolynomialFisheye {
        coefficients: Vec<f64>,
        center_offset_mm: [f64; 2],
    },
    Lut {
        border: usize,
        super_sampling: usize,
        center_rc: [f64; 2],
        file_path: Option<String>,
    },
}

/// Serializable description of a configured camera view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraViewSummary {
    pub pixel_count: [usize; 2],
    pub pixel_size_um: f64,
    pub aspect: [f64; 2],
    pub fov_max_deg: f64,
    pub fov_center_deg: [f64; 2],
    pub fov_deg: [f64; 2],
    pub fov_range_deg: [[f64; 2]; 2],
    pub axes: [[f64; 3]; 3],
    pub origin_m: [f64; 3],
    pub details: ViewDetails,
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_fov_spec_validation() {
        assert!(FovSpec::symmetric([640, 480], 3.0, [60.0, 0.0]).validate().is_ok());
        assert!(FovSpec::symmetric([0, 480], 3.0, [60.0, 0.0]).validate().is_err());
        assert!(FovSpec::symmetric([640, 480], 0.0, [60.0, 0.0]).validate().is_err());
        assert!(
            FovSpec::symmetric([640, 480], 3.0, [60.0, 0.0])
                .with_fov_max(-1.0)
                .validate()
                .is_err()
        );
        let spec = FovSpec::new([640, 480], 3.0, FovExtent::Range([[f64::NAN, 10.0], [-5.0, 5.0]]));
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_camera_frame_transforms() {
        // Camera at (1, 2, 3) looking along world +x: right = -y, up = z, back = -x.
        let frame = CameraFrame::new(
            [[0.0, -1.0, 0.0], [0.0, 0.0, 1.0], [-1.0, 0.0, 0.0]],
            [1.0, 2.0, 3.0],
        );
        let world = [Vector3::new(6.0, 2.0, 3.0), Vector3::new(1.0, 1.0, 4.0)];
        let local = frame.points_to_camera_frame(&world);
        assert!((local[0] - Vector3::new(0.0, 0.0, -5.0)).norm() < 1e-12);
        assert!((local[1] - Vector3::new(1.0, 1.0, 0.0)).norm() < 1e-12);

        let back = frame.points_to_world(&local);
        for (a, b) in back.iter().zip(&world) {
            assert!((a - b).norm() < 1e-12);
        }

        let dirs = frame.dirs_to_camera_frame(&[Vector3::new(1.0, 0.0, 0.0)]);
        assert!((dirs[0] - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_fov_spec_serde() -> TestResult {
        let spec = FovSpec::new([640, 480], 3.0, FovExtent::Range([[-30.0, 40.0], [-20.0, 20.0]]))
            .with_fov_max(100.0);
        let json = serde_json::to_string(&spec)?;
        assert!(json.contains("\"range\""));
        let parsed: FovSpec = serde_json::from_str(&json)?;
        assert_eq!(parsed, spec);
        Ok(())
    }
}
