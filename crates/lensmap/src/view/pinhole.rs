//! Pinhole camera view
//!
//! # Mathematical Model
//!
//! The renderer this view targets has a single focal length, so the focal
//! length is fixed and the sensor is sized to the requested FOV:
//!
//! ```text
//! sensor_lo = f · tan(center - fov/2)
//! sensor_hi = f · tan(center + fov/2)
//! size      = sensor_hi - sensor_lo
//! ctr       = sensor_lo + size/2         sensor centre relative to the optical axis
//!
//! u = (x · (-f/z) + size_x/2 - ctr_x) · Nx / size_x
//! v = Ny - (y · (-f/z) + size_y/2 - ctr_y) · Ny / size_y
//! ```
//!
//! Points with z ≥ 0 lie behind the camera.

use super::{CameraView, FovAdjust, FovState, ImageProjection, ZERO_FOV_DEG, on_image};
use crate::config::{CameraFrame, FovSpec, ViewDetails};
use crate::error::{LensmapError, LensmapResult};
use nalgebra::{Vector2, Vector3};
use tracing::debug;

pub const DEFAULT_FOCAL_LENGTH_MM: f64 = 10.0;

/// Sensor geometry of the pinhole view, updated by the FOV hooks.
#[derive(Debug, Clone, PartialEq)]
struct PinholeOptics {
    focal_length_mm: f64,
    sensor_center_mm: [f64; 2],
    sensor_aspect_yx: f64,
}

impl PinholeOptics {
    fn eval_sensor_size_center(&self, fov: &FovState, axis: usize) -> (f64, f64) {
        let half = fov.fov_deg[axis] / 2.0;
        let center = fov.fov_center_deg[axis];
        let lo = self.focal_length_mm * (center - half).to_radians().tan();
        let hi = self.focal_length_mm * (center + half).to_radians().tan();
        let size = hi - lo;
        (size, lo + size / 2.0)
    }

    fn eval_fov_range_center(&self, fov: &FovState, axis: usize) -> ([f64; 2], f64) {
        let half = fov.sensor_size_mm[axis] / 2.0;
        let ctr = self.sensor_center_mm[axis];
        let range = [
            ((ctr - half) / self.focal_length_mm).atan().to_degrees(),
            ((ctr + half) / self.focal_length_mm).atan().to_degrees(),
        ];
        (range, range[0] + (range[1] - range[0]) / 2.0)
    }

    /// Re-derives the FOV of an axis from its sensor extent.
    fn update_fov_from_sensor(&self, fov: &mut FovState, axis: usize) {
        let (range, center) = self.eval_fov_range_center(fov, axis);
        fov.fov_range_deg[axis] = range;
        fov.fov_center_deg[axis] = center;
        fov.fov_deg[axis] = range[1] - range[0];
    }
}

impl FovAdjust for PinholeOptics {
    fn adjust_fov(&mut self, fov: &mut FovState) -> LensmapResult<()> {
        if fov.fov_range_deg.iter().flatten().any(|v| v.abs() >= 90.0) {
            return Err(LensmapError::InvalidConfig(format!(
                "pinhole FOV range must stay within ±90 deg, got {:?}",
                fov.fov_range_deg
            )));
        }

        let missing = [fov.fov_deg[0] <= ZERO_FOV_DEG, fov.fov_deg[1] <= ZERO_FOV_DEG];
        let (known, derived) = match missing {
            [true, true] => {
                return Err(LensmapError::InvalidConfig(
                    "zero field of view given".to_string(),
                ));
            }
            [true, false] => (1, 0),
            [false, true] => (0, 1),
            [false, false] => (0, 0),
        };
        if known != derived {
            let (size, ctr) = self.eval_sensor_size_center(fov, known);
            fov.sensor_size_mm[known] = size;
            self.sensor_center_mm[known] = ctr;
            fov.sensor_size_mm[derived] = if derived == 0 {
                size / fov.pixel_aspect_yx
            } else {
                size * fov.pixel_aspect_yx
            };
            self.sensor_center_mm[derived] = 0.0;
            self.update_fov_from_sensor(fov, derived);
        }

        for axis in 0..2 {
            let (size, ctr) = self.eval_sensor_size_center(fov, axis);
            fov.sensor_size_mm[axis] = size;
            self.sensor_center_mm[axis] = ctr;
        }
        self.sensor_aspect_yx = fov.sensor_size_mm[1] / fov.sensor_size_mm[0];
        Ok(())
    }

    fn adjust_aspect(&mut self, fov: &mut FovState) {
        if !fov.ensure_square_pixel {
            fov.aspect_correction(self.sensor_aspect_yx);
            return;
        }

        if (self.sensor_aspect_yx - fov.pixel_aspect_yx).abs() > f64::EPSILON {
            if fov.sensor_size_mm[0] >= fov.sensor_size_mm[1] {
                fov.sensor_size_mm[1] = fov.sensor_size_mm[0] * fov.pixel_aspect_yx;
                self.update_fov_from_sensor(fov, 1);
            } else {
                fov.sensor_size_mm[0] = fov.sensor_size_mm[1] / fov.pixel_aspect_yx;
                self.update_fov_from_sensor(fov, 0);
            }
            self.sensor_aspect_yx = fov.sensor_size_mm[1] / fov.sensor_size_mm[0];
        }
        fov.fov_aspect_yx = fov.fov_deg[1] / fov.fov_deg[0];
        fov.aspect = [1.0, 1.0];
    }
}

/// Rectilinear camera view.
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeView {
    fov: FovState,
    frame: CameraFrame,
    optics: PinholeOptics,
}

impl PinholeView {
    /// Creates a pinhole view with the default focal length.
    pub fn new(spec: &FovSpec, frame: CameraFrame) -> LensmapResult<Self> {
        Self::with_focal_length(spec, frame, DEFAULT_FOCAL_LENGTH_MM)
    }

    pub fn with_focal_length(
        spec: &FovSpec,
        frame: CameraFrame,
        focal_length_mm: f64,
    ) -> LensmapResult<Self> {
        if !focal_length_mm.is_finite() || focal_length_mm <= 0.0 {
            return Err(LensmapError::InvalidConfig(format!(
                "focal length must be positive, got {focal_length_mm} mm"
            )));
        }
        let mut optics = PinholeOptics {
            focal_length_mm,
            sensor_center_mm: [0.0, 0.0],
            sensor_aspect_yx: 0.0,
        };
        let fov = FovState::resolve(spec, &mut optics)?;
        debug!(
            fov_deg = ?fov.fov_deg,
            sensor_size_mm = ?fov.sensor_size_mm,
            sensor_center_mm = ?optics.sensor_center_mm,
            "pinhole view initialised"
        );
        Ok(Self { fov, frame, optics })
    }

    pub fn focal_length_mm(&self) -> f64 {
        self.optics.focal_length_mm
    }

    /// Sensor centre relative to the optical axis, x right and y up.
    pub fn sensor_center_mm(&self) -> [f64; 2] {
        self.optics.sensor_center_mm
    }

    fn effective_pixel_size_mm(&self) -> [f64; 2] {
        [0, 1].map(|i| self.fov.sensor_size_mm[i] / self.fov.pixel_count[i] as f64)
    }

    /// Focal length in effective pixels per axis.
    pub fn focal_length_pix(&self) -> [f64; 2] {
        self.effective_pixel_size_mm()
            .map(|pixel| self.optics.focal_length_mm / pixel)
    }

    /// Sensor centre relative to the optical axis in effective pixels.
    pub fn image_center_pix(&self) -> [f64; 2] {
        let pixel = self.effective_pixel_size_mm();
        [0, 1].map(|i| self.optics.sensor_center_mm[i] / pixel[i])
    }

    /// Lens shift as a fraction of the larger sensor side.
    pub fn eval_shift(&self) -> [f64; 2] {
        let size_max = self.fov.sensor_size_mm[0].max(self.fov.sensor_size_mm[1]);
        self.optics.sensor_center_mm.map(|c| c / size_max)
    }

    fn sensor_offset_mm(&self) -> Vector2<f64> {
        Vector2::new(
            self.fov.sensor_size_mm[0] / 2.0 - self.optics.sensor_center_mm[0],
            self.fov.sensor_size_mm[1] / 2.0 - self.optics.sensor_center_mm[1],
        )
    }

    fn pixels_per_mm(&self) -> Vector2<f64> {
        Vector2::new(
            self.fov.pixel_count[0] as f64 / self.fov.sensor_size_mm[0],
            self.fov.pixel_count[1] as f64 / self.fov.sensor_size_mm[1],
        )
    }

    /// Unit viewing ray in the camera frame through an image position
    /// (origin top-left, y down).
    pub fn pixel_to_camera_ray(&self, pixel: &Vector2<f64>) -> Vector3<f64> {
        let ppm = self.pixels_per_mm();
        let offset = self.sensor_offset_mm();
        let x_mm = pixel.x / ppm.x - offset.x;
        let y_mm = (self.fov.pixel_count[1] as f64 - pixel.y) / ppm.y - offset.y;
        Vector3::new(x_mm, y_mm, -self.optics.focal_length_mm).normalize()
    }
}

impl CameraView for PinholeView {
    fn fov(&self) -> &FovState {
        &self.fov
    }

    fn frame(&self) -> &CameraFrame {
        &self.frame
    }

    fn project_local(&self, local: &[Vector3<f64>]) -> ImageProjection {
        let ppm = self.pixels_per_mm();
        let offset = self.sensor_offset_mm();
        let height = self.fov.pixel_count[1] as f64;
        let mut projection = ImageProjection::with_capacity(local.len());
        for p in local {
            let in_front = p.z < 0.0;
            if !in_front {
                projection.push(Vector2::zeros(), false, false);
                continue;
            }
            let projected_mm = p.xy() * (-self.optics.focal_length_mm / p.z);
            let mut pixel = (projected_mm + offset).component_mul(&ppm);
            pixel.y = height - pixel.y;
            let inside = on_image(&pixel, self.fov.pixel_count);
            projection.push(pixel, in_front, inside);
        }
        projection
    }

    fn details(&self) -> ViewDetails {
        ViewDetails::Pinhole {
            focal_length_pix: self.focal_length_pix(),
            image_center_pix: self.image_center_pix(),
        }
    }
}
