//! Radial Distortion Camera Model
//!
//! Pinhole projection with three radial distortion coefficients (the OpenCV
//! radial subset, no tangential terms).
//!
//! # Mathematical Model
//!
//! ## Projection (3D → 2D)
//!
//! ```text
//! x' = x/z,  y' = y/z
//! r² = x'² + y'²
//! d(r) = 1 + k₁·r² + k₂·r⁴ + k₃·r⁶
//! u = fx·x'·d(r) + cx
//! v = fy·y'·d(r) + cy
//! ```
//!
//! ## Unprojection (2D → 3D)
//!
//! The distorted radius `r_d = r·d(r)` is inverted per pixel with Newton
//! iterations, seeded by a degree 11 polynomial fit of the inverse mapping.
//! Inversion is only defined inside the monotonic region of `r·d(r)`, bounded
//! by the first positive root of its derivative:
//!
//! ```text
//! d/dr [r·d(r)] = 1 + 3k₁·r² + 5k₂·r⁴ + 7k₃·r⁶
//! ```
//!
//! Pixels beyond that radius have no ray and are reported as zero vectors.

use crate::polyfit::{PolyFit, Polynomial, real_roots};
use crate::{CameraModelError, PinholeParams, RayImage};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

const PRECISION: f64 = 1e-6;

/// Newton residual tolerance on the distorted radius.
pub const NEWTON_TOLERANCE: f64 = 1e-10;

pub const MAX_NEWTON_ITERATIONS: usize = 1000;

const SEED_DEGREE: usize = 11;
const SEED_SAMPLES: usize = 100;

/// Radii bounding the monotonic region of the distortion mapping.
///
/// Both values are floored to two decimals. Without a positive derivative
/// root both are infinite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistortionLimit {
    pub undistorted: f64,
    pub distorted: f64,
}

/// Options for ray-direction lookup generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Sub-pixel samples per sensor pixel along each axis.
    pub super_sampling: usize,
    /// Extra LUT cells around the sensor on every side.
    pub border: usize,
    /// Store rays in the camera-local frame (x right, y up, -z forward)
    /// instead of the OpenCV frame (x right, y down, +z forward).
    pub remap_axes: bool,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            super_sampling: 1,
            border: 1,
            remap_axes: true,
        }
    }
}

impl LookupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_super_sampling(mut self, super_sampling: usize) -> Self {
        self.super_sampling = super_sampling;
        self
    }

    pub fn with_border(mut self, border: usize) -> Self {
        self.border = border;
        self
    }

    pub fn with_remap_axes(mut self, remap_axes: bool) -> Self {
        self.remap_axes = remap_axes;
        self
    }

    fn validate(&self) -> Result<(), CameraModelError> {
        if self.super_sampling == 0 {
            return Err(CameraModelError::InvalidParams(
                "supersampling must be greater than zero".to_string(),
            ));
        }
        if self.border == 0 {
            return Err(CameraModelError::InvalidParams(
                "border must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Generated ray-direction table and the field of view it achieves.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    /// Normalised rays, row 0 is the top of the sensor. Invalid cells are zero.
    pub rays: RayImage,
    /// Achieved (horizontal, vertical) field of view in degrees.
    pub fov_deg: [f64; 2],
    /// [[left, right], [bottom, top]] angles in degrees.
    pub fov_range_deg: [[f64; 2]; 2],
}

/// Radial distortion camera with intrinsics in the OpenCV convention.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialDistortionModel {
    pub intrinsics: PinholeParams,
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    limit: DistortionLimit,
}

impl RadialDistortionModel {
    /// Creates a model and evaluates its monotonic region.
    ///
    /// # Returns
    ///
    /// `Err(CameraModelError::DegenerateLens)` when no pixel can be inverted.
    pub fn new(
        intrinsics: PinholeParams,
        distortion: [f64; 3],
    ) -> Result<Self, CameraModelError> {
        intrinsics.validate()?;
        let [k1, k2, k3] = distortion;
        let limit = Self::maximum_distortion_radius(k1, k2, k3)?;
        debug!(
            k1,
            k2,
            k3,
            max_undistorted = limit.undistorted,
            max_distorted = limit.distorted,
            "radial distortion model created"
        );
        Ok(Self {
            intrinsics,
            k1,
            k2,
            k3,
            limit,
        })
    }

    pub fn limit(&self) -> DistortionLimit {
        self.limit
    }

    pub fn has_distortion(&self) -> bool {
        self.k1 != 0.0 || self.k2 != 0.0 || self.k3 != 0.0
    }

    fn factor(&self, r2: f64) -> f64 {
        1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3))
    }

    /// Maps an undistorted normalised radius to its distorted radius.
    pub fn distort_radius(&self, r: f64) -> f64 {
        r * self.factor(r * r)
    }

    fn distort_radius_derivative(&self, r: f64) -> f64 {
        let r2 = r * r;
        1.0 + r2 * (3.0 * self.k1 + r2 * (5.0 * self.k2 + r2 * 7.0 * self.k3))
    }

    /// Evaluates the monotonic region of `r·(1 + k₁r² + k₂r⁴ + k₃r⁶)`.
    ///
    /// The smallest positive real root of the derivative gives the maximal
    /// undistorted radius.
    pub fn maximum_distortion_radius(
        k1: f64,
        k2: f64,
        k3: f64,
    ) -> Result<DistortionLimit, CameraModelError> {
        if !(k1.is_finite() && k2.is_finite() && k3.is_finite()) {
            return Err(CameraModelError::InvalidParams(format!(
                "distortion coefficients must be finite, got ({k1}, {k2}, {k3})"
            )));
        }

        // derivative as a cubic in s = r²
        let roots = real_roots(&[1.0, 3.0 * k1, 5.0 * k2, 7.0 * k3])?;
        let Some(s) = roots
            .into_iter()
            .filter(|s| *s > 0.0)
            .min_by(f64::total_cmp)
        else {
            return Ok(DistortionLimit {
                undistorted: f64::INFINITY,
                distorted: f64::INFINITY,
            });
        };

        let floor2 = |v: f64| (v * 100.0).floor() / 100.0;
        let undistorted = floor2(s.sqrt());
        let r2 = undistorted * undistorted;
        let distorted = floor2(undistorted * (1.0 + r2 * (k1 + r2 * (k2 + r2 * k3))));
        if undistorted <= 0.0 || distorted <= 0.0 {
            return Err(CameraModelError::DegenerateLens(format!(
                "monotonic region ends at radius {}, no pixel can be undistorted",
                s.sqrt()
            )));
        }
        Ok(DistortionLimit {
            undistorted,
            distorted,
        })
    }

    /// Fits a polynomial approximating the inverse distortion mapping.
    ///
    /// # Arguments
    ///
    /// * `max_distorted` - Largest distorted radius that will be queried
    ///
    /// # Returns
    ///
    /// Polynomial mapping a distorted radius to an undistorted radius, used to
    /// seed Newton iterations.
    pub fn approx_undistortion(&self, max_distorted: f64) -> Result<Polynomial, CameraModelError> {
        let x_max = self.limit.undistorted.min(3.0 * max_distorted);
        if x_max <= 0.0 || !x_max.is_finite() {
            return Ok(Polynomial::new(vec![0.0, 1.0]));
        }

        let step = x_max / SEED_SAMPLES as f64;
        let undistorted: Vec<f64> = (0..SEED_SAMPLES).map(|i| i as f64 * step).collect();
        let distorted: Vec<f64> = undistorted.iter().map(|r| self.distort_radius(*r)).collect();
        let domain = distorted.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let (poly, quality) = PolyFit::new(SEED_DEGREE)
            .with_domain_max(domain)
            .fit(&distorted, &undistorted)?;
        debug!(x_max, rank = quality.rank, "inverse distortion seed fitted");
        Ok(poly)
    }

    /// Inverts distorted radii with Newton iterations.
    ///
    /// # Returns
    ///
    /// `None` for radii outside the monotonic region. Fails if any radius
    /// needs more than [`MAX_NEWTON_ITERATIONS`] steps.
    pub fn undistort_radii(&self, distorted: &[f64]) -> Result<Vec<Option<f64>>, CameraModelError> {
        let observed_max = distorted
            .iter()
            .filter(|r| **r < self.limit.distorted)
            .fold(0.0_f64, |m, r| m.max(*r));
        let seed = self.approx_undistortion(observed_max)?;

        distorted
            .iter()
            .map(|&rd| {
                if rd.is_nan() || rd >= self.limit.distorted {
                    return Ok(None);
                }
                self.newton_undistort(rd, seed.eval(rd), MAX_NEWTON_ITERATIONS)
                    .map(Some)
            })
            .collect()
    }

    fn newton_undistort(
        &self,
        rd: f64,
        seed: f64,
        max_iterations: usize,
    ) -> Result<f64, CameraModelError> {
        let mut r = seed.clamp(0.0, self.limit.undistorted);
        let mut iterations = 0;
        loop {
            let cost = self.distort_radius(r) - rd;
            if cost.abs() <= NEWTON_TOLERANCE {
                break;
            }
            if iterations >= max_iterations {
                return Err(CameraModelError::NotConverged { max_iterations });
            }
            r -= cost / self.distort_radius_derivative(r);
            if !r.is_finite() {
                return Err(CameraModelError::NumericalError(format!(
                    "Newton undistortion diverged for radius {rd}"
                )));
            }
            iterations += 1;
        }

        if r < 0.0 && r > -NEWTON_TOLERANCE {
            r = 0.0;
        }
        if r < 0.0 {
            return Err(CameraModelError::NumericalError(format!(
                "undistortion produced negative radius {r} for {rd}"
            )));
        }
        Ok(r)
    }

    /// Undistorts normalised image coordinates into rays with z = 1.
    ///
    /// Coordinates outside the monotonic region map to the zero vector.
    pub fn undistort(
        &self,
        normalized: &[Vector2<f64>],
    ) -> Result<Vec<Vector3<f64>>, CameraModelError> {
        let radii: Vec<f64> = normalized.iter().map(|p| p.norm()).collect();
        let undistorted = self.undistort_radii(&radii)?;
        Ok(normalized
            .iter()
            .zip(undistorted)
            .map(|(p, r)| match r {
                Some(r) => {
                    let xy = p / self.factor(r * r);
                    Vector3::new(xy.x, xy.y, 1.0)
                }
                None => Vector3::zeros(),
            })
            .collect())
    }

    /// Projects a point in the OpenCV camera frame to pixel coordinates.
    ///
    /// # Returns
    ///
    /// - `Some(uv)` - pixel coordinates if z ≥ PRECISION
    /// - `None` - if the point is at or behind the camera
    pub fn project(&self, p_cam: &Vector3<f64>) -> Option<Vector2<f64>> {
        if p_cam.z < PRECISION {
            return None;
        }
        let x = p_cam.x / p_cam.z;
        let y = p_cam.y / p_cam.z;
        let d = self.factor(x * x + y * y);
        Some(Vector2::new(
            self.intrinsics.fx * x * d + self.intrinsics.cx,
            self.intrinsics.fy * y * d + self.intrinsics.cy,
        ))
    }

    /// Unprojects pixels to unit rays in the OpenCV camera frame.
    ///
    /// Pixels outside the monotonic region yield the zero vector.
    pub fn unproject_batch(
        &self,
        pixels: &[Vector2<f64>],
    ) -> Result<Vec<Vector3<f64>>, CameraModelError> {
        let PinholeParams { fx, fy, cx, cy } = self.intrinsics;
        let normalized: Vec<Vector2<f64>> = pixels
            .iter()
            .map(|p| Vector2::new((p.x - cx) / fx, (p.y - cy) / fy))
            .collect();

        let rays = if self.has_distortion() {
            self.undistort(&normalized)?
        } else {
            normalized
                .iter()
                .map(|p| Vector3::new(p.x, p.y, 1.0))
                .collect()
        };
        Ok(rays
            .into_iter()
            .map(|r| r.try_normalize(0.0).unwrap_or_else(Vector3::zeros))
            .collect())
    }

    /// Generates the ray for every LUT cell of a sensor.
    ///
    /// # Arguments
    ///
    /// * `sensor_size` - Sensor (width, height) in pixels
    /// * `config` - Supersampling, border and axis convention
    ///
    /// # Returns
    ///
    /// Image of `(height·ss + 2·border) × (width·ss + 2·border)` unit rays.
    pub fn lookup_rays(
        &self,
        sensor_size: [usize; 2],
        config: &LookupConfig,
    ) -> Result<RayImage, CameraModelError> {
        let table = self.lookup_grid(sensor_size, config)?;
        let rays = if config.remap_axes {
            table.rays.iter().map(to_camera_local).collect()
        } else {
            table.rays
        };
        RayImage::from_rays(table.rows, table.cols, &rays)
    }

    /// Generates a ray-direction lookup table and the field of view it covers.
    ///
    /// The field of view is measured from the outermost valid rays through the
    /// principal point row and column.
    pub fn create_lookup(
        &self,
        sensor_size: [usize; 2],
        config: &LookupConfig,
    ) -> Result<LookupTable, CameraModelError> {
        let grid = self.lookup_grid(sensor_size, config)?;
        let local: Vec<Vector3<f64>> = grid.rays.iter().map(to_camera_local).collect();

        let ss = config.super_sampling as f64;
        let border = config.border;
        let last_row = border + sensor_size[1] * config.super_sampling - 1;
        let last_col = border + sensor_size[0] * config.super_sampling - 1;
        let center_col = (border + (self.intrinsics.cx * ss).floor().max(0.0) as usize).min(last_col);
        let center_row = (border + (self.intrinsics.cy * ss).floor().max(0.0) as usize).min(last_row);

        let at = |row: usize, col: usize| &local[row * grid.cols + col];
        let is_valid = |ray: &&Vector3<f64>| ray.norm() > crate::MIN_RAY_NORM;
        let degenerate = |side: &str| {
            CameraModelError::DegenerateLens(format!(
                "no valid ray towards the {side} sensor edge"
            ))
        };

        let left = (border..=last_col)
            .map(|c| at(center_row, c))
            .find(is_valid)
            .ok_or_else(|| degenerate("left"))?;
        let right = (border..=last_col)
            .rev()
            .map(|c| at(center_row, c))
            .find(is_valid)
            .ok_or_else(|| degenerate("right"))?;
        let top = (border..=last_row)
            .map(|r| at(r, center_col))
            .find(is_valid)
            .ok_or_else(|| degenerate("top"))?;
        let bottom = (border..=last_row)
            .rev()
            .map(|r| at(r, center_col))
            .find(is_valid)
            .ok_or_else(|| degenerate("bottom"))?;

        let horizontal = |r: &Vector3<f64>| r.x.atan2(-r.z).to_degrees();
        let vertical = |r: &Vector3<f64>| r.y.atan2(-r.z).to_degrees();
        let fov_range_deg = [
            [horizontal(left), horizontal(right)],
            [vertical(bottom), vertical(top)],
        ];
        let fov_deg = [
            fov_range_deg[0][1] - fov_range_deg[0][0],
            fov_range_deg[1][1] - fov_range_deg[1][0],
        ];
        debug!(
            rows = grid.rows,
            cols = grid.cols,
            fov_x = fov_deg[0],
            fov_y = fov_deg[1],
            "ray lookup table generated"
        );

        let rays = if config.remap_axes { local } else { grid.rays };
        Ok(LookupTable {
            rays: RayImage::from_rays(grid.rows, grid.cols, &rays)?,
            fov_deg,
            fov_range_deg,
        })
    }

    /// Same as [`Self::create_lookup`] for a principal point given with its y
    /// coordinate measured from the bottom sensor edge.
    pub fn create_lookup_from_bottom_left(
        sensor_size: [usize; 2],
        focal_length: [f64; 2],
        center_from_bottom: [f64; 2],
        distortion: [f64; 3],
        config: &LookupConfig,
    ) -> Result<LookupTable, CameraModelError> {
        let intrinsics = PinholeParams::new(
            focal_length[0],
            focal_length[1],
            center_from_bottom[0],
            sensor_size[1] as f64 - center_from_bottom[1],
        )?;
        Self::new(intrinsics, distortion)?.create_lookup(sensor_size, config)
    }

    fn lookup_grid(
        &self,
        sensor_size: [usize; 2],
        config: &LookupConfig,
    ) -> Result<LookupGrid, CameraModelError> {
        config.validate()?;
        let [width, height] = sensor_size;
        if width == 0 || height == 0 {
            return Err(CameraModelError::InvalidParams(format!(
                "sensor size must be non-zero, got {width}x{height}"
            )));
        }

        let ss = config.super_sampling;
        let border = config.border as f64;
        let cols = width * ss + 2 * config.border;
        let rows = height * ss + 2 * config.border;
        let position = |index: usize| (index as f64 - border + 0.5) / ss as f64;

        let pixels: Vec<Vector2<f64>> = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| Vector2::new(position(c), position(r))))
            .collect();
        let rays = self.unproject_batch(&pixels)?;
        Ok(LookupGrid { rows, cols, rays })
    }
}

struct LookupGrid {
    rows: usize,
    cols: usize,
    rays: Vec<Vector3<f64>>,
}

/// OpenCV frame (y down, +z forward) to camera-local frame (y up, -z forward).
fn to_camera_local(ray: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(ray.x, -ray.y, -ray.z)
}
