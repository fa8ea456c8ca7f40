//! Polynomial Fisheye Camera Model
//!
//! Rotationally symmetric fisheye lens described by the angle between a ray
//! and the optical axis as a polynomial of the radial distance on the sensor.
//!
//! # Mathematical Model
//!
//! ```text
//! θ(r) = c₁·r + c₂·r² + c₃·r³ + c₄·r⁴          r in mm, θ in rad
//! r(θ) = Σᵢ₌₁..₁₀ dᵢ·(θ/θmax)ⁱ                 fitted inverse
//! ```
//!
//! Sensor positions are in mm with the origin at the bottom-left corner, x
//! pointing right and y pointing up. The principal point sits at
//! `sensor_size / 2 + center_offset`.
//!
//! # Construction
//!
//! - From known coefficients
//! - From a ray-direction lookup table, by a weighted degree 4 fit of the
//!   per-cell ray angles over their image radii

use crate::mesh::FrustumMesh;
use crate::polyfit::{FitQuality, PolyFit, Polynomial};
use crate::ray_lut::{FrustumConfig, LutConfig, RayDirectionLut};
use crate::{CameraModelError, MIN_RAY_NORM, RayImage};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const FORWARD_DEGREE: usize = 4;
const INVERSE_DEGREE: usize = 10;
const INVERSE_MIN_SAMPLES: usize = 32;

/// LUT width used for frustum extraction.
const FRUSTUM_LUT_COLUMNS: usize = 100;

/// Coefficient-based lens description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialSpec {
    /// Sensor pixels (horizontal, vertical).
    pub pixel_count: [usize; 2],
    pub pixel_size_um: f64,
    /// θ(r) coefficients in rad per mmⁱ, lowest degree first, at most 5.
    /// The constant term must be zero.
    pub coefficients: Vec<f64>,
    /// Principal point relative to the sensor centre, x right and y up.
    pub center_offset_mm: [f64; 2],
    pub fov_max_deg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialFisheyeModel {
    pixel_count: [usize; 2],
    pixel_size_mm: f64,
    sensor_size_mm: Vector2<f64>,
    center_offset_mm: Vector2<f64>,
    center_pos_mm: Vector2<f64>,
    sensor_max_radius_mm: f64,
    angle_of_radius: Polynomial,
    radius_of_angle: Polynomial,
    inverse_residual_max_mm: f64,
    max_radial_angle_deg: f64,
    fov_max_deg: f64,
    angle_range_x_deg: [f64; 2],
    angle_range_y_deg: [f64; 2],
    fit_quality: Option<FitQuality>,
}

struct SensorLayout {
    pixel_count: [usize; 2],
    pixel_size_mm: f64,
    sensor_size_mm: Vector2<f64>,
    center_offset_mm: Vector2<f64>,
    center_pos_mm: Vector2<f64>,
    sensor_max_radius_mm: f64,
}

impl SensorLayout {
    fn new(
        pixel_count: [usize; 2],
        pixel_size_um: f64,
        center_offset_mm: Vector2<f64>,
    ) -> Result<Self, CameraModelError> {
        crate::require_positive("pixel size", pixel_size_um)?;
        if pixel_count[0] == 0 || pixel_count[1] == 0 {
            return Err(CameraModelError::InvalidParams(format!(
                "pixel count must be non-zero, got {pixel_count:?}"
            )));
        }
        if !center_offset_mm.iter().all(|v| v.is_finite()) {
            return Err(CameraModelError::InvalidParams(
                "center offset must be finite".to_string(),
            ));
        }
        let pixel_size_mm = pixel_size_um * 1e-3;
        let sensor_size_mm =
            Vector2::new(pixel_count[0] as f64, pixel_count[1] as f64) * pixel_size_mm;
        let half = sensor_size_mm / 2.0;
        Ok(Self {
            pixel_count,
            pixel_size_mm,
            sensor_size_mm,
            center_offset_mm,
            center_pos_mm: half + center_offset_mm,
            sensor_max_radius_mm: (half + center_offset_mm.abs()).norm() + pixel_size_mm,
        })
    }
}

impl PolynomialFisheyeModel {
    /// Builds the model from known θ(r) coefficients.
    pub fn from_coefficients(spec: &PolynomialSpec) -> Result<Self, CameraModelError> {
        let layout = SensorLayout::new(
            spec.pixel_count,
            spec.pixel_size_um,
            Vector2::from(spec.center_offset_mm),
        )?;
        if spec.coefficients.len() > FORWARD_DEGREE + 1 {
            return Err(CameraModelError::InvalidParams(format!(
                "at most {} polynomial coefficients supported, got {}",
                FORWARD_DEGREE + 1,
                spec.coefficients.len()
            )));
        }
        if spec.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(CameraModelError::InvalidParams(
                "polynomial coefficients must be finite".to_string(),
            ));
        }
        if spec.coefficients.first().is_some_and(|c| *c != 0.0) {
            return Err(CameraModelError::InvalidParams(
                "polynomial constant term must be zero".to_string(),
            ));
        }

        let mut coefficients = vec![0.0; FORWARD_DEGREE + 1];
        coefficients[..spec.coefficients.len()].copy_from_slice(&spec.coefficients);
        Self::assemble(layout, Polynomial::new(coefficients), spec.fov_max_deg, None)
    }

    /// Fits the model to a ray-direction lookup table.
    ///
    /// Samples are weighted inversely to the number of cells sharing their
    /// radius bin so that the sparsely covered outer radii are not drowned by
    /// the centre.
    ///
    /// # Arguments
    ///
    /// * `pixel_count` - Sensor pixels (horizontal, vertical)
    /// * `pixel_size_um` - Pixel pitch in microns
    /// * `lut` - Lookup table of the lens
    /// * `fov_max_deg` - Optional FOV limit, defaults to twice the LUT's
    ///   maximal radial angle
    pub fn from_lut(
        pixel_count: [usize; 2],
        pixel_size_um: f64,
        lut: &RayDirectionLut,
        fov_max_deg: Option<f64>,
    ) -> Result<Self, CameraModelError> {
        let [ctr_row, ctr_col] = lut.img_center_rc();
        let [cnt_row, cnt_col] = lut.img_pixel_count_rc();
        let pitch_mm = pixel_size_um * 1e-3;
        let center_offset_mm = Vector2::new(
            ctr_col + 0.5 - cnt_col as f64 / 2.0,
            cnt_row as f64 / 2.0 - ctr_row - 0.5,
        ) * pitch_mm;
        let layout = SensorLayout::new(pixel_count, pixel_size_um, center_offset_mm)?;

        let (radii_mm, angles): (Vec<f64>, Vec<f64>) = lut
            .image_pixel_radii()
            .into_iter()
            .zip(lut.ray_angles())
            .zip(lut.mask())
            .filter(|(_, valid)| **valid)
            .map(|((radius, [theta, _]), _)| (radius * layout.pixel_size_mm, theta))
            .unzip();

        let radius_max = radii_mm.iter().fold(0.0_f64, |m, r| m.max(*r));
        if radius_max <= 0.0 {
            return Err(CameraModelError::InvalidLut(
                "LUT rays do not span any radius".to_string(),
            ));
        }

        let bin_count = pixel_count[0].max(pixel_count[1]);
        let bin_width = radius_max / bin_count as f64;
        let bin_of = |r: f64| ((r / bin_width).floor() as usize).min(bin_count - 1);
        let mut counts = vec![0usize; bin_count];
        for r in &radii_mm {
            counts[bin_of(*r)] += 1;
        }
        let min_count = counts
            .iter()
            .copied()
            .filter(|c| *c > 0)
            .min()
            .unwrap_or(1) as f64;
        let weights: Vec<f64> = radii_mm
            .iter()
            .map(|r| min_count / counts[bin_of(*r)] as f64)
            .collect();

        let (angle_of_radius, quality) = PolyFit::new(FORWARD_DEGREE)
            .with_weights(&weights)
            .with_domain_max(radius_max)
            .without_constant()
            .fit(&radii_mm, &angles)?;
        info!(
            samples = radii_mm.len(),
            rank = quality.rank,
            residuals = quality.residuals,
            "polynomial fitted to LUT"
        );

        let fov_max_deg = fov_max_deg.unwrap_or(2.0 * lut.max_radial_angle_deg());
        Self::assemble(layout, angle_of_radius, Some(fov_max_deg), Some(quality))
    }

    fn assemble(
        layout: SensorLayout,
        angle_of_radius: Polynomial,
        fov_max_deg: Option<f64>,
        fit_quality: Option<FitQuality>,
    ) -> Result<Self, CameraModelError> {
        if let Some(fov) = fov_max_deg {
            crate::require_positive("maximal field of view", fov)?;
        }
        let angle_deg = |r: f64| angle_of_radius.eval(r).to_degrees();

        let sensor_max_angle_deg = angle_deg(layout.sensor_max_radius_mm);
        let max_radial_angle_deg = match fov_max_deg {
            Some(fov) => sensor_max_angle_deg.min(fov / 2.0),
            None => sensor_max_angle_deg,
        };
        if max_radial_angle_deg <= 0.0 {
            return Err(CameraModelError::DegenerateLens(format!(
                "polynomial yields a maximal ray angle of {max_radial_angle_deg} deg"
            )));
        }

        let clip = |v: f64| v.clamp(-max_radial_angle_deg, max_radial_angle_deg);
        let center = layout.center_pos_mm;
        let size = layout.sensor_size_mm;
        let angle_range_x_deg = [clip(-angle_deg(center.x)), clip(angle_deg(size.x - center.x))];
        let angle_range_y_deg = [clip(-angle_deg(center.y)), clip(angle_deg(size.y - center.y))];

        let (radius_of_angle, inverse_residual_max_mm) =
            Self::fit_inverse(&angle_of_radius, &layout)?;

        debug!(
            max_radial_angle_deg,
            inverse_residual_max_mm,
            "polynomial fisheye model assembled"
        );

        Ok(Self {
            pixel_count: layout.pixel_count,
            pixel_size_mm: layout.pixel_size_mm,
            sensor_size_mm: layout.sensor_size_mm,
            center_offset_mm: layout.center_offset_mm,
            center_pos_mm: layout.center_pos_mm,
            sensor_max_radius_mm: layout.sensor_max_radius_mm,
            angle_of_radius,
            radius_of_angle,
            inverse_residual_max_mm,
            max_radial_angle_deg,
            fov_max_deg: 2.0 * max_radial_angle_deg,
            angle_range_x_deg,
            angle_range_y_deg,
            fit_quality,
        })
    }

    fn fit_inverse(
        angle_of_radius: &Polynomial,
        layout: &SensorLayout,
    ) -> Result<(Polynomial, f64), CameraModelError> {
        let steps = (layout.sensor_max_radius_mm / layout.pixel_size_mm).ceil() as usize;
        let samples = (steps + 1).max(INVERSE_MIN_SAMPLES);
        let radii: Vec<f64> = (0..samples)
            .map(|i| layout.sensor_max_radius_mm * i as f64 / (samples - 1) as f64)
            .collect();
        let angles: Vec<f64> = radii.iter().map(|r| angle_of_radius.eval(*r)).collect();
        let angle_max = angles.iter().fold(0.0_f64, |m, a| m.max(*a));
        if angle_max <= 0.0 {
            return Err(CameraModelError::DegenerateLens(
                "polynomial maps no radius to a positive angle".to_string(),
            ));
        }

        let (radius_of_angle, _) = PolyFit::new(INVERSE_DEGREE)
            .with_domain_max(angle_max)
            .without_constant()
            .fit(&angles, &radii)?;
        let residual_max = angles
            .iter()
            .zip(&radii)
            .map(|(a, r)| (radius_of_angle.eval(*a) - r).abs())
            .fold(0.0_f64, f64::max);
        Ok((radius_of_angle, residual_max))
    }

    pub fn pixel_count(&self) -> [usize; 2] {
        self.pixel_count
    }

    pub fn pixel_size_mm(&self) -> f64 {
        self.pixel_size_mm
    }

    pub fn sensor_size_mm(&self) -> Vector2<f64> {
        self.sensor_size_mm
    }

    pub fn center_offset_mm(&self) -> Vector2<f64> {
        self.center_offset_mm
    }

    pub fn center_pos_mm(&self) -> Vector2<f64> {
        self.center_pos_mm
    }

    pub fn sensor_max_radius_mm(&self) -> f64 {
        self.sensor_max_radius_mm
    }

    /// θ(r) coefficients in rad per mmⁱ, lowest degree first.
    pub fn coefficients(&self) -> Vec<f64> {
        self.angle_of_radius.monomial_coefficients()
    }

    pub fn fit_quality(&self) -> Option<&FitQuality> {
        self.fit_quality.as_ref()
    }

    /// Ray angle in radians for a sensor radius in mm.
    pub fn angle_of_radius(&self, radius_mm: f64) -> f64 {
        self.angle_of_radius.eval(radius_mm)
    }

    /// Sensor radius in mm for a ray angle in radians.
    pub fn radius_of_angle(&self, angle_rad: f64) -> f64 {
        self.radius_of_angle.eval(angle_rad)
    }

    pub fn inverse_residual_max_mm(&self) -> f64 {
        self.inverse_residual_max_mm
    }

    pub fn inverse_residual_max_pix(&self) -> f64 {
        self.inverse_residual_max_mm / self.pixel_size_mm
    }

    pub fn max_radial_angle_deg(&self) -> f64 {
        self.max_radial_angle_deg
    }

    pub fn fov_max_deg(&self) -> f64 {
        self.fov_max_deg
    }

    pub fn angle_range_x_deg(&self) -> [f64; 2] {
        self.angle_range_x_deg
    }

    pub fn angle_range_y_deg(&self) -> [f64; 2] {
        self.angle_range_y_deg
    }

    pub fn fov_deg(&self) -> [f64; 2] {
        [
            self.angle_range_x_deg[1] - self.angle_range_x_deg[0],
            self.angle_range_y_deg[1] - self.angle_range_y_deg[0],
        ]
    }

    /// Maps ray directions to sensor pixel positions.
    ///
    /// Positions are pixel-edge coordinates with the origin at the bottom-left
    /// sensor corner, x right and y up.
    ///
    /// # Arguments
    ///
    /// * `dirs` - Directions in the camera-local frame
    /// * `invert_pixel_dir` - Mirror positions through the principal point
    /// * `normalize` - Normalise the directions first
    ///
    /// # Returns
    ///
    /// One position and one validity flag per direction. A direction is valid
    /// when it lies within the lens FOV and lands on the sensor.
    pub fn ray_dirs_to_pixels_xy(
        &self,
        dirs: &[Vector3<f64>],
        invert_pixel_dir: bool,
        normalize: bool,
    ) -> (Vec<Vector2<f64>>, Vec<bool>) {
        let max_angle = self.max_radial_angle_deg.to_radians();
        let sign = if invert_pixel_dir { -1.0 } else { 1.0 };
        dirs.iter()
            .map(|dir| {
                let len = dir.norm();
                if len <= MIN_RAY_NORM {
                    return (Vector2::zeros(), false);
                }
                let dir = if normalize { dir / len } else { *dir };
                let xy = dir.xy();
                let xy_len = xy.norm();
                let theta = xy_len.atan2(-dir.z);
                let scale = if xy_len > MIN_RAY_NORM {
                    self.radius_of_angle.eval(theta) / xy_len
                } else {
                    0.0
                };
                let pos = (xy * (sign * scale) + self.center_pos_mm) / self.pixel_size_mm;
                let on_sensor = pos.x >= 0.0
                    && pos.x < self.pixel_count[0] as f64
                    && pos.y >= 0.0
                    && pos.y < self.pixel_count[1] as f64;
                (pos, on_sensor && theta <= max_angle)
            })
            .unzip()
    }

    /// Generates a ray-direction image of the lens.
    ///
    /// # Arguments
    ///
    /// * `pixel_count_x` - Horizontal LUT resolution. Defaults to the sensor
    ///   resolution; the vertical resolution follows the sensor aspect.
    ///
    /// # Returns
    ///
    /// Row-major unit rays, row 0 at the top. Rays beyond the maximal radial
    /// angle are zero.
    pub fn gen_lut_ray_dirs(&self, pixel_count_x: Option<usize>) -> Result<RayImage, CameraModelError> {
        let (nx, ny, pitch) = self.lut_layout(pixel_count_x);
        if nx < 3 || ny < 3 {
            return Err(CameraModelError::InvalidParams(format!(
                "LUT generation needs at least 3x3 pixels, got [{nx}, {ny}]"
            )));
        }

        let max_angle = self.max_radial_angle_deg.to_radians();
        let mut image = RayImage::zeros(ny, nx, 3);
        for row in 0..ny {
            for col in 0..nx {
                let pos = Vector2::new(
                    (col as f64 + 0.5) * pitch,
                    self.sensor_size_mm.y - (row as f64 + 0.5) * pitch,
                );
                let rel = pos - self.center_pos_mm;
                let radius = rel.norm();
                let angle = self.angle_of_radius.eval(radius);
                if angle > max_angle {
                    continue;
                }
                let tan = angle.tan();
                let z = if tan.abs() > 1e-6 { radius / tan } else { 1.0 };
                if let Some(ray) = Vector3::new(rel.x, rel.y, -z).try_normalize(0.0) {
                    image.set_ray(row, col, &ray);
                }
            }
        }
        Ok(image)
    }

    fn lut_layout(&self, pixel_count_x: Option<usize>) -> (usize, usize, f64) {
        match pixel_count_x {
            None => (self.pixel_count[0], self.pixel_count[1], self.pixel_size_mm),
            Some(nx) => {
                let pitch = self.sensor_size_mm.x / nx.max(1) as f64;
                (nx, (self.sensor_size_mm.y / pitch).round() as usize, pitch)
            }
        }
    }

    /// Builds the frustum mesh from a coarse LUT of the lens.
    pub fn frustum_mesh(&self, config: &FrustumConfig) -> Result<FrustumMesh, CameraModelError> {
        let rays = self.gen_lut_ray_dirs(Some(FRUSTUM_LUT_COLUMNS))?;
        let (_, _, pitch) = self.lut_layout(Some(FRUSTUM_LUT_COLUMNS));
        let center_row = (self.sensor_size_mm.y - self.center_pos_mm.y) / pitch - 0.5;
        let center_col = self.center_pos_mm.x / pitch - 0.5;
        let lut = RayDirectionLut::from_image(
            &rays,
            &LutConfig::new().with_center_rc(center_row, center_col),
        )?;
        lut.frustum_mesh(config)
    }
}
