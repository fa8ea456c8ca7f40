//! Ray-Direction Lookup Table
//!
//! A lookup table (LUT) stores one ray direction per sensor cell, optionally
//! supersampled and padded with border cells. Rays use the camera-local frame
//! (x right, y up, camera looking along -z). A zero vector marks a cell
//! without a ray.
//!
//! # Coordinate Systems
//!
//! ```text
//! LUT cell index      (row, col) into the stored table
//! image pixel         pixel-centred sensor coordinate, (0, 0) is the centre
//!                     of the top-left sensor pixel
//!
//! img = (lut - border - (ss/2 - 0.5)) / ss
//! lut = img · ss + border + (ss/2 - 0.5)
//! ```
//!
//! # Inverse Projection
//!
//! A query direction is matched to its nearest stored ray through a k-d tree
//! built once per table, then refined to sub-cell precision by projecting the
//! residual onto the local row and column ray differences.
//!
//! # Render Canvas
//!
//! The table also describes the square equidistant fisheye canvas that
//! encloses the sensor: its pixel count, field of view, the sensor's pixel
//! range on the canvas and the normalised crop rectangle.

use crate::kdtree::{KdTree3, nearest_brute_force};
use crate::mesh::{FrustumMesh, RingBuilder, build_frustum};
use crate::{CameraModelError, MIN_RAY_NORM, RayImage, VALID_RAY_NORM};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Queries below this count skip the k-d tree.
const BRUTE_FORCE_QUERY_LIMIT: usize = 4;

/// Queries farther than this many cell spacings from their nearest ray are
/// off the table.
const MAX_CELL_DISTANCE: f64 = 2.0;

/// Channels of the stored table: ray direction and vignetting.
pub const LUT_CHANNELS: usize = 4;

/// Layout of a ray-direction lookup table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LutConfig {
    /// Padding cells on every side of the sensor area.
    pub border: usize,
    /// LUT cells per sensor pixel along each axis.
    pub super_sampling: usize,
    /// Principal point in LUT cell coordinates (row, col). Defaults to the
    /// table centre.
    pub center_rc: Option<[f64; 2]>,
}

impl Default for LutConfig {
    fn default() -> Self {
        Self {
            border: 0,
            super_sampling: 1,
            center_rc: None,
        }
    }
}

impl LutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_border(mut self, border: usize) -> Self {
        self.border = border;
        self
    }

    pub fn with_super_sampling(mut self, super_sampling: usize) -> Self {
        self.super_sampling = super_sampling;
        self
    }

    pub fn with_center_rc(mut self, row: f64, col: f64) -> Self {
        self.center_rc = Some([row, col]);
        self
    }
}

/// Frustum mesh parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrustumConfig {
    /// Length of the frustum rays.
    pub ray_length: f64,
    /// Maximal angle between consecutive boundary rays in degrees.
    pub max_edge_angle_deg: f64,
    /// Approximate angle between inner rings in degrees.
    pub surface_step_deg: f64,
}

impl Default for FrustumConfig {
    fn default() -> Self {
        Self {
            ray_length: 1.0,
            max_edge_angle_deg: 1.0,
            surface_step_deg: 10.0,
        }
    }
}

impl FrustumConfig {
    pub fn new(ray_length: f64) -> Self {
        Self {
            ray_length,
            ..Self::default()
        }
    }

    pub fn with_max_edge_angle(mut self, max_edge_angle_deg: f64) -> Self {
        self.max_edge_angle_deg = max_edge_angle_deg;
        self
    }

    pub fn with_surface_step(mut self, surface_step_deg: f64) -> Self {
        self.surface_step_deg = surface_step_deg;
        self
    }
}

/// Normalised crop rectangle of the render canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderCrop {
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
}

#[derive(Debug, Clone)]
pub struct RayDirectionLut {
    image: RayImage,
    mask: Vec<bool>,
    border: usize,
    super_sampling: usize,
    lut_center_rc: [f64; 2],
    img_pixel_count_rc: [usize; 2],
    img_center_rc: [f64; 2],
    img_center_pixel_rc: [i64; 2],
    max_radial_angle_deg: f64,
    lut_angle_range_x_deg: [f64; 2],
    lut_angle_range_y_deg: [f64; 2],
    render_center_pixel: i64,
    render_pixel_count: i64,
    render_fov_deg: f64,
    render_pixels_per_deg: f64,
    render_img_range_col: [i64; 2],
    render_img_range_row: [i64; 2],
    render_lut_angle_range_x_deg: [f64; 2],
    render_lut_angle_range_y_deg: [f64; 2],
    cam_shift_xy: [f64; 2],
    render_crop: RenderCrop,
    index: OnceLock<KdTree3>,
}

impl RayDirectionLut {
    /// Builds a lookup table from a ray image with at least three channels.
    ///
    /// Rays are normalised on load. A fourth channel is kept as vignetting,
    /// otherwise vignetting is 1.
    pub fn from_image(image: &RayImage, config: &LutConfig) -> Result<Self, CameraModelError> {
        if image.channels() < 3 {
            return Err(CameraModelError::InvalidLut(format!(
                "LUT image has {} channels, at least 3 are required",
                image.channels()
            )));
        }
        if config.super_sampling == 0 {
            return Err(CameraModelError::InvalidLut(
                "supersampling must be at least 1".to_string(),
            ));
        }

        let rows = image.rows();
        let cols = image.cols();
        let border = config.border;
        let ss = config.super_sampling;
        let img_per_lut = 1.0 / ss as f64;

        let sensor_cells = |n: usize, axis: &str| {
            if n <= 2 * border || (n - 2 * border) % ss != 0 {
                return Err(CameraModelError::InvalidLut(format!(
                    "inconsistent LUT {axis} count ({n}) w.r.t. border ({border}) and supersampling ({ss})"
                )));
            }
            Ok((n - 2 * border) / ss)
        };
        let img_pixel_count_rc = [sensor_cells(rows, "row")?, sensor_cells(cols, "column")?];

        let mut data = Vec::with_capacity(rows * cols * LUT_CHANNELS);
        let mut mask = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                let ray = image.ray(r, c);
                let len = ray.norm();
                let valid = len > MIN_RAY_NORM;
                let unit = if valid { ray / len } else { Vector3::zeros() };
                let vignetting = image.pixel(r, c).get(3).copied().unwrap_or(1.0);
                data.extend_from_slice(&[unit.x, unit.y, unit.z, vignetting]);
                mask.push(valid);
            }
        }
        let image = RayImage::from_vec(rows, cols, LUT_CHANNELS, data)?;

        let in_border = |r: usize, c: usize| {
            r < border || c < border || r >= rows - border || c >= cols - border
        };
        let invalid_border = (0..rows * cols)
            .filter(|i| in_border(i / cols, i % cols) && !mask[*i])
            .count();
        if invalid_border > 0 {
            warn!(
                invalid_border,
                border, "LUT border holds invalid rays, queries near the sensor edge may be rejected"
            );
        }

        let lut_center_rc = config
            .center_rc
            .unwrap_or([rows as f64 / 2.0 - 0.5, cols as f64 / 2.0 - 0.5]);

        let mut lut_radius_max: Option<f64> = None;
        let mut max_angle_deg = 0.0_f64;
        let mut range_x = [1000.0_f64, -1000.0_f64];
        let mut range_y = [1000.0_f64, -1000.0_f64];
        for (i, _) in mask.iter().enumerate().filter(|(_, v)| **v) {
            let (r, c) = (i / cols, i % cols);
            let radius = (r as f64 - lut_center_rc[0]).hypot(c as f64 - lut_center_rc[1]);
            lut_radius_max = Some(lut_radius_max.map_or(radius, |m| m.max(radius)));

            let ray = image.ray(r, c);
            let xy = ray.xy();
            let xy_len = xy.norm();
            if xy_len > MIN_RAY_NORM {
                let theta_deg = xy_len.atan2(-ray.z).to_degrees();
                max_angle_deg = max_angle_deg.max(theta_deg);
                let dir = xy / xy_len * theta_deg;
                range_x = [range_x[0].min(dir.x), range_x[1].max(dir.x)];
                range_y = [range_y[0].min(dir.y), range_y[1].max(dir.y)];
            }
        }
        if range_x[0] > range_x[1] {
            range_x = [0.0, 0.0];
            range_y = [0.0, 0.0];
        }
        let Some(lut_radius_max) = lut_radius_max else {
            return Err(CameraModelError::InvalidLut(
                "LUT holds no valid ray directions".to_string(),
            ));
        };

        let to_img = |v: f64| (v - border as f64 - (ss as f64 / 2.0 - 0.5)) * img_per_lut;
        let img_center_rc = [to_img(lut_center_rc[0]), to_img(lut_center_rc[1])];
        let img_center_pixel_rc = [
            img_center_rc[0].floor() as i64,
            img_center_rc[1].floor() as i64,
        ];
        let img_radius_max = lut_radius_max * img_per_lut;
        let max_radial_angle_deg = max_angle_deg.ceil();

        let render_center_pixel = (img_radius_max + 1.0).ceil() as i64;
        let render_pixel_count = 2 * render_center_pixel + 1;
        let render_fov_deg = 2.0 * max_radial_angle_deg;
        let render_pixels_per_deg = render_pixel_count as f64 / render_fov_deg;
        let border_offset = img_per_lut * border as f64;

        let [ctr_row, ctr_col] = img_center_pixel_rc;
        let [cnt_row, cnt_col] = [img_pixel_count_rc[0] as i64, img_pixel_count_rc[1] as i64];
        let render_img_range_col = [
            render_center_pixel - ctr_col,
            render_center_pixel + cnt_col - ctr_col - 1,
        ];
        let render_img_range_row = [
            render_center_pixel - ctr_row,
            render_center_pixel + cnt_row - ctr_row - 1,
        ];
        let render_lut_angle_range_x_deg = [
            -(ctr_col as f64 + border_offset) / render_pixels_per_deg,
            ((cnt_col - ctr_col - 1) as f64 + border_offset) / render_pixels_per_deg,
        ];
        let render_lut_angle_range_y_deg = [
            -((cnt_row - ctr_row - 1) as f64 + border_offset) / render_pixels_per_deg,
            (ctr_row as f64 + border_offset) / render_pixels_per_deg,
        ];

        let n = render_pixel_count as f64;
        let cam_shift_xy = [
            (ctr_col as f64 - img_center_rc[1]) / n,
            (img_center_rc[0] - ctr_row as f64) / n,
        ];
        let render_crop = RenderCrop {
            left: (render_img_range_col[0] as f64 + 0.5) / n,
            right: (render_img_range_col[1] as f64 + 1.5) / n,
            bottom: (n - (render_img_range_row[1] + 1) as f64 + 0.5) / n,
            top: (n - render_img_range_row[0] as f64 + 0.5) / n,
        };

        debug!(
            rows,
            cols,
            border,
            super_sampling = ss,
            max_radial_angle_deg,
            render_pixel_count,
            "ray-direction LUT loaded"
        );

        Ok(Self {
            image,
            mask,
            border,
            super_sampling: ss,
            lut_center_rc,
            img_pixel_count_rc,
            img_center_rc,
            img_center_pixel_rc,
            max_radial_angle_deg,
            lut_angle_range_x_deg: range_x,
            lut_angle_range_y_deg: range_y,
            render_center_pixel,
            render_pixel_count,
            render_fov_deg,
            render_pixels_per_deg,
            render_img_range_col,
            render_img_range_row,
            render_lut_angle_range_x_deg,
            render_lut_angle_range_y_deg,
            cam_shift_xy,
            render_crop,
            index: OnceLock::new(),
        })
    }

    pub fn border(&self) -> usize {
        self.border
    }

    pub fn super_sampling(&self) -> usize {
        self.super_sampling
    }

    /// Table shape (rows, cols).
    pub fn lut_pixel_count_rc(&self) -> [usize; 2] {
        [self.image.rows(), self.image.cols()]
    }

    pub fn lut_center_rc(&self) -> [f64; 2] {
        self.lut_center_rc
    }

    /// Sensor shape (rows, cols) without border and supersampling.
    pub fn img_pixel_count_rc(&self) -> [usize; 2] {
        self.img_pixel_count_rc
    }

    /// Principal point in image pixel coordinates (row, col).
    pub fn img_center_rc(&self) -> [f64; 2] {
        self.img_center_rc
    }

    /// Sensor pixel (row, col) holding the principal point.
    pub fn img_center_pixel_rc(&self) -> [i64; 2] {
        self.img_center_pixel_rc
    }

    /// Largest angle between a stored ray and the optical axis, rounded up to
    /// whole degrees.
    pub fn max_radial_angle_deg(&self) -> f64 {
        self.max_radial_angle_deg
    }

    pub fn lut_angle_range_x_deg(&self) -> [f64; 2] {
        self.lut_angle_range_x_deg
    }

    pub fn lut_angle_range_y_deg(&self) -> [f64; 2] {
        self.lut_angle_range_y_deg
    }

    /// Angular extent (x, y) of the stored rays in degrees.
    pub fn lut_fov_deg(&self) -> [f64; 2] {
        [
            self.lut_angle_range_x_deg[1] - self.lut_angle_range_x_deg[0],
            self.lut_angle_range_y_deg[1] - self.lut_angle_range_y_deg[0],
        ]
    }

    pub fn render_center_pixel(&self) -> i64 {
        self.render_center_pixel
    }

    /// Pixels per side of the square render canvas. Always odd.
    pub fn render_pixel_count(&self) -> i64 {
        self.render_pixel_count
    }

    pub fn render_fov_deg(&self) -> f64 {
        self.render_fov_deg
    }

    pub fn render_pixels_per_deg(&self) -> f64 {
        self.render_pixels_per_deg
    }

    /// First and last canvas column covered by the sensor.
    pub fn render_img_range_col(&self) -> [i64; 2] {
        self.render_img_range_col
    }

    /// First and last canvas row covered by the sensor.
    pub fn render_img_range_row(&self) -> [i64; 2] {
        self.render_img_range_row
    }

    pub fn render_lut_angle_range_x_deg(&self) -> [f64; 2] {
        self.render_lut_angle_range_x_deg
    }

    pub fn render_lut_angle_range_y_deg(&self) -> [f64; 2] {
        self.render_lut_angle_range_y_deg
    }

    /// Sub-pixel principal point offset as a fraction of the canvas size.
    pub fn cam_shift_xy(&self) -> [f64; 2] {
        self.cam_shift_xy
    }

    pub fn render_crop(&self) -> RenderCrop {
        self.render_crop
    }

    /// Normalised table: ray direction plus vignetting per cell.
    pub fn lut_image(&self) -> &RayImage {
        &self.image
    }

    /// Normalised table with row 0 at the bottom of the sensor.
    pub fn lut_image_flipped(&self) -> RayImage {
        self.image.flipped_rows()
    }

    /// Row-major validity of the table cells.
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn lut_to_img_pixel_value(&self, lut: f64) -> f64 {
        (lut - self.border as f64 - (self.super_sampling as f64 / 2.0 - 0.5))
            / self.super_sampling as f64
    }

    pub fn img_to_lut_pixel_value(&self, img: f64) -> f64 {
        img * self.super_sampling as f64
            + self.border as f64
            + (self.super_sampling as f64 / 2.0 - 0.5)
    }

    pub fn lut_to_img_pixel(&self, lut_rc: [f64; 2]) -> [f64; 2] {
        lut_rc.map(|v| self.lut_to_img_pixel_value(v))
    }

    pub fn img_to_lut_pixel(&self, img_rc: [f64; 2]) -> [f64; 2] {
        img_rc.map(|v| self.img_to_lut_pixel_value(v))
    }

    /// Distance of every valid cell to the principal point in image pixels.
    /// Invalid cells read 0.
    pub fn image_pixel_radii(&self) -> Vec<f64> {
        let cols = self.image.cols();
        self.mask
            .iter()
            .enumerate()
            .map(|(i, valid)| {
                if !*valid {
                    return 0.0;
                }
                let [r, c] = self.lut_to_img_pixel([(i / cols) as f64, (i % cols) as f64]);
                (r - self.img_center_rc[0]).hypot(c - self.img_center_rc[1])
            })
            .collect()
    }

    /// Per cell (θ, φ) in radians: angle to the optical axis and azimuth.
    /// Invalid cells read (0, 0).
    pub fn ray_angles(&self) -> Vec<[f64; 2]> {
        let cols = self.image.cols();
        self.mask
            .iter()
            .enumerate()
            .map(|(i, valid)| {
                if !*valid {
                    return [0.0, 0.0];
                }
                let ray = self.image.ray(i / cols, i % cols);
                [ray.xy().norm().atan2(-ray.z), ray.y.atan2(ray.x)]
            })
            .collect()
    }

    fn index(&self) -> &KdTree3 {
        self.index
            .get_or_init(|| KdTree3::build(&self.image.rays()))
    }

    fn nearest_cell(&self, query: &Vector3<f64>, rays: Option<&[Vector3<f64>]>) -> Option<usize> {
        match rays {
            Some(rays) => nearest_brute_force(rays, query).map(|(i, _)| i),
            None => self.index().nearest(query).map(|(i, _)| i),
        }
    }

    /// Maps ray directions to pixel-centred image positions (row, col).
    ///
    /// # Arguments
    ///
    /// * `dirs` - Query directions in the camera-local frame
    /// * `normalize` - Normalise queries before matching
    ///
    /// # Returns
    ///
    /// One position and one validity flag per query. Invalid queries report
    /// position (0, 0).
    pub fn ray_dirs_to_pixels_rc(
        &self,
        dirs: &[Vector3<f64>],
        normalize: bool,
    ) -> (Vec<Vector2<f64>>, Vec<bool>) {
        let brute_force_rays =
            (dirs.len() < BRUTE_FORCE_QUERY_LIMIT).then(|| self.image.rays());
        dirs.iter()
            .map(|dir| {
                if !dir.iter().all(|v| v.is_finite()) {
                    return (Vector2::zeros(), false);
                }
                let query = if normalize {
                    dir.try_normalize(0.0).unwrap_or_else(Vector3::zeros)
                } else {
                    *dir
                };
                self.nearest_cell(&query, brute_force_rays.as_deref())
                    .and_then(|cell| self.refine(cell, &query))
                    .map_or((Vector2::zeros(), false), |p| (p, true))
            })
            .unzip()
    }

    /// Sub-cell position of a query around its nearest cell.
    fn refine(&self, cell: usize, query: &Vector3<f64>) -> Option<Vector2<f64>> {
        let rows = self.image.rows();
        let cols = self.image.cols();
        if rows < 2 || cols < 2 {
            return None;
        }
        let (row, col) = (cell / cols, cell % cols);
        let origin = self.image.ray(row, col);
        if origin.norm() < VALID_RAY_NORM {
            return None;
        }

        let axis = |neighbor: Vector3<f64>, forward: bool| {
            if neighbor.norm() < VALID_RAY_NORM {
                None
            } else if forward {
                Some(neighbor - origin)
            } else {
                Some(origin - neighbor)
            }
        };
        let axis_col = if col + 1 < cols {
            axis(self.image.ray(row, col + 1), true)?
        } else {
            axis(self.image.ray(row, col - 1), false)?
        };
        let axis_row = if row + 1 < rows {
            axis(self.image.ray(row + 1, col), true)?
        } else {
            axis(self.image.ray(row - 1, col), false)?
        };

        let delta = query - origin;
        if delta.norm() > MAX_CELL_DISTANCE * axis_row.norm().max(axis_col.norm()) {
            return None;
        }
        let fraction = |basis: &Vector3<f64>| {
            let len2 = basis.norm_squared();
            if len2 > 0.0 { delta.dot(basis) / len2 } else { 0.0 }
        };
        let lut_row = row as f64 + fraction(&axis_row);
        let lut_col = col as f64 + fraction(&axis_col);

        let inside = |v: f64, n: usize| v >= -0.5 && v <= n as f64 - 0.5;
        if !inside(lut_row, rows) || !inside(lut_col, cols) {
            return None;
        }
        let nearest = |v: f64, n: usize| (v.round().max(0.0) as usize).min(n - 1);
        if !self.mask[nearest(lut_row, rows) * cols + nearest(lut_col, cols)] {
            return None;
        }

        let [r, c] = self.lut_to_img_pixel([lut_row, lut_col]);
        Some(Vector2::new(r, c))
    }

    fn valid_cols(&self, row: usize) -> Vec<usize> {
        let cols = self.image.cols();
        (0..cols).filter(|c| self.mask[row * cols + c]).collect()
    }

    /// Traces the outline of the valid region as a closed ring of unit rays.
    ///
    /// The walk runs clockwise: along the top valid row, down the right edge,
    /// back along the bottom valid row and up the left edge.
    pub fn boundary_ring(
        &self,
        max_edge_angle_deg: f64,
    ) -> Result<Vec<Vector3<f64>>, CameraModelError> {
        crate::require_positive("maximal edge angle", max_edge_angle_deg)?;
        let rows = self.image.rows();

        let top = (0..rows)
            .find(|r| !self.valid_cols(*r).is_empty())
            .ok_or_else(|| CameraModelError::InvalidLut("LUT has no valid rays".to_string()))?;
        let bottom = (top + 1..rows)
            .find(|r| self.valid_cols(*r).is_empty())
            .map_or(rows - 1, |r| r - 1);
        if bottom == top {
            return Err(CameraModelError::InvalidLut(
                "valid LUT region spans a single row".to_string(),
            ));
        }

        let ray = |r: usize, c: usize| self.image.ray(r, c);
        let top_cols = self.valid_cols(top);
        let mut builder = RingBuilder::new(ray(top, top_cols[0]), max_edge_angle_deg);
        for (i, c) in top_cols.iter().enumerate().skip(1) {
            builder.offer(ray(top, *c), i + 1 == top_cols.len());
        }

        let mut left_cols = Vec::with_capacity(bottom - top);
        for r in top + 1..bottom {
            let cols = self.valid_cols(r);
            left_cols.push((r, cols[0]));
            builder.offer(ray(r, cols[cols.len() - 1]), false);
        }

        let bottom_cols = self.valid_cols(bottom);
        for (i, c) in bottom_cols.iter().enumerate().rev() {
            let force = i == 0 || i + 1 == bottom_cols.len();
            builder.offer(ray(bottom, *c), force);
        }

        for (r, c) in left_cols.into_iter().rev() {
            builder.offer(ray(r, c), false);
        }
        Ok(builder.finish())
    }

    /// Builds the frustum mesh enclosing every valid ray of the table.
    pub fn frustum_mesh(&self, config: &FrustumConfig) -> Result<FrustumMesh, CameraModelError> {
        let ring = self.boundary_ring(config.max_edge_angle_deg)?;
        let mesh = build_frustum(&ring, config.ray_length, config.surface_step_deg)?;
        debug!(
            ring_len = mesh.ring_len,
            vertices = mesh.vertices.len(),
            faces = mesh.faces.len(),
            "frustum mesh built"
        );
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::angle_between_deg;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// Pinhole LUT with the principal point at the sensor centre.
    fn pinhole_lut_image(rows: usize, cols: usize, focal: f64) -> RayImage {
        let mut img = RayImage::zeros(rows, cols, 3);
        for r in 0..rows {
            for c in 0..cols {
                let x = (c as f64 + 0.5 - cols as f64 / 2.0) / focal;
                let y = (rows as f64 / 2.0 - r as f64 - 0.5) / focal;
                img.set_ray(r, c, &Vector3::new(x, y, -1.0).normalize());
            }
        }
        img
    }

    #[test]
    fn test_rejects_invalid_input() {
        let two_channels = RayImage::zeros(4, 4, 2);
        assert!(RayDirectionLut::from_image(&two_channels, &LutConfig::new()).is_err());

        let empty = RayImage::zeros(4, 4, 3);
        assert!(RayDirectionLut::from_image(&empty, &LutConfig::new()).is_err());

        let img = pinhole_lut_image(11, 11, 10.0);
        let config = LutConfig::new().with_super_sampling(2);
        assert!(RayDirectionLut::from_image(&img, &config).is_err());
    }

    #[test]
    fn test_pixel_conversions() -> TestResult {
        let img = pinhole_lut_image(2 * 20 + 2, 2 * 30 + 2, 40.0);
        let config = LutConfig::new().with_border(1).with_super_sampling(2);
        let lut = RayDirectionLut::from_image(&img, &config)?;
        assert_eq!(lut.img_pixel_count_rc(), [20, 30]);

        // first interior cell covers the left half of image pixel 0
        assert!((lut.lut_to_img_pixel_value(1.0) + 0.25).abs() < 1e-12);
        for v in [-0.5, 0.0, 3.25, 19.0] {
            let back = lut.lut_to_img_pixel_value(lut.img_to_lut_pixel_value(v));
            assert!((back - v).abs() < 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_render_quantities() -> TestResult {
        let lut = RayDirectionLut::from_image(&pinhole_lut_image(100, 100, 50.0), &LutConfig::new())?;
        assert_eq!(lut.img_center_rc(), [49.5, 49.5]);
        assert_eq!(lut.max_radial_angle_deg(), 55.0);
        assert_eq!(lut.render_center_pixel(), 72);
        assert_eq!(lut.render_pixel_count(), 145);
        assert_eq!(lut.render_pixel_count() % 2, 1);
        assert_eq!(lut.render_img_range_col(), [23, 122]);

        let crop = lut.render_crop();
        assert!((crop.right - crop.left - 100.0 / 145.0).abs() < 1e-12);
        assert!((crop.top - crop.bottom - 100.0 / 145.0).abs() < 1e-12);
        let shift = lut.cam_shift_xy();
        assert!((shift[0] + 0.5 / 145.0).abs() < 1e-12);
        assert!((shift[1] - 0.5 / 145.0).abs() < 1e-12);

        // no cell lies on the horizontal axis, the extreme sits half a row off
        let edge = (49.5_f64 / 50.0).atan().to_degrees();
        assert!((lut.lut_angle_range_x_deg()[1] - edge).abs() < 1e-2);
        assert!((lut.lut_fov_deg()[0] - 2.0 * edge).abs() < 2e-2);
        Ok(())
    }

    #[test]
    fn test_optical_axis_maps_to_center() -> TestResult {
        let lut = RayDirectionLut::from_image(&pinhole_lut_image(100, 100, 50.0), &LutConfig::new())?;
        let (pix, valid) = lut.ray_dirs_to_pixels_rc(&[Vector3::new(0.0, 0.0, -1.0)], false);
        assert!(valid[0]);
        assert!((pix[0] - Vector2::new(49.5, 49.5)).norm() < 1e-2);

        let (_, valid) = lut.ray_dirs_to_pixels_rc(&[Vector3::new(1.0, 0.0, 0.0)], false);
        assert!(!valid[0]);
        Ok(())
    }

    #[test]
    fn test_stored_rays_map_to_own_cell() -> TestResult {
        let img = pinhole_lut_image(2 * 12 + 2, 2 * 16 + 2, 20.0);
        let config = LutConfig::new().with_border(1).with_super_sampling(2);
        let lut = RayDirectionLut::from_image(&img, &config)?;
        let rays = lut.lut_image().rays();
        let (pix, valid) = lut.ray_dirs_to_pixels_rc(&rays, false);
        let cols = img.cols();
        for (i, (p, v)) in pix.iter().zip(valid).enumerate() {
            assert!(v);
            let [r, c] = lut.lut_to_img_pixel([(i / cols) as f64, (i % cols) as f64]);
            assert!((p.x - r).abs() <= 0.5 / 2.0 && (p.y - c).abs() <= 0.5 / 2.0);
        }
        Ok(())
    }

    #[test]
    fn test_zero_rays_are_invalid() -> TestResult {
        let mut img = pinhole_lut_image(100, 100, 50.0);
        for r in 0..100 {
            for c in 0..100 {
                if (r as f64 - 49.5).hypot(c as f64 - 49.5) < 5.0 {
                    img.set_ray(r, c, &Vector3::zeros());
                }
            }
        }
        let lut = RayDirectionLut::from_image(&img, &LutConfig::new())?;
        let queries = vec![Vector3::new(0.0, 0.0, -1.0); 8];
        let (_, valid) = lut.ray_dirs_to_pixels_rc(&queries, true);
        assert!(valid.iter().all(|v| !v));

        let (_, valid) = lut.ray_dirs_to_pixels_rc(&[Vector3::zeros()], false);
        assert!(!valid[0]);
        Ok(())
    }

    #[test]
    fn test_non_finite_queries_are_invalid() -> TestResult {
        let lut = RayDirectionLut::from_image(&pinhole_lut_image(10, 10, 5.0), &LutConfig::new())?;
        let queries = [
            Vector3::new(f64::NAN, 0.0, -1.0),
            Vector3::new(0.0, f64::INFINITY, -1.0),
            Vector3::new(0.0, 0.0, f64::NEG_INFINITY),
            Vector3::new(f64::NAN, f64::NAN, f64::NAN),
            Vector3::new(0.1, f64::NAN, -1.0),
        ];
        for normalize in [true, false] {
            let (pix, valid) = lut.ray_dirs_to_pixels_rc(&queries, normalize);
            assert_eq!(pix.len(), queries.len());
            assert!(valid.iter().all(|v| !v));
            assert!(pix.iter().all(|p| *p == Vector2::zeros()));

            let (_, valid) = lut.ray_dirs_to_pixels_rc(&queries[..2], normalize);
            assert_eq!(valid, [false, false]);
        }

        let (pix, valid) = lut.ray_dirs_to_pixels_rc(&[], true);
        assert!(pix.is_empty() && valid.is_empty());
        Ok(())
    }

    #[test]
    fn test_boundary_ring() -> TestResult {
        let lut = RayDirectionLut::from_image(&pinhole_lut_image(60, 80, 40.0), &LutConfig::new())?;
        let ring = lut.boundary_ring(3.0)?;
        assert!(ring.len() >= 4);
        for pair in ring.windows(2) {
            assert!(angle_between_deg(&pair[0], &pair[1]) <= 3.0 + 1e-9);
        }
        let rays = lut.lut_image().rays();
        for r in &ring {
            let idx = rays
                .iter()
                .position(|s| (s - r).norm() < 1e-12)
                .ok_or("ring ray not found in LUT")?;
            let (row, col) = (idx / 80, idx % 80);
            assert!(row == 0 || row == 59 || col == 0 || col == 79);
        }
        Ok(())
    }

    #[test]
    fn test_frustum_mesh() -> TestResult {
        let lut = RayDirectionLut::from_image(&pinhole_lut_image(60, 80, 40.0), &LutConfig::new())?;
        let config = FrustumConfig::new(5.0).with_max_edge_angle(2.0);
        let mesh = lut.frustum_mesh(&config)?;
        assert_eq!(mesh.vertices[0], Vector3::zeros());
        assert!(mesh.faces.iter().flatten().all(|&i| i < mesh.vertices.len()));
        for v in &mesh.vertices[1..] {
            assert!((v.norm() - 5.0).abs() < 1e-9);
        }

        let single_row = pinhole_lut_image(1, 20, 10.0);
        let lut = RayDirectionLut::from_image(&single_row, &LutConfig::new())?;
        assert!(lut.frustum_mesh(&config).is_err());
        Ok(())
    }
}
