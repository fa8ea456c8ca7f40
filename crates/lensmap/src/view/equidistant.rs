//! Equidistant fisheye view
//!
//! # Mathematical Model
//!
//! ```text
//! θ = atan2(√(x² + y²), -z)                   angle to the optical axis (deg)
//! (u, v) = unit(x, y) · θ · ppd - range_min · ppd
//! v ← Ny - v
//! ```
//!
//! The renderer renders a square canvas covering the maximal FOV, from which
//! the view's image is cropped ([`EquidistantView::eval_crop`]). Canvas and
//! image must have the same horizontal pixel parity so that the crop falls on
//! whole pixels.

use super::{CameraView, FovAdjust, FovState, ImageProjection, on_image};
use crate::config::{CameraFrame, FovSpec, ViewDetails};
use crate::error::LensmapResult;
use lensmap_camera_models::{MIN_RAY_NORM, RenderCrop};
use nalgebra::{Vector2, Vector3};
use tracing::debug;

struct EquidistantHooks;

impl FovAdjust for EquidistantHooks {
    fn adjust_fov(&mut self, fov: &mut FovState) -> LensmapResult<()> {
        fov.derive_missing_axis()
    }

    fn adjust_aspect(&mut self, fov: &mut FovState) {
        if fov.ensure_square_pixel {
            fov.expand_to_square_pixels();
        } else {
            fov.aspect_correction(fov.fov_aspect_yx);
        }
    }
}

/// Equidistant fisheye camera view.
#[derive(Debug, Clone, PartialEq)]
pub struct EquidistantView {
    fov: FovState,
    frame: CameraFrame,
    pixel_count_max: [usize; 2],
}

impl EquidistantView {
    pub fn new(spec: &FovSpec, frame: CameraFrame) -> LensmapResult<Self> {
        let mut fov = FovState::resolve(spec, &mut EquidistantHooks)?;
        let mut pixel_count_max =
            [0, 1].map(|i| (fov.pixels_per_deg[i] * fov.fov_max_deg).round() as usize);

        if pixel_count_max[0] % 2 != fov.pixel_count[0] % 2 {
            pixel_count_max[0] += 1;
            fov.fov_max_deg = pixel_count_max[0] as f64 / fov.pixels_per_deg[0];
            fov.max_angle_deg = fov.fov_max_deg / 2.0;
            debug!(
                pixel_count_max = pixel_count_max[0],
                fov_max_deg = fov.fov_max_deg,
                "canvas grown to match image parity"
            );
        }

        Ok(Self {
            fov,
            frame,
            pixel_count_max,
        })
    }

    /// Pixel count (x, y) of the square canvas covering the maximal FOV.
    pub fn pixel_count_max(&self) -> [usize; 2] {
        self.pixel_count_max
    }

    /// Normalised crop of the canvas that yields the view's image.
    pub fn eval_crop(&self) -> RenderCrop {
        let fov = &self.fov;
        let idx_min = [0, 1].map(|i| {
            ((fov.fov_center_deg[i] - fov.fov_deg[i] / 2.0) * fov.pixels_per_deg[i]
                + self.pixel_count_max[i] as f64 / 2.0)
                .round()
        });
        let max = self.pixel_count_max.map(|n| n as f64);
        RenderCrop {
            left: idx_min[0] / max[0],
            right: (idx_min[0] + fov.pixel_count[0] as f64) / max[0],
            bottom: idx_min[1] / max[1],
            top: (idx_min[1] + fov.pixel_count[1] as f64) / max[1],
        }
    }
}

impl CameraView for EquidistantView {
    fn fov(&self) -> &FovState {
        &self.fov
    }

    fn frame(&self) -> &CameraFrame {
        &self.frame
    }

    fn project_local(&self, local: &[Vector3<f64>]) -> ImageProjection {
        let ppd = self.fov.pixels_per_deg[0];
        let offset = Vector2::new(self.fov.fov_range_deg[0][0], self.fov.fov_range_deg[1][0]) * ppd;
        let height = self.fov.pixel_count[1] as f64;

        let mut projection = ImageProjection::with_capacity(local.len());
        for p in local {
            let Some(unit) = p.try_normalize(0.0) else {
                projection.push(Vector2::zeros(), false, false);
                continue;
            };
            let xy = unit.xy();
            let xy_len = xy.norm();
            let theta_deg = xy_len.atan2(-unit.z).to_degrees();
            let in_front = theta_deg <= self.fov.max_angle_deg;

            let dir = if xy_len >= MIN_RAY_NORM {
                xy / xy_len
            } else {
                Vector2::zeros()
            };
            let mut pixel = dir * (theta_deg * ppd) - offset;
            pixel.y = height - pixel.y;
            let inside = on_image(&pixel, self.fov.pixel_count);
            projection.push(pixel, in_front, inside);
        }
        projection
    }

    fn details(&self) -> ViewDetails {
        ViewDetails::Equidistant {
            pixel_count_max: self.pixel_count_max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_equidistant_layout() -> TestResult {
        let spec = FovSpec::symmetric([100, 80], 3.0, [90.0, 0.0]);
        let view = EquidistantView::new(&spec, CameraFrame::default())?;
        let fov = view.fov();
        assert!((fov.fov_deg()[1] - 72.0).abs() < 1e-12);
        assert_eq!(view.pixel_count_max(), [100, 100]);

        let crop = view.eval_crop();
        assert!(crop.left.abs() < 1e-12);
        assert!((crop.right - 1.0).abs() < 1e-12);
        assert!((crop.bottom - 0.1).abs() < 1e-12);
        assert!((crop.top - 0.9).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_canvas_parity_matches_image() -> TestResult {
        for width in [101_usize, 128, 333] {
            for fov_max in (100..140).map(f64::from) {
                let spec = FovSpec::symmetric([width, 80], 3.0, [90.0, 0.0]).with_fov_max(fov_max);
                let view = EquidistantView::new(&spec, CameraFrame::default())?;
                let canvas = view.pixel_count_max()[0];
                assert!(canvas >= width);
                assert_eq!((canvas - width) % 2, 0);
            }
        }
        Ok(())
    }

    #[test]
    fn test_equidistant_projection() -> TestResult {
        let spec = FovSpec::symmetric([100, 100], 3.0, [100.0, 100.0]);
        let view = EquidistantView::new(&spec, CameraFrame::default())?;
        let ppd = view.fov().pixels_per_deg()[0];

        let points = [
            Vector3::new(0.0, 0.0, -3.0),
            Vector3::new(1.0, 0.0, -1.0),
            Vector3::new(0.0, 1.0, -1.0),
            Vector3::new(0.0, 0.0, 2.0),
            Vector3::zeros(),
        ];
        let projection = view.project_to_image_detailed(&points);
        assert!((projection.pixels[0] - Vector2::new(50.0, 50.0)).norm() < 1e-9);
        assert!((projection.pixels[1] - Vector2::new(50.0 + 45.0 * ppd, 50.0)).norm() < 1e-9);
        assert!((projection.pixels[2] - Vector2::new(50.0, 50.0 - 45.0 * ppd)).norm() < 1e-9);
        assert_eq!(projection.in_front, vec![true, true, true, false, false]);
        assert_eq!(projection.in_image, vec![true, true, true, false, false]);
        Ok(())
    }
}
