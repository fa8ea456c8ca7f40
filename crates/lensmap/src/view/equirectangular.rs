//! Equirectangular panorama view
//!
//! Longitude maps linearly to x, latitude linearly to y:
//!
//! ```text
//! lon = atan2(x, -z)              lat = atan2(y, √(x² + z²))
//! u = (lon - lon_min) · ppd_x     v = Ny - (lat - lat_min) · ppd_y
//! ```
//!
//! Non-square pixels are a property of the projection, so no aspect
//! correction is applied.

use super::{CameraView, FovAdjust, FovState, ImageProjection, on_image};
use crate::config::{CameraFrame, FovSpec, ViewDetails};
use crate::error::LensmapResult;
use nalgebra::{Vector2, Vector3};

struct EquirectangularHooks;

impl FovAdjust for EquirectangularHooks {
    fn adjust_fov(&mut self, fov: &mut FovState) -> LensmapResult<()> {
        fov.derive_missing_axis()
    }

    fn adjust_aspect(&mut self, fov: &mut FovState) {
        if fov.ensure_square_pixel {
            fov.expand_to_square_pixels();
        } else {
            fov.aspect = [1.0, 1.0];
        }
    }
}

/// Equirectangular panoramic camera view.
#[derive(Debug, Clone, PartialEq)]
pub struct EquirectangularView {
    fov: FovState,
    frame: CameraFrame,
}

impl EquirectangularView {
    pub fn new(spec: &FovSpec, frame: CameraFrame) -> LensmapResult<Self> {
        let fov = FovState::resolve(spec, &mut EquirectangularHooks)?;
        Ok(Self { fov, frame })
    }
}

impl CameraView for EquirectangularView {
    fn fov(&self) -> &FovState {
        &self.fov
    }

    fn frame(&self) -> &CameraFrame {
        &self.frame
    }

    fn project_local(&self, local: &[Vector3<f64>]) -> ImageProjection {
        let [range_x, range_y] = self.fov.fov_range_deg;
        let [ppd_x, ppd_y] = self.fov.pixels_per_deg;
        let height = self.fov.pixel_count[1] as f64;

        let mut projection = ImageProjection::with_capacity(local.len());
        for p in local {
            if p.norm() == 0.0 {
                projection.push(Vector2::zeros(), false, false);
                continue;
            }
            let lon = p.x.atan2(-p.z).to_degrees();
            let lat = p.y.atan2(p.x.hypot(p.z)).to_degrees();
            let in_front =
                (range_x[0]..=range_x[1]).contains(&lon) && (range_y[0]..=range_y[1]).contains(&lat);
            let pixel = Vector2::new(
                (lon - range_x[0]) * ppd_x,
                height - (lat - range_y[0]) * ppd_y,
            );
            let inside = on_image(&pixel, self.fov.pixel_count);
            projection.push(pixel, in_front, inside);
        }
        projection
    }

    fn details(&self) -> ViewDetails {
        ViewDetails::Equirectangular
    }
}
