//! Lookup-table camera view
//!
//! Wraps a [`RayDirectionLut`]. The FOV is measured from the stored rays and
//! image positions come from the table's inverse projection, shifted from
//! pixel-centred to pixel-edge coordinates.

use super::{CameraView, FovAdjust, FovState, ImageProjection, ZERO_FOV_DEG};
use crate::config::{CameraFrame, FovExtent, FovSpec, ViewDetails};
use crate::error::{LensmapError, LensmapResult};
use lensmap_camera_models::{FrustumConfig, FrustumMesh, LutConfig, RayDirectionLut, RayImage};
use lensmap_io::LutLoader;
use nalgebra::{Vector2, Vector3};
use std::path::{Path, PathBuf};
use tracing::debug;

struct LutHooks;

impl FovAdjust for LutHooks {
    fn adjust_fov(&mut self, fov: &mut FovState) -> LensmapResult<()> {
        if fov.fov_deg.iter().any(|v| *v <= ZERO_FOV_DEG) {
            return Err(LensmapError::InvalidConfig(format!(
                "LUT spans a zero field of view {:?}",
                fov.fov_deg
            )));
        }
        Ok(())
    }

    fn adjust_aspect(&mut self, fov: &mut FovState) {
        fov.aspect = [1.0, 1.0];
    }
}

/// Camera view backed by a ray-direction lookup table.
#[derive(Debug, Clone)]
pub struct LutView {
    fov: FovState,
    frame: CameraFrame,
    lut: RayDirectionLut,
    file_path: Option<PathBuf>,
}

impl LutView {
    /// Creates the view from an in-memory ray image.
    pub fn from_image(image: &RayImage, config: &LutConfig, frame: CameraFrame) -> LensmapResult<Self> {
        let lut = RayDirectionLut::from_image(image, config)?;
        Self::from_lut(lut, frame, None)
    }

    /// Creates the view from a lookup table image file.
    pub fn from_file(
        path: impl AsRef<Path>,
        config: &LutConfig,
        frame: CameraFrame,
    ) -> LensmapResult<Self> {
        let path = path.as_ref();
        let lut = LutLoader::load_lut(path, config)?;
        Self::from_lut(lut, frame, Some(path.to_path_buf()))
    }

    fn from_lut(
        lut: RayDirectionLut,
        frame: CameraFrame,
        file_path: Option<PathBuf>,
    ) -> LensmapResult<Self> {
        let [rows, cols] = lut.img_pixel_count_rc();
        let spec = FovSpec::new(
            [cols, rows],
            1.0,
            FovExtent::Range([lut.lut_angle_range_x_deg(), lut.lut_angle_range_y_deg()]),
        )
        .with_fov_max(2.0 * lut.max_radial_angle_deg());
        let fov = FovState::resolve(&spec, &mut LutHooks)?;
        debug!(
            pixel_count = ?fov.pixel_count,
            fov_deg = ?fov.fov_deg,
            "LUT view initialised"
        );
        Ok(Self {
            fov,
            frame,
            lut,
            file_path,
        })
    }

    pub fn lut(&self) -> &RayDirectionLut {
        &self.lut
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn frustum_mesh(&self, config: &FrustumConfig) -> LensmapResult<FrustumMesh> {
        Ok(self.lut.frustum_mesh(config)?)
    }
}

impl CameraView for LutView {
    fn fov(&self) -> &FovState {
        &self.fov
    }

    fn frame(&self) -> &CameraFrame {
        &self.frame
    }

    fn project_local(&self, local: &[Vector3<f64>]) -> ImageProjection {
        let (pixels_rc, valid) = self.lut.ray_dirs_to_pixels_rc(local, true);
        let [width, height] = self.fov.pixel_count.map(|n| n as f64);
        let mut projection = ImageProjection::with_capacity(local.len());
        for (rc, valid) in pixels_rc.into_iter().zip(valid) {
            let pixel = Vector2::new(rc.y + 0.5, rc.x + 0.5);
            let inside = pixel.x > 0.0 && pixel.y > 0.0 && pixel.x < width && pixel.y < height;
            projection.push(pixel, valid && inside, valid && inside);
        }
        projection
    }

    fn details(&self) -> ViewDetails {
        ViewDetails::Lut {
            border: self.lut.border(),
            super_sampling: self.lut.super_sampling(),
            center_rc: self.lut.lut_center_rc(),
            file_path: self.file_path.as_ref().map(|p| p.display().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// Pinhole LUT, focal length in pixels, principal point at the centre.
    fn pinhole_image(rows: usize, cols: usize, focal: f64) -> RayImage {
        let mut image = RayImage::zeros(rows, cols, 3);
        for r in 0..rows {
            for c in 0..cols {
                let x = c as f64 + 0.5 - cols as f64 / 2.0;
                let y = rows as f64 / 2.0 - r as f64 - 0.5;
                image.set_ray(r, c, &Vector3::new(x, y, -focal).normalize());
            }
        }
        image
    }

    #[test]
    fn test_lut_view_fov() -> TestResult {
        let view = LutView::from_image(&pinhole_image(40, 60, 30.0), &LutConfig::new(), CameraFrame::default())?;
        let fov = view.fov();
        assert_eq!(fov.pixel_count(), [60, 40]);
        assert_eq!(fov.aspect(), [1.0, 1.0]);
        assert!(fov.fov_deg()[0] > fov.fov_deg()[1]);
        assert_eq!(fov.fov_max_deg(), 2.0 * view.lut().max_radial_angle_deg());
        assert!(view.file_path().is_none());
        Ok(())
    }

    #[test]
    fn test_lut_view_projection() -> TestResult {
        let view = LutView::from_image(&pinhole_image(40, 60, 30.0), &LutConfig::new(), CameraFrame::default())?;
        let points = [
            Vector3::new(0.0, 0.0, -4.0),
            Vector3::new(10.5, 0.0, -30.0),
            Vector3::new(0.0, 0.0, 4.0),
        ];
        let (pixels, valid) = view.project_to_image(&points);
        assert!((pixels[0] - Vector2::new(30.0, 20.0)).norm() < 1e-2);
        assert!((pixels[1] - Vector2::new(40.5, 20.0)).norm() < 1e-2);
        assert_eq!(valid, vec![true, true, false]);
        Ok(())
    }

    #[test]
    fn test_lut_view_summary() -> TestResult {
        let config = LutConfig::new().with_center_rc(19.5, 29.5);
        let view = LutView::from_image(&pinhole_image(40, 60, 30.0), &config, CameraFrame::default())?;
        match view.summary().details {
            ViewDetails::Lut {
                border,
                super_sampling,
                center_rc,
                file_path,
            } => {
                assert_eq!((border, super_sampling), (0, 1));
                assert_eq!(center_rc, [19.5, 29.5]);
                assert!(file_path.is_none());
            }
            other => panic!("unexpected details {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_lut_view_rejects_flat_lut() {
        let mut image = RayImage::zeros(10, 10, 3);
        for r in 0..10 {
            for c in 0..10 {
                image.set_ray(r, c, &Vector3::new(0.0, 0.0, -1.0));
            }
        }
        let result = LutView::from_image(&image, &LutConfig::new(), CameraFrame::default());
        assert!(matches!(result, Err(LensmapError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_lut_file() {
        let path = std::env::temp_dir().join("lensmap-missing-lut.exr");
        let result = LutView::from_file(&path, &LutConfig::new(), CameraFrame::default());
        assert!(matches!(result, Err(LensmapError::Io(_))));
    }
}
