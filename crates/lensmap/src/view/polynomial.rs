//! Polynomial fisheye view
//!
//! Wraps a [`PolynomialFisheyeModel`]. The model fixes the FOV, so the view
//! takes its angle ranges directly from the model and always renders square
//! pixels.

use super::{CameraView, FovState, ImageProjection, ZERO_FOV_DEG};
use crate::config::{CameraFrame, ViewDetails};
use crate::error::{LensmapError, LensmapResult};
use lensmap_camera_models::{
    FrustumConfig, FrustumMesh, LutConfig, PolynomialFisheyeModel, PolynomialSpec, RayDirectionLut,
};
use lensmap_io::LutLoader;
use nalgebra::Vector3;
use std::path::Path;
use tracing::debug;

/// Fisheye camera view described by a radial angle polynomial.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialFisheyeView {
    fov: FovState,
    frame: CameraFrame,
    model: PolynomialFisheyeModel,
}

impl PolynomialFisheyeView {
    /// Creates the view from known polynomial coefficients.
    pub fn from_coefficients(spec: &PolynomialSpec, frame: CameraFrame) -> LensmapResult<Self> {
        let model = PolynomialFisheyeModel::from_coefficients(spec)?;
        Self::from_model(model, frame)
    }

    /// Creates the view by fitting the polynomial to a lookup table.
    pub fn from_lut(
        pixel_count: [usize; 2],
        pixel_size_um: f64,
        lut: &RayDirectionLut,
        fov_max_deg: Option<f64>,
        frame: CameraFrame,
    ) -> LensmapResult<Self> {
        let model = PolynomialFisheyeModel::from_lut(pixel_count, pixel_size_um, lut, fov_max_deg)?;
        Self::from_model(model, frame)
    }

    /// Creates the view by fitting the polynomial to a lookup table file.
    pub fn from_lut_file(
        pixel_count: [usize; 2],
        pixel_size_um: f64,
        path: impl AsRef<Path>,
        lut_config: &LutConfig,
        fov_max_deg: Option<f64>,
        frame: CameraFrame,
    ) -> LensmapResult<Self> {
        let lut = LutLoader::load_lut(path, lut_config)?;
        Self::from_lut(pixel_count, pixel_size_um, &lut, fov_max_deg, frame)
    }

    pub fn from_model(model: PolynomialFisheyeModel, frame: CameraFrame) -> LensmapResult<Self> {
        let fov_deg = model.fov_deg();
        if fov_deg.iter().any(|v| *v <= ZERO_FOV_DEG) {
            return Err(LensmapError::InvalidConfig(format!(
                "polynomial lens yields a zero field of view {fov_deg:?}"
            )));
        }
        let fov_range_deg = [model.angle_range_x_deg(), model.angle_range_y_deg()];
        let pixel_count = model.pixel_count();
        let sensor_size = model.sensor_size_mm();

        let mut fov = FovState {
            pixel_count,
            pixel_size_um: model.pixel_size_mm() * 1e3,
            fov_max_deg: model.fov_max_deg(),
            max_angle_deg: model.max_radial_angle_deg(),
            fov_deg,
            fov_range_deg,
            fov_center_deg: [0, 1].map(|i| fov_range_deg[i][0] + fov_deg[i] / 2.0),
            ensure_square_pixel: true,
            pixel_aspect_yx: 1.0,
            fov_aspect_yx: fov_deg[1] / fov_deg[0],
            sensor_size_mm: [sensor_size.x, sensor_size.y],
            aspect: [1.0, 1.0],
            pixels_per_deg: [0.0, 0.0],
        };
        fov.update_pixels_per_deg();
        debug!(
            fov_deg = ?fov.fov_deg,
            max_angle_deg = fov.max_angle_deg,
            "polynomial fisheye view initialised"
        );
        Ok(Self { fov, frame, model })
    }

    pub fn model(&self) -> &PolynomialFisheyeModel {
        &self.model
    }

    /// Principal point shift relative to the sensor centre as a fraction of
    /// the sensor size.
    pub fn principal_point_shift(&self) -> [f64; 2] {
        let offset = self.model.center_offset_mm();
        let size = self.model.sensor_size_mm();
        [-offset.x / size.x, -offset.y / size.y]
    }

    pub fn frustum_mesh(&self, config: &FrustumConfig) -> LensmapResult<FrustumMesh> {
        Ok(self.model.frustum_mesh(config)?)
    }
}

impl CameraView for PolynomialFisheyeView {
    fn fov(&self) -> &FovState {
        &self.fov
    }

    fn frame(&self) -> &CameraFrame {
        &self.frame
    }

    fn project_local(&self, local: &[Vector3<f64>]) -> ImageProjection {
        let (pixels, valid) = self.model.ray_dirs_to_pixels_xy(local, false, true);
        let height = self.fov.pixel_count[1] as f64;
        let mut projection = ImageProjection::with_capacity(local.len());
        for (mut pixel, valid) in pixels.into_iter().zip(valid) {
            pixel.y = height - pixel.y;
            projection.push(pixel, valid, valid);
        }
        projection
    }

    fn details(&self) -> ViewDetails {
        let offset = self.model.center_offset_mm();
        ViewDetails::PolynomialFisheye {
            coefficients: self.model.coefficients(),
            center_offset_mm: [offset.x, offset.y],
        }
    }
}
