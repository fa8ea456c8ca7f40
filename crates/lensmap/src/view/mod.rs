//! Camera views
//!
//! A camera view combines a lens model with a placement in the world and
//! projects world points onto its image. Five variants exist:
//!
//! - [`PinholeView`]: rectilinear projection with a fixed focal length
//! - [`EquidistantView`]: fisheye with a constant number of pixels per degree
//! - [`EquirectangularView`]: longitude/latitude panorama
//! - [`PolynomialFisheyeView`]: fisheye with a radial angle polynomial
//! - [`LutView`]: lens sampled as a per-pixel ray-direction table
//!
//! # Field of View
//!
//! All views share the same FOV bookkeeping ([`FovState`]):
//!
//! 1. An explicit FOV range defines the maximal half angle as its largest
//!    absolute endpoint, a symmetric FOV defines the ranges. A maximal FOV
//!    clamps all ranges.
//! 2. A missing FOV axis is derived from the pixel aspect ratio.
//! 3. Optical and pixel aspect ratios are reconciled, either by expanding
//!    the narrower axis (square pixels) or through aspect correction factors.
//! 4. Pixels per degree follow from pixel count and FOV.
//!
//! Steps 2 and 3 are variant specific.
//!
//! # Image Coordinates
//!
//! Projected pixel positions have their origin at the top-left image corner,
//! x pointing right and y pointing down.

use crate::config::{CameraFrame, CameraViewSummary, FovExtent, FovSpec, ViewDetails};
use crate::error::{LensmapError, LensmapResult};
use nalgebra::{Vector2, Vector3};

pub mod equidistant;
pub mod equirectangular;
pub mod lut;
pub mod pinhole;
pub mod polynomial;

pub use equidistant::EquidistantView;
pub use equirectangular::EquirectangularView;
pub use lut::LutView;
pub use pinhole::PinholeView;
pub use polynomial::PolynomialFisheyeView;

/// FOV components at or below this value count as missing.
pub(crate) const ZERO_FOV_DEG: f64 = 0.01;

/// Projected pixel positions with per-point flags.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageProjection {
    /// Pixel positions, origin top-left, y down.
    pub pixels: Vec<Vector2<f64>>,
    /// Point lies within the view's angular range.
    pub in_front: Vec<bool>,
    /// Point lands on the image.
    pub in_image: Vec<bool>,
}

impl ImageProjection {
    pub(crate) fn with_capacity(n: usize) -> Self {
        Self {
            pixels: Vec::with_capacity(n),
            in_front: Vec::with_capacity(n),
            in_image: Vec::with_capacity(n),
        }
    }

    pub(crate) fn push(&mut self, pixel: Vector2<f64>, in_front: bool, in_image: bool) {
        self.pixels.push(pixel);
        self.in_front.push(in_front);
        self.in_image.push(in_front && in_image);
    }
}

/// Pixel lies on an image of `pixel_count` pixels after rounding.
pub(crate) fn on_image(pixel: &Vector2<f64>, pixel_count: [usize; 2]) -> bool {
    let (x, y) = (pixel.x.round(), pixel.y.round());
    x >= 0.0 && x < pixel_count[0] as f64 && y >= 0.0 && y < pixel_count[1] as f64
}

/// FOV bookkeeping shared by all views.
#[derive(Debug, Clone, PartialEq)]
pub struct FovState {
    pub(crate) pixel_count: [usize; 2],
    pub(crate) pixel_size_um: f64,
    pub(crate) fov_max_deg: f64,
    pub(crate) max_angle_deg: f64,
    pub(crate) fov_deg: [f64; 2],
    pub(crate) fov_range_deg: [[f64; 2]; 2],
    pub(crate) fov_center_deg: [f64; 2],
    pub(crate) ensure_square_pixel: bool,
    /// Ny / Nx
    pub(crate) pixel_aspect_yx: f64,
    pub(crate) fov_aspect_yx: f64,
    pub(crate) sensor_size_mm: [f64; 2],
    pub(crate) aspect: [f64; 2],
    pub(crate) pixels_per_deg: [f64; 2],
}

impl FovState {
    /// Resolves the FOV ranges of a spec (step 1).
    fn from_spec(spec: &FovSpec) -> LensmapResult<Self> {
        spec.validate()?;
        let pixel_count = spec.pixel_count;
        let pixel_size_mm = spec.pixel_size_um * 1e-3;

        let (fov_max_deg, max_angle_deg, fov_deg, fov_range_deg, fov_center_deg) = match &spec.fov
        {
            FovExtent::Symmetric(fov) => {
                let mut fov = fov.map(f64::abs);
                let fov_max = match spec.fov_max_deg {
                    None => fov[0].max(fov[1]),
                    Some(fov_max) => {
                        fov = fov.map(|v| v.min(fov_max));
                        fov_max
                    }
                };
                let ranges = [
                    [-fov[0] / 2.0, fov[0] / 2.0],
                    [-fov[1] / 2.0, fov[1] / 2.0],
                ];
                (fov_max, fov_max / 2.0, fov, ranges, [0.0, 0.0])
            }
            FovExtent::Range(range) => {
                let mut ranges = *range;
                let mut max_angle = ranges.iter().flatten().fold(0.0_f64, |m, v| m.max(v.abs()));
                let fov_max = match spec.fov_max_deg {
                    None => 2.0 * max_angle,
                    Some(fov_max) => {
                        if max_angle > fov_max / 2.0 {
                            max_angle = fov_max / 2.0;
                            for v in ranges.iter_mut().flatten() {
                                *v = v.clamp(-max_angle, max_angle);
                            }
                        }
                        fov_max
                    }
                };
                let fov = [
                    (ranges[0][1] - ranges[0][0]).abs(),
                    (ranges[1][1] - ranges[1][0]).abs(),
                ];
                let center = [ranges[0][0] + fov[0] / 2.0, ranges[1][0] + fov[1] / 2.0];
                (fov_max, max_angle, fov, ranges, center)
            }
        };

        Ok(Self {
            pixel_count,
            pixel_size_um: spec.pixel_size_um,
            fov_max_deg,
            max_angle_deg,
            fov_deg,
            fov_range_deg,
            fov_center_deg,
            ensure_square_pixel: spec.ensure_square_pixel,
            pixel_aspect_yx: pixel_count[1] as f64 / pixel_count[0] as f64,
            fov_aspect_yx: 0.0,
            sensor_size_mm: [
                pixel_count[0] as f64 * pixel_size_mm,
                pixel_count[1] as f64 * pixel_size_mm,
            ],
            aspect: [0.0, 0.0],
            pixels_per_deg: [0.0, 0.0],
        })
    }

    /// Runs the full FOV resolution with the variant's hooks.
    pub(crate) fn resolve<A: FovAdjust>(spec: &FovSpec, hooks: &mut A) -> LensmapResult<Self> {
        let mut fov = Self::from_spec(spec)?;
        hooks.adjust_fov(&mut fov)?;
        fov.fov_aspect_yx = fov.fov_deg[1] / fov.fov_deg[0];
        hooks.adjust_aspect(&mut fov);
        fov.update_pixels_per_deg();
        Ok(fov)
    }

    pub(crate) fn update_pixels_per_deg(&mut self) {
        self.pixels_per_deg = [
            self.pixel_count[0] as f64 / self.fov_deg[0],
            self.pixel_count[1] as f64 / self.fov_deg[1],
        ];
    }

    /// Fills a missing FOV axis from the pixel aspect ratio, keeping the
    /// range centred on the optical axis.
    pub(crate) fn derive_missing_axis(&mut self) -> LensmapResult<()> {
        let missing = [self.fov_deg[0] <= ZERO_FOV_DEG, self.fov_deg[1] <= ZERO_FOV_DEG];
        match missing {
            [true, true] => {
                return Err(LensmapError::InvalidConfig(
                    "zero field of view given".to_string(),
                ));
            }
            [true, false] => {
                self.fov_deg[0] = self.fov_deg[1] / self.pixel_aspect_yx;
                self.fov_range_deg[0] = [-self.fov_deg[0] / 2.0, self.fov_deg[0] / 2.0];
            }
            [false, true] => {
                self.fov_deg[1] = self.fov_deg[0] * self.pixel_aspect_yx;
                self.fov_range_deg[1] = [-self.fov_deg[1] / 2.0, self.fov_deg[1] / 2.0];
            }
            [false, false] => {}
        }
        Ok(())
    }

    /// Expands the narrower FOV axis to the pixel aspect ratio. The expanded
    /// range stays centred on its previous centre.
    pub(crate) fn expand_to_square_pixels(&mut self) {
        if (self.fov_aspect_yx - self.pixel_aspect_yx).abs() > f64::EPSILON {
            let axis = if self.fov_deg[0] >= self.fov_deg[1] {
                self.fov_deg[1] = self.fov_deg[0] * self.pixel_aspect_yx;
                1
            } else {
                self.fov_deg[0] = self.fov_deg[1] / self.pixel_aspect_yx;
                0
            };
            let half = self.fov_deg[axis] / 2.0;
            let center = self.fov_center_deg[axis];
            self.fov_range_deg[axis] = [center - half, center + half];
            self.fov_aspect_yx = self.pixel_aspect_yx;
        }
        self.aspect = [1.0, 1.0];
    }

    /// Aspect correction factors for a square-pixel renderer reproducing
    /// a FOV with aspect ratio `optical_aspect_yx`.
    pub(crate) fn aspect_correction(&mut self, optical_aspect_yx: f64) {
        let value = self.pixel_aspect_yx / optical_aspect_yx;
        self.aspect = if value >= 1.0 {
            [value, 1.0]
        } else {
            [1.0, 1.0 / value]
        };
    }

    pub fn pixel_count(&self) -> [usize; 2] {
        self.pixel_count
    }

    pub fn pixel_size_um(&self) -> f64 {
        self.pixel_size_um
    }

    pub fn pixel_size_mm(&self) -> f64 {
        self.pixel_size_um * 1e-3
    }

    /// Maximal full FOV in degrees.
    pub fn fov_max_deg(&self) -> f64 {
        self.fov_max_deg
    }

    /// Maximal angle to the optical axis in degrees.
    pub fn max_angle_deg(&self) -> f64 {
        self.max_angle_deg
    }

    pub fn fov_deg(&self) -> [f64; 2] {
        self.fov_deg
    }

    pub fn fov_range_deg(&self) -> [[f64; 2]; 2] {
        self.fov_range_deg
    }

    pub fn fov_center_deg(&self) -> [f64; 2] {
        self.fov_center_deg
    }

    /// Aspect correction factors (x, y).
    pub fn aspect(&self) -> [f64; 2] {
        self.aspect
    }

    pub fn pixels_per_deg(&self) -> [f64; 2] {
        self.pixels_per_deg
    }

    pub fn sensor_size_mm(&self) -> [f64; 2] {
        self.sensor_size_mm
    }
}

/// Variant-specific FOV reconciliation (steps 2 and 3).
pub(crate) trait FovAdjust {
    fn adjust_fov(&mut self, fov: &mut FovState) -> LensmapResult<()>;
    fn adjust_aspect(&mut self, fov: &mut FovState);
}

/// Common interface of all camera views.
pub trait CameraView {
    fn fov(&self) -> &FovState;

    fn frame(&self) -> &CameraFrame;

    /// Projects points given in the camera frame.
    fn project_local(&self, local: &[Vector3<f64>]) -> ImageProjection;

    fn details(&self) -> ViewDetails;

    /// Transforms world points into the camera frame.
    fn points_to_camera_frame(&self, points: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        self.frame().points_to_camera_frame(points)
    }

    /// Rotates world directions into the camera frame.
    fn dirs_to_camera_frame(&self, dirs: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        self.frame().dirs_to_camera_frame(dirs)
    }

    /// Projects world points with separate in-front and in-image flags.
    fn project_to_image_detailed(&self, points: &[Vector3<f64>]) -> ImageProjection {
        self.project_local(&self.points_to_camera_frame(points))
    }

    /// Projects world points to pixel positions and in-image flags.
    fn project_to_image(&self, points: &[Vector3<f64>]) -> (Vec<Vector2<f64>>, Vec<bool>) {
        let projection = self.project_to_image_detailed(points);
        (projection.pixels, projection.in_image)
    }

    fn summary(&self) -> CameraViewSummary {
        let fov = self.fov();
        let frame = self.frame();
        CameraViewSummary {
            pixel_count: fov.pixel_count,
            pixel_size_um: fov.pixel_size_um,
            aspect: fov.aspect,
            fov_max_deg: fov.fov_max_deg,
            fov_center_deg: fov.fov_center_deg,
            fov_deg: fov.fov_deg,
            fov_range_deg: fov.fov_range_deg,
            axes: frame.axes,
            origin_m: frame.origin,
            details: self.details(),
        }
    }
}

/// Any of the camera view variants.
#[derive(Debug, Clone)]
pub enum AnyCameraView {
    Pinhole(PinholeView),
    Equidistant(EquidistantView),
    Equirectangular(EquirectangularView),
    PolynomialFisheye(PolynomialFisheyeView),
    Lut(LutView),
}

impl AnyCameraView {
    fn inner(&self) -> &dyn CameraView {
        match self {
            AnyCameraView::Pinhole(view) => view,
            AnyCameraView::Equidistant(view) => view,
            AnyCameraView::Equirectangular(view) => view,
            AnyCameraView::PolynomialFisheye(view) => view,
            AnyCameraView::Lut(view) => view,
        }
    }
}

impl CameraView for AnyCameraView {
    fn fov(&self) -> &FovState {
        self.inner().fov()
    }

    fn frame(&self) -> &CameraFrame {
        self.inner().frame()
    }

    fn project_local(&self, local: &[Vector3<f64>]) -> ImageProjection {
        self.inner().project_local(local)
    }

    fn details(&self) -> ViewDetails {
        self.inner().details()
    }
}

impl From<PinholeView> for AnyCameraView {
    fn from(view: PinholeView) -> Self {
        AnyCameraView::Pinhole(view)
    }
}

impl From<EquidistantView> for AnyCameraView {
    fn from(view: EquidistantView) -> Self {
        AnyCameraView::Equidistant(view)
    }
}

impl From<EquirectangularView> for AnyCameraView {
    fn from(view: EquirectangularView) -> Self {
        AnyCameraView::Equirectangular(view)
    }
}

impl From<PolynomialFisheyeView> for AnyCameraView {
    fn from(view: PolynomialFisheyeView) -> Self {
        AnyCameraView::PolynomialFisheye(view)
    }
}

impl From<LutView> for AnyCameraView {
    fn from(view: LutView) -> Self {
        AnyCameraView::Lut(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// Hooks that only derive a missing axis.
    struct PlainHooks;

    impl FovAdjust for PlainHooks {
        fn adjust_fov(&mut self, fov: &mut FovState) -> LensmapResult<()> {
            fov.derive_missing_axis()
        }

        fn adjust_aspect(&mut self, fov: &mut FovState) {
            fov.aspect = [1.0, 1.0];
        }
    }

    #[test]
    fn test_symmetric_fov_resolution() -> TestResult {
        let spec = FovSpec::symmetric([200, 100], 5.0, [90.0, 0.0]);
        let fov = FovState::resolve(&spec, &mut PlainHooks)?;
        assert_eq!(fov.fov_max_deg(), 90.0);
        assert_eq!(fov.max_angle_deg(), 45.0);
        assert_eq!(fov.fov_deg(), [90.0, 45.0]);
        assert_eq!(fov.fov_range_deg(), [[-45.0, 45.0], [-22.5, 22.5]]);
        assert_eq!(fov.pixels_per_deg(), [200.0 / 90.0, 100.0 / 45.0]);
        let size = fov.sensor_size_mm();
        assert!((size[0] - 1.0).abs() < 1e-12 && (size[1] - 0.5).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_symmetric_fov_clamped_by_max() -> TestResult {
        let spec = FovSpec::symmetric([100, 100], 5.0, [120.0, 80.0]).with_fov_max(100.0);
        let fov = FovState::resolve(&spec, &mut PlainHooks)?;
        assert_eq!(fov.fov_deg(), [100.0, 80.0]);
        assert_eq!(fov.max_angle_deg(), 50.0);
        Ok(())
    }

    #[test]
    fn test_range_fov_resolution() -> TestResult {
        let spec = FovSpec::new([100, 100], 5.0, FovExtent::Range([[-70.0, 30.0], [-10.0, 50.0]]))
            .with_fov_max(120.0);
        let fov = FovState::resolve(&spec, &mut PlainHooks)?;
        assert_eq!(fov.max_angle_deg(), 60.0);
        assert_eq!(fov.fov_range_deg(), [[-60.0, 30.0], [-10.0, 50.0]]);
        assert_eq!(fov.fov_deg(), [90.0, 60.0]);
        assert_eq!(fov.fov_center_deg(), [-15.0, 20.0]);
        assert_eq!(fov.fov_max_deg(), 120.0);

        let spec = FovSpec::new([100, 100], 5.0, FovExtent::Range([[-20.0, 30.0], [-10.0, 10.0]]));
        let fov = FovState::resolve(&spec, &mut PlainHooks)?;
        assert_eq!(fov.fov_max_deg(), 60.0);
        Ok(())
    }

    #[test]
    fn test_zero_fov_is_rejected() {
        let spec = FovSpec::symmetric([100, 100], 5.0, [0.0, 0.0]);
        let result = FovState::resolve(&spec, &mut PlainHooks);
        assert!(matches!(result, Err(LensmapError::InvalidConfig(_))));
    }

    #[test]
    fn test_square_pixel_expansion() -> TestResult {
        let spec = FovSpec::symmetric([200, 100], 5.0, [80.0, 60.0]);
        let mut fov = FovState::from_spec(&spec)?;
        fov.fov_aspect_yx = 60.0 / 80.0;
        fov.expand_to_square_pixels();
        assert_eq!(fov.fov_deg(), [80.0, 40.0]);
        assert_eq!(fov.fov_range_deg()[1], [-20.0, 20.0]);
        assert_eq!(fov.aspect(), [1.0, 1.0]);

        let spec = FovSpec::symmetric([200, 100], 5.0, [40.0, 60.0]);
        let mut fov = FovState::from_spec(&spec)?;
        fov.fov_aspect_yx = 60.0 / 40.0;
        fov.expand_to_square_pixels();
        assert_eq!(fov.fov_deg(), [120.0, 60.0]);
        assert_eq!(fov.fov_range_deg()[0], [-60.0, 60.0]);
        Ok(())
    }

    #[test]
    fn test_aspect_correction() -> TestResult {
        let spec = FovSpec::symmetric([200, 100], 5.0, [60.0, 60.0]);
        let mut fov = FovState::from_spec(&spec)?;
        fov.aspect_correction(1.0);
        assert_eq!(fov.aspect(), [1.0, 2.0]);
        fov.aspect_correction(0.25);
        assert_eq!(fov.aspect(), [2.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_on_image() {
        assert!(on_image(&Vector2::new(0.0, 0.0), [10, 5]));
        assert!(on_image(&Vector2::new(9.4, 4.4), [10, 5]));
        assert!(!on_image(&Vector2::new(9.6, 2.0), [10, 5]));
        assert!(!on_image(&Vector2::new(2.0, -0.6), [10, 5]));
    }
}
