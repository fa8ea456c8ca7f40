//! # lensmap
//!
//! Bidirectional mappings between 3D viewing rays and sensor pixels for
//! simulated cameras.
//!
//! ## Crate Layout
//!
//! - [`lensmap_camera_models`]: lens models (radial distortion, polynomial
//!   fisheye, ray-direction lookup tables)
//! - [`lensmap_io`]: one-shot loading of lookup-table images
//! - this crate: camera views tying a lens to a placement in the world
//!
//! ## Example
//!
//! ```
//! use lensmap::{CameraFrame, CameraView, FovSpec, PinholeView};
//! use nalgebra::Vector3;
//!
//! let spec = FovSpec::symmetric([640, 480], 3.0, [90.0, 0.0]);
//! let view = PinholeView::new(&spec, CameraFrame::default())?;
//! let (pixels, valid) = view.project_to_image(&[Vector3::new(0.0, 0.0, -5.0)]);
//! assert!(valid[0]);
//! assert!((pixels[0].x - 320.0).abs() < 1e-9);
//! # Ok::<(), lensmap::LensmapError>(())
//! ```

pub mod config;
pub mod error;
pub mod logger;
pub mod view;

pub use config::{CameraFrame, CameraViewSummary, FovExtent, FovSpec, ViewDetails};
pub use error::{LensmapError, LensmapResult};
pub use logger::{init_logger, init_logger_with_level};
pub use view::{
    AnyCameraView, CameraView, EquidistantView, EquirectangularView, FovState, ImageProjection,
    LutView, PinholeView, PolynomialFisheyeView,
};

pub use lensmap_camera_models as camera_models;
pub use lensmap_io as io;

pub use lensmap_camera_models::{
    CameraModelError, FrustumConfig, FrustumMesh, LookupConfig, LookupTable, LutConfig,
    PinholeParams, PolynomialFisheyeModel, PolynomialSpec, RadialDistortionModel, RayDirectionLut,
    RayImage, RenderCrop,
};
pub use lensmap_io::{IoError, LutLoader};
