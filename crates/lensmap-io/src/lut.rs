//! Lookup table image loader.
//!
//! ## Example
//!
//! ```no_run
//! use lensmap_io::LutLoader;
//! use lensmap_camera_models::LutConfig;
//!
//! let lut = LutLoader::load_lut("data/lut/fisheye.exr", &LutConfig::new())?;
//! println!("max radial angle: {} deg", lut.max_radial_angle_deg());
//! # Ok::<(), lensmap_io::IoError>(())
//! ```

use super::IoError;
use image::{DynamicImage, ImageReader};
use lensmap_camera_models::{LutConfig, RayDirectionLut, RayImage};
use std::path::Path;
use tracing::info;

/// Loader for ray-direction lookup tables stored as float images.
pub struct LutLoader;

impl LutLoader {
    /// Reads a lookup table image into a ray buffer.
    ///
    /// # Returns
    ///
    /// A 3 or 4 channel [`RayImage`], row 0 at the top of the image. Images
    /// with fewer than three channels are rejected.
    pub fn load(path: impl AsRef<Path>) -> Result<RayImage, IoError> {
        let path = path.as_ref();
        let image = ImageReader::open(path)
            .map_err(|e| IoError::Io(e).log_with_source(format!("Failed to open LUT file: {path:?}")))?
            .with_guessed_format()
            .map_err(|e| IoError::Io(e).log_with_source(format!("Failed to read LUT file: {path:?}")))?
            .decode()
            .map_err(|e| {
                IoError::Image(e).log_with_source(format!("Failed to decode LUT file: {path:?}"))
            })?;

        let buffer = Self::to_ray_image(&image)?;
        info!(
            path = %path.display(),
            rows = buffer.rows(),
            cols = buffer.cols(),
            channels = buffer.channels(),
            "LUT image loaded"
        );
        Ok(buffer)
    }

    /// Reads a lookup table image and builds the lookup table.
    pub fn load_lut(path: impl AsRef<Path>, config: &LutConfig) -> Result<RayDirectionLut, IoError> {
        let buffer = Self::load(path.as_ref())?;
        RayDirectionLut::from_image(&buffer, config)
            .map_err(|e| IoError::from(e).log_with_source(format!("Invalid LUT in {:?}", path.as_ref())))
    }

    /// Converts a decoded image to a ray buffer.
    pub fn to_ray_image(image: &DynamicImage) -> Result<RayImage, IoError> {
        let channels = image.color().channel_count();
        if channels < 3 {
            return Err(IoError::ChannelCount { found: channels }.log());
        }

        let rows = image.height() as usize;
        let cols = image.width() as usize;
        let (channels, samples): (usize, Vec<f32>) = if channels >= 4 {
            (4, image.to_rgba32f().into_raw())
        } else {
            (3, image.to_rgb32f().into_raw())
        };
        let data = samples.into_iter().map(f64::from).collect();
        Ok(RayImage::from_vec(rows, cols, channels, data)?)
    }
}
