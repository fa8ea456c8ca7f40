//! Dense row-major multi-channel float image.
//!
//! Used for ray-direction lookup tables: channels 0..3 hold the (x, y, z) ray
//! direction of each sensor cell, an optional fourth channel holds vignetting.

use crate::CameraModelError;
use nalgebra::Vector3;

#[derive(Debug, Clone, PartialEq)]
pub struct RayImage {
    rows: usize,
    cols: usize,
    channels: usize,
    data: Vec<f64>,
}

impl RayImage {
    /// Wraps an existing row-major buffer.
    ///
    /// # Arguments
    ///
    /// * `rows`, `cols`, `channels` - Image shape
    /// * `data` - Row-major samples, `rows * cols * channels` long
    pub fn from_vec(
        rows: usize,
        cols: usize,
        channels: usize,
        data: Vec<f64>,
    ) -> Result<Self, CameraModelError> {
        if rows == 0 || cols == 0 || channels == 0 {
            return Err(CameraModelError::InvalidLut(format!(
                "image shape must be non-empty, got {rows}x{cols}x{channels}"
            )));
        }
        let expected = rows * cols * channels;
        if data.len() != expected {
            return Err(CameraModelError::InvalidLut(format!(
                "buffer holds {} samples, shape {rows}x{cols}x{channels} needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            channels,
            data,
        })
    }

    pub fn zeros(rows: usize, cols: usize, channels: usize) -> Self {
        Self {
            rows,
            cols,
            channels,
            data: vec![0.0; rows * cols * channels],
        }
    }

    /// Builds a 3-channel image from ray directions in row-major order.
    pub fn from_rays(
        rows: usize,
        cols: usize,
        rays: &[Vector3<f64>],
    ) -> Result<Self, CameraModelError> {
        let data = rays.iter().flat_map(|r| [r.x, r.y, r.z]).collect();
        Self::from_vec(rows, cols, 3, data)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn pixel(&self, row: usize, col: usize) -> &[f64] {
        let start = (row * self.cols + col) * self.channels;
        &self.data[start..start + self.channels]
    }

    pub fn pixel_mut(&mut self, row: usize, col: usize) -> &mut [f64] {
        let start = (row * self.cols + col) * self.channels;
        &mut self.data[start..start + self.channels]
    }

    /// Ray direction stored at a cell. Missing channels read as zero.
    pub fn ray(&self, row: usize, col: usize) -> Vector3<f64> {
        let px = self.pixel(row, col);
        let get = |i: usize| px.get(i).copied().unwrap_or(0.0);
        Vector3::new(get(0), get(1), get(2))
    }

    pub fn set_ray(&mut self, row: usize, col: usize, ray: &Vector3<f64>) {
        let px = self.pixel_mut(row, col);
        for (dst, src) in px.iter_mut().zip(ray.iter()) {
            *dst = *src;
        }
    }

    /// All stored rays in row-major order.
    pub fn rays(&self) -> Vec<Vector3<f64>> {
        (0..self.rows)
            .flat_map(|r| (0..self.cols).map(move |c| (r, c)))
            .map(|(r, c)| self.ray(r, c))
            .collect()
    }

    /// Copy with rows in reverse order.
    pub fn flipped_rows(&self) -> Self {
        let row_len = self.cols * self.channels;
        let data = self
            .data
            .chunks_exact(row_len)
            .rev()
            .flatten()
            .copied()
            .collect();
        Self {
            rows: self.rows,
            cols: self.cols,
            channels: self.channels,
            data,
        }
    }
}
