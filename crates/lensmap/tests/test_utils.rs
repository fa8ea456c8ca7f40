//! Shared utilities for lensmap integration tests
//!
//! Synthesizes ray-direction LUT buffers deterministically. Rays use the
//! camera-local frame (x right, y up, looking along -z) and row 0 is the top
//! of the sensor.

#![allow(dead_code)]

use lensmap::RayImage;
use nalgebra::{Rotation3, Vector3};

/// Pinhole ray for LUT cell (row, col) around a principal point given in
/// cell coordinates.
pub fn pinhole_ray(row: usize, col: usize, center_rc: [f64; 2], focal: f64) -> Vector3<f64> {
    let x = col as f64 - center_rc[1];
    let y = center_rc[0] - row as f64;
    Vector3::new(x, y, -focal).normalize()
}

/// Pinhole LUT of `rows × cols` cells.
pub fn pinhole_lut(rows: usize, cols: usize, center_rc: [f64; 2], focal: f64) -> RayImage {
    let mut image = RayImage::zeros(rows, cols, 3);
    for r in 0..rows {
        for c in 0..cols {
            image.set_ray(r, c, &pinhole_ray(r, c, center_rc, focal));
        }
    }
    image
}

/// LUT whose rays all point along -z, except inside a disk around
/// `center_rc` where a pinhole fan is tilted by `tilt_deg` about the y axis.
pub fn tilted_disk_lut(
    size: usize,
    center_rc: [f64; 2],
    radius: f64,
    tilt_deg: f64,
    focal: f64,
) -> RayImage {
    let tilt = Rotation3::from_axis_angle(&Vector3::y_axis(), tilt_deg.to_radians());
    let mut image = RayImage::zeros(size, size, 3);
    for r in 0..size {
        for c in 0..size {
            let dist = (r as f64 - center_rc[0]).hypot(c as f64 - center_rc[1]);
            let ray = if dist <= radius {
                tilt * pinhole_ray(r, c, center_rc, focal)
            } else {
                Vector3::new(0.0, 0.0, -1.0)
            };
            image.set_ray(r, c, &ray);
        }
    }
    image
}

/// Zeroes every cell within `radius` of `center_rc`.
pub fn punch_hole(image: &mut RayImage, center_rc: [f64; 2], radius: f64) {
    for r in 0..image.rows() {
        for c in 0..image.cols() {
            if (r as f64 - center_rc[0]).hypot(c as f64 - center_rc[1]) <= radius {
                image.set_ray(r, c, &Vector3::zeros());
            }
        }
    }
}

/// Deterministic points spread over a cone of half angle `half_angle_deg`
/// around -z, at depths between 2 and 5 m.
pub fn points_in_cone(n: usize, half_angle_deg: f64) -> Vec<Vector3<f64>> {
    (0..n)
        .map(|i| {
            let azimuth = (i as f64 * 2.4) % std::f64::consts::TAU;
            let polar = half_angle_deg.to_radians() * ((i as f64 * 0.37) % 1.0);
            let depth = 2.0 + 3.0 * ((i as f64 * 0.17) % 1.0);
            Vector3::new(
                polar.sin() * azimuth.cos(),
                polar.sin() * azimuth.sin(),
                -polar.cos(),
            ) * depth
        })
        .collect()
}

/// Temp file path unique to this test process.
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("lensmap-{}-{name}", std::process::id()))
}
