//! Frustum mesh construction.
//!
//! A frustum is described by a closed ring of unit boundary rays. The mesh
//! consists of:
//!
//! ```text
//! vertex 0            apex (camera centre)
//! vertex 1            far point on the optical axis, (0, 0, -L)
//! vertices 2..2+n     boundary ring scaled to length L
//! following blocks    inner rings, each n vertices, stepping towards the axis
//! ```
//!
//! Faces are index lists: an outer fan from the apex to the boundary ring,
//! quads between consecutive rings and a fan from the innermost ring to the
//! far vertex. Every fan and quad strip is closed.

use crate::CameraModelError;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

const APEX: usize = 0;
const FAR_POINT: usize = 1;
const RING_START: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrustumMesh {
    pub vertices: Vec<Vector3<f64>>,
    pub faces: Vec<Vec<usize>>,
    /// Number of boundary rays.
    pub ring_len: usize,
    /// Number of rings including the boundary ring.
    pub ring_count: usize,
}

/// Angle between two rays in degrees.
pub fn angle_between_deg(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let denom = a.norm() * b.norm();
    if denom <= 0.0 {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Thins an ordered boundary walk into a ring whose consecutive rays are at
/// most `max_edge_angle_deg` apart wherever the walk itself allows it.
///
/// A candidate is kept pending while it stays within the limit of the last
/// emitted ray; once a candidate exceeds the limit the pending one is emitted.
#[derive(Debug, Clone)]
pub struct RingBuilder {
    max_edge_angle_deg: f64,
    ring: Vec<Vector3<f64>>,
    pending: Option<Vector3<f64>>,
}

impl RingBuilder {
    pub fn new(first: Vector3<f64>, max_edge_angle_deg: f64) -> Self {
        Self {
            max_edge_angle_deg,
            ring: vec![first],
            pending: None,
        }
    }

    fn last(&self) -> &Vector3<f64> {
        // ring always holds the seed ray
        &self.ring[self.ring.len() - 1]
    }

    fn exceeds(&self, ray: &Vector3<f64>) -> bool {
        angle_between_deg(self.last(), ray) > self.max_edge_angle_deg
    }

    /// Offers the next ray of the walk. Forced rays are always emitted.
    pub fn offer(&mut self, ray: Vector3<f64>, force: bool) {
        if self.exceeds(&ray)
            && let Some(pending) = self.pending.take()
        {
            self.ring.push(pending);
        }
        if force || self.exceeds(&ray) {
            if *self.last() != ray {
                self.ring.push(ray);
            }
            self.pending = None;
        } else if *self.last() != ray {
            self.pending = Some(ray);
        }
    }

    pub fn finish(mut self) -> Vec<Vector3<f64>> {
        if let Some(pending) = self.pending.take() {
            self.ring.push(pending);
        }
        self.ring
    }
}

/// Builds the frustum surface for a closed ring of boundary rays.
///
/// # Arguments
///
/// * `ring` - Boundary rays in walk order, pointing into the -z half space
/// * `ray_length` - Length L of the frustum
/// * `surface_step_deg` - Approximate angular step between inner rings
pub fn build_frustum(
    ring: &[Vector3<f64>],
    ray_length: f64,
    surface_step_deg: f64,
) -> Result<FrustumMesh, CameraModelError> {
    crate::require_positive("frustum ray length", ray_length)?;
    crate::require_positive("frustum surface step", surface_step_deg)?;
    if ring.len() < 3 {
        return Err(CameraModelError::InvalidLut(format!(
            "frustum boundary needs at least 3 rays, got {}",
            ring.len()
        )));
    }

    let optical_axis = Vector3::new(0.0, 0.0, -1.0);
    let unit_ring: Vec<Vector3<f64>> = ring
        .iter()
        .map(|r| r.try_normalize(crate::MIN_RAY_NORM))
        .collect::<Option<_>>()
        .ok_or_else(|| {
            CameraModelError::InvalidLut("frustum boundary contains a zero-length ray".to_string())
        })?;

    let angles: Vec<f64> = unit_ring
        .iter()
        .map(|r| r.dot(&optical_axis).clamp(-1.0, 1.0).acos())
        .collect();
    let min_angle_deg = angles.iter().fold(f64::INFINITY, |m, a| m.min(*a)).to_degrees();
    let steps = ((min_angle_deg / surface_step_deg).ceil() as usize).max(1);

    let n = unit_ring.len();
    let mut vertices = Vec::with_capacity(RING_START + n * steps);
    vertices.push(Vector3::zeros());
    vertices.push(optical_axis * ray_length);
    vertices.extend(unit_ring.iter().map(|r| r * ray_length));

    let tangents: Vec<Vector3<f64>> = unit_ring
        .iter()
        .map(|r| {
            let normal = optical_axis
                .cross(r)
                .try_normalize(crate::MIN_RAY_NORM)
                .unwrap_or_else(Vector3::y);
            normal.cross(&optical_axis)
        })
        .collect();

    for step in 1..steps {
        for (angle, tangent) in angles.iter().zip(&tangents) {
            let inner = angle - step as f64 * angle / steps as f64;
            let ray = optical_axis * inner.cos() + tangent * inner.sin();
            vertices.push(ray * ray_length);
        }
    }

    let mut faces = Vec::with_capacity(n * (steps + 1));
    let fan = |faces: &mut Vec<Vec<usize>>, hub: usize, start: usize| {
        for i in start..start + n - 1 {
            faces.push(vec![hub, i, i + 1]);
        }
        faces.push(vec![hub, start + n - 1, start]);
    };

    fan(&mut faces, APEX, RING_START);
    for step in 0..steps - 1 {
        let s = RING_START + step * n;
        for i in s..s + n - 1 {
            faces.push(vec![i, i + 1, i + n + 1, i + n]);
        }
        faces.push(vec![s + n - 1, s, s + n, s + 2 * n - 1]);
    }
    fan(&mut faces, FAR_POINT, RING_START + (steps - 1) * n);

    Ok(FrustumMesh {
        vertices,
        faces,
        ring_len: n,
        ring_count: steps,
    })
}
