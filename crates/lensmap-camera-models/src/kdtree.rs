//! Static 3D k-d tree for nearest-neighbour lookups.
//!
//! Built once over a fixed point set. Splits cycle through the axis of
//! largest spread at the median; leaves hold up to [`LEAF_SIZE`] points.
//! Equidistant candidates resolve to the lowest point index.

use nalgebra::Vector3;

pub const LEAF_SIZE: usize = 16;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        start: usize,
        end: usize,
    },
    Split {
        axis: usize,
        value: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
pub struct KdTree3 {
    points: Vec<[f64; 3]>,
    order: Vec<usize>,
    nodes: Vec<Node>,
}

impl KdTree3 {
    pub fn build(points: &[Vector3<f64>]) -> Self {
        let points: Vec<[f64; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
        let mut tree = Self {
            order: (0..points.len()).collect(),
            points,
            nodes: Vec::new(),
        };
        if !tree.points.is_empty() {
            tree.build_node(0, tree.points.len());
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn build_node(&mut self, start: usize, end: usize) -> usize {
        let id = self.nodes.len();
        if end - start <= LEAF_SIZE {
            self.nodes.push(Node::Leaf { start, end });
            return id;
        }

        let axis = self.widest_axis(start, end);
        let mid = start + (end - start) / 2;
        let points = &self.points;
        self.order[start..end].select_nth_unstable_by(mid - start, |&a, &b| {
            points[a][axis].total_cmp(&points[b][axis])
        });
        let value = self.points[self.order[mid]][axis];

        self.nodes.push(Node::Leaf { start, end });
        let left = self.build_node(start, mid);
        let right = self.build_node(mid, end);
        self.nodes[id] = Node::Split {
            axis,
            value,
            left,
            right,
        };
        id
    }

    fn widest_axis(&self, start: usize, end: usize) -> usize {
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        for &i in &self.order[start..end] {
            for axis in 0..3 {
                lo[axis] = lo[axis].min(self.points[i][axis]);
                hi[axis] = hi[axis].max(self.points[i][axis]);
            }
        }
        (0..3)
            .max_by(|&a, &b| (hi[a] - lo[a]).total_cmp(&(hi[b] - lo[b])))
            .unwrap_or(0)
    }

    /// Index of the stored point closest to `query` and its squared distance.
    pub fn nearest(&self, query: &Vector3<f64>) -> Option<(usize, f64)> {
        if self.points.is_empty() {
            return None;
        }
        let q = [query.x, query.y, query.z];
        let mut best = (usize::MAX, f64::INFINITY);
        self.search(0, &q, &mut best);
        (best.0 != usize::MAX).then_some(best)
    }

    fn search(&self, node: usize, q: &[f64; 3], best: &mut (usize, f64)) {
        match self.nodes[node] {
            Node::Leaf { start, end } => {
                for &i in &self.order[start..end] {
                    let d = dist2(&self.points[i], q);
                    if d < best.1 || (d == best.1 && i < best.0) {
                        *best = (i, d);
                    }
                }
            }
            Node::Split {
                axis,
                value,
                left,
                right,
            } => {
                let diff = q[axis] - value;
                let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
                self.search(near, q, best);
                if diff * diff <= best.1 {
                    self.search(far, q, best);
                }
            }
        }
    }
}

fn dist2(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Exhaustive nearest neighbour, lowest index on ties.
pub fn nearest_brute_force(points: &[Vector3<f64>], query: &Vector3<f64>) -> Option<(usize, f64)> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| (i, (p - query).norm_squared()))
        .fold(None, |best, cand| match best {
            Some((_, d)) if d <= cand.1 => best,
            _ => Some(cand),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg_points(n: usize, seed: u64) -> Vec<Vector3<f64>> {
        let mut state = seed;
        let mut next = || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
        };
        (0..n).map(|_| Vector3::new(next(), next(), next())).collect()
    }

    #[test]
    fn test_matches_brute_force() {
        let points = lcg_points(500, 7);
        let tree = KdTree3::build(&points);
        assert_eq!(tree.len(), 500);
        for query in lcg_points(100, 99) {
            let (i_tree, d_tree) = tree.nearest(&query).unwrap_or((usize::MAX, 0.0));
            let (i_brute, d_brute) =
                nearest_brute_force(&points, &query).unwrap_or((usize::MAX, 0.0));
            assert_eq!(i_tree, i_brute);
            assert!((d_tree - d_brute).abs() < 1e-15);
        }
    }

    #[test]
    fn test_duplicate_points_pick_lowest_index() {
        let points = vec![Vector3::new(0.0, 0.0, -1.0); 40];
        let tree = KdTree3::build(&points);
        let hit = tree.nearest(&Vector3::new(0.0, 0.0, -1.0));
        assert_eq!(hit.map(|h| h.0), Some(0));
    }

    #[test]
    fn test_nan_query_has_no_neighbour() {
        let tree = KdTree3::build(&lcg_points(50, 3));
        assert!(tree.nearest(&Vector3::new(f64::NAN, 0.0, -1.0)).is_none());
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree3::build(&[]);
        assert!(tree.is_empty());
        assert!(tree.nearest(&Vector3::zeros()).is_none());
        assert!(nearest_brute_force(&[], &Vector3::zeros()).is_none());
    }
}
