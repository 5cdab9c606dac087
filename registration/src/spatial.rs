//! Spatial nearest-neighbor index
//!
//! The registration loop only consumes the [`NearestNeighbor`] capability;
//! the KD-tree here is the default provider, built once per run over the
//! read-only target set.

use nalgebra::Point3;
use std::cmp::Ordering;

/// Closest-point capability consumed by the correspondence estimator.
pub trait NearestNeighbor {
    /// Closest indexed point to `query` plus the squared distance to it.
    /// Returns `None` on an empty index.
    fn nearest(&self, query: &Point3<f64>) -> Option<(Point3<f64>, f64)>;
}

/// Balanced KD-tree over a fixed point set.
///
/// Built by recursive median splits into a flat node arena, so construction
/// is deterministic and queries never chase heap pointers.
pub struct KdTree {
    nodes: Vec<KdNode>,
    root: Option<u32>,
}

struct KdNode {
    point: Point3<f64>,
    axis: usize,
    left: Option<u32>,
    right: Option<u32>,
}

impl KdTree {
    pub fn build(points: &[Point3<f64>]) -> Self {
        let mut order: Vec<usize> = (0..points.len()).collect();
        let mut nodes = Vec::with_capacity(points.len());
        let root = Self::build_recursive(points, &mut order, 0, &mut nodes);
        Self { nodes, root }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn build_recursive(
        points: &[Point3<f64>],
        order: &mut [usize],
        depth: usize,
        nodes: &mut Vec<KdNode>,
    ) -> Option<u32> {
        if order.is_empty() {
            return None;
        }
        let axis = depth % 3;
        order.sort_by(|&a, &b| {
            points[a][axis]
                .partial_cmp(&points[b][axis])
                .unwrap_or(Ordering::Equal)
        });
        let mid = order.len() / 2;

        let slot = nodes.len() as u32;
        nodes.push(KdNode {
            point: points[order[mid]],
            axis,
            left: None,
            right: None,
        });

        let (lower, rest) = order.split_at_mut(mid);
        let upper = &mut rest[1..];
        let left = Self::build_recursive(points, lower, depth + 1, nodes);
        let right = Self::build_recursive(points, upper, depth + 1, nodes);
        nodes[slot as usize].left = left;
        nodes[slot as usize].right = right;
        Some(slot)
    }

    fn nearest_recursive(&self, slot: u32, query: &Point3<f64>, best: &mut (Point3<f64>, f64)) {
        let node = &self.nodes[slot as usize];
        let dist_sq = (node.point - query).norm_squared();
        if dist_sq < best.1 {
            *best = (node.point, dist_sq);
        }

        let diff = query[node.axis] - node.point[node.axis];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(child) = near {
            self.nearest_recursive(child, query, best);
        }
        // The far side can only hold a closer point if the splitting plane
        // is inside the current best radius.
        if diff * diff < best.1 {
            if let Some(child) = far {
                self.nearest_recursive(child, query, best);
            }
        }
    }
}

impl NearestNeighbor for KdTree {
    fn nearest(&self, query: &Point3<f64>) -> Option<(Point3<f64>, f64)> {
        let root = self.root?;
        let root_point = self.nodes[root as usize].point;
        let mut best = (root_point, (root_point - query).norm_squared());
        self.nearest_recursive(root, query, &mut best);
        Some(best)
    }
}
