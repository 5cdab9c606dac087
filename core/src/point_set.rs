use nalgebra::Point3;

/// Ordered collection of 3D points sampled along a curve-like structure
/// (e.g. a vessel centerline).
///
/// The point order is preserved throughout registration; a target set is
/// treated as read-only for the duration of a run while the source set is
/// replaced wholesale after every iteration.
#[derive(Debug, Clone, Default)]
pub struct PointSet {
    pub points: Vec<Point3<f64>>,
}

impl PointSet {
    pub fn new(points: Vec<Point3<f64>>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Axis-aligned bounding box of the set, `None` when empty.
    pub fn bounds(&self) -> Option<Aabb> {
        let first = self.points.first()?;
        let mut min = *first;
        let mut max = *first;
        for p in &self.points[1..] {
            for axis in 0..3 {
                if p[axis] < min[axis] {
                    min[axis] = p[axis];
                }
                if p[axis] > max[axis] {
                    max[axis] = p[axis];
                }
            }
        }
        Some(Aabb { min, max })
    }

    /// New set containing only the points inside `bounds` (boundary
    /// inclusive), in their original order.
    pub fn cropped_to(&self, bounds: &Aabb) -> PointSet {
        PointSet::new(
            self.points
                .iter()
                .filter(|p| bounds.contains(p))
                .copied()
                .collect(),
        )
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    /// Box grown by `margin` on all six faces.
    pub fn expanded(&self, margin: f64) -> Aabb {
        let m = nalgebra::Vector3::repeat(margin);
        Aabb {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Inclusive containment test: points exactly on a face are inside.
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|axis| p[axis] >= self.min[axis] && p[axis] <= self.max[axis])
    }
}
