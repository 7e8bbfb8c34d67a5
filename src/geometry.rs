//! Axis-aligned boxes and bounding balls shared by the mesh and octree
//! modules (§3: `Box`, `Ball`).

use crate::tensor::Vector;

/// An axis-aligned bounding box, stored by center and half-width so that
/// min/max corners and `radius2` can be derived once at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box<const DIM: usize> {
    pub center: Vector<DIM>,
    pub half_width: Vector<DIM>,
    pub min_corner: Vector<DIM>,
    pub max_corner: Vector<DIM>,
    /// Squared distance from `center` to a corner; the invariant
    /// `radius2 >= ||v - center||^2` for any `v` inside the box.
    pub radius2: f64,
}

impl<const DIM: usize> Box<DIM> {
    /// Construct a box from its center and half-width, deriving the
    /// corners and `radius2`.
    pub fn new(center: Vector<DIM>, half_width: Vector<DIM>) -> Self {
        let min_corner = Vector::from_fn(|d| center[d] - half_width[d]);
        let max_corner = Vector::from_fn(|d| center[d] + half_width[d]);
        Box {
            center,
            half_width,
            min_corner,
            max_corner,
            radius2: half_width.norm2(),
        }
    }

    /// Axis-aligned bounding box of a finite point set.
    pub fn bounding(points: &[Vector<DIM>]) -> Self {
        let mut min = points[0];
        let mut max = points[0];
        for p in &points[1..] {
            for d in 0..DIM {
                min[d] = min[d].min(p[d]);
                max[d] = max[d].max(p[d]);
            }
        }
        let center = Vector::from_fn(|d| 0.5 * (min[d] + max[d]));
        let half_width = Vector::from_fn(|d| 0.5 * (max[d] - min[d]));
        Box::new(center, half_width)
    }

    /// Whether `p` lies within the closed box.
    pub fn contains(&self, p: &Vector<DIM>) -> bool {
        (0..DIM).all(|d| p[d] >= self.min_corner[d] && p[d] <= self.max_corner[d])
    }
}

/// A bounding ball; the invariant carried at every construction site is
/// that `radius` is at least the farthest distance from `center` to any
/// point the ball is meant to enclose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball<const DIM: usize> {
    pub center: Vector<DIM>,
    pub radius: f64,
}

impl<const DIM: usize> Ball<DIM> {
    pub fn new(center: Vector<DIM>, radius: f64) -> Self {
        Ball { center, radius }
    }
}

/// Squared distance from `p` to its closest point inside `b` (zero if `p`
/// is already inside).
pub fn box_point_dist2<const DIM: usize>(b: &Box<DIM>, p: &Vector<DIM>) -> f64 {
    let mut dist2 = 0.0;
    for d in 0..DIM {
        let clamped = p[d].clamp(b.min_corner[d], b.max_corner[d]);
        let diff = p[d] - clamped;
        dist2 += diff * diff;
    }
    dist2
}

/// Whether a box and a ball intersect: the closest point in the box to the
/// ball's center is within `radius` of it.
pub fn box_intersects_ball<const DIM: usize>(b: &Box<DIM>, ball: &Ball<DIM>) -> bool {
    box_point_dist2(b, &ball.center) <= ball.radius * ball.radius
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_covers_points() {
        let pts = vec![
            Vector::<2>([0.0, 0.0]),
            Vector::<2>([1.0, -1.0]),
            Vector::<2>([-2.0, 3.0]),
        ];
        let b = Box::bounding(&pts);
        for p in &pts {
            assert!(b.contains(p));
        }
    }

    #[test]
    fn ball_box_intersection() {
        let b = Box::new(Vector::<2>([0.0, 0.0]), Vector::<2>([1.0, 1.0]));
        let near = Ball::new(Vector::<2>([3.0, 0.0]), 2.5);
        let far = Ball::new(Vector::<2>([5.0, 0.0]), 1.0);
        assert!(box_intersects_ball(&b, &near));
        assert!(!box_intersects_ball(&b, &far));
    }
}
