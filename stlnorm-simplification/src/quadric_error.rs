//! Quadric error metric
//!
//! A quadric stores the summed squared distance to a set of planes as a
//! symmetric 4x4 matrix, so the error of placing a vertex at `p` is
//! `[p 1]^T Q [p 1]`.

use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use std::ops::{Add, AddAssign};
use stlnorm_core::Point3f;

/// Below this the 3x3 system is treated as singular
const SINGULAR_DETERMINANT: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric(pub Matrix4<f64>);

impl Quadric {
    pub fn zero() -> Self {
        Quadric(Matrix4::zeros())
    }

    /// Quadric of the plane `ax + by + cz + d = 0` with unit `(a, b, c)`
    pub fn from_plane(p: &Vector4<f64>) -> Self {
        Quadric(p * p.transpose())
    }

    /// Plane quadric of a triangle, `None` when the triangle has no area
    pub fn from_triangle(v0: &Point3f, v1: &Point3f, v2: &Point3f) -> Option<Self> {
        let n = triangle_normal(v0, v1, v2)?;
        let d = -n.dot(&to_f64(v0));
        Some(Self::from_plane(&Vector4::new(n.x, n.y, n.z, d)))
    }

    /// Constraint plane through a boundary edge, perpendicular to the face
    /// that owns it, scaled by `weight`.
    pub fn boundary_constraint(
        e0: &Point3f,
        e1: &Point3f,
        face_normal: &Vector3<f64>,
        weight: f64,
    ) -> Option<Self> {
        let edge = to_f64(e1) - to_f64(e0);
        let n = edge.cross(face_normal).try_normalize(f64::EPSILON)?;
        let d = -n.dot(&to_f64(e0));
        Some(Quadric(Self::from_plane(&Vector4::new(n.x, n.y, n.z, d)).0 * weight))
    }

    /// Squared-distance error of placing a vertex at `p`
    pub fn evaluate(&self, p: &Point3f) -> f64 {
        let v = Vector4::new(p.x as f64, p.y as f64, p.z as f64, 1.0);
        (v.transpose() * self.0 * v)[0].max(0.0)
    }

    /// Position minimizing the error, `None` when the system is singular
    pub fn optimal_point(&self) -> Option<Point3f> {
        let a: Matrix3<f64> = self.0.fixed_view::<3, 3>(0, 0).into_owned();
        if a.determinant().abs() < SINGULAR_DETERMINANT {
            return None;
        }
        let b: Vector3<f64> = self.0.fixed_view::<3, 1>(0, 3).into_owned();
        let p = -a.try_inverse()? * b;
        if !p.iter().all(|c| c.is_finite()) {
            return None;
        }
        Some(Point3f::new(p.x as f32, p.y as f32, p.z as f32))
    }
}

impl Default for Quadric {
    fn default() -> Self {
        Self::zero()
    }
}

impl Add for Quadric {
    type Output = Quadric;

    fn add(self, rhs: Quadric) -> Quadric {
        Quadric(self.0 + rhs.0)
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, rhs: Quadric) {
        self.0 += rhs.0;
    }
}

/// Unit normal of a triangle in double precision
pub fn triangle_normal(v0: &Point3f, v1: &Point3f, v2: &Point3f) -> Option<Vector3<f64>> {
    let p0 = to_f64(v0);
    (to_f64(v1) - p0)
        .cross(&(to_f64(v2) - p0))
        .try_normalize(f64::MIN_POSITIVE)
}

fn to_f64(p: &Point3f) -> Vector3<f64> {
    Vector3::new(p.x as f64, p.y as f64, p.z as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plane_distance() {
        let q = Quadric::from_triangle(
            &Point3f::new(0.0, 0.0, 0.0),
            &Point3f::new(1.0, 0.0, 0.0),
            &Point3f::new(0.0, 1.0, 0.0),
        )
        .unwrap();
        assert_relative_eq!(q.evaluate(&Point3f::new(5.0, -3.0, 0.0)), 0.0);
        assert_relative_eq!(q.evaluate(&Point3f::new(0.0, 0.0, 2.0)), 4.0);
    }

    #[test]
    fn test_degenerate_triangle() {
        let p = Point3f::new(1.0, 1.0, 1.0);
        assert!(Quadric::from_triangle(&p, &p, &Point3f::new(2.0, 2.0, 2.0)).is_none());
    }

    #[test]
    fn test_optimal_point_at_corner() {
        // Three orthogonal planes meeting at (1, 2, 3)
        let mut q = Quadric::zero();
        q += Quadric::from_plane(&Vector4::new(1.0, 0.0, 0.0, -1.0));
        q += Quadric::from_plane(&Vector4::new(0.0, 1.0, 0.0, -2.0));
        q += Quadric::from_plane(&Vector4::new(0.0, 0.0, 1.0, -3.0));

        let p = q.optimal_point().unwrap();
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, 3.0, epsilon = 1e-5);
        assert_relative_eq!(q.evaluate(&p), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_coplanar_quadric_is_singular() {
        let q = Quadric::from_plane(&Vector4::new(0.0, 0.0, 1.0, 0.0))
            + Quadric::from_plane(&Vector4::new(0.0, 0.0, 1.0, 0.0));
        assert!(q.optimal_point().is_none());
    }

    #[test]
    fn test_boundary_constraint_is_perpendicular() {
        let q = Quadric::boundary_constraint(
            &Point3f::new(0.0, 0.0, 0.0),
            &Point3f::new(1.0, 0.0, 0.0),
            &Vector3::new(0.0, 0.0, 1.0),
            10.0,
        )
        .unwrap();
        // Sliding along the edge or off the face plane costs nothing
        assert_relative_eq!(q.evaluate(&Point3f::new(3.0, 0.0, 0.0)), 0.0);
        assert_relative_eq!(q.evaluate(&Point3f::new(0.0, 0.0, 5.0)), 0.0);
        // Leaving the edge line inside the plane is penalized by the weight
        assert_relative_eq!(q.evaluate(&Point3f::new(0.0, 1.0, 0.0)), 10.0, epsilon = 1e-9);
    }
}
