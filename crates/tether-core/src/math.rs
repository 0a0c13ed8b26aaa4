//! Math utilities
//!
//! Re-exports from glam plus the singular-safe solvers the joints are written
//! against. Everything runs in `f64` so that long simulations stay
//! reproducible and well inside the solver tolerances.

pub use glam::{DAffine2, DMat2, DMat3, DVec2, DVec3};

/// Scalar type used throughout the solver
pub type Real = f64;

/// 2D vector
pub type Vec2 = DVec2;

/// 3D vector, used for the combined point + angle impulse of a joint
pub type Vec3 = DVec3;

/// 2x2 matrix, column major
pub type Mat2 = DMat2;

/// 3x3 matrix, column major
pub type Mat3 = DMat3;

/// Rigid 2D transform
pub type Transform = DAffine2;

/// Degrees to radians
pub const DEG_TO_RAD: Real = std::f64::consts::PI / 180.0;

/// Clamp a scalar to `[min, max]` without panicking on an inverted range
#[inline]
pub fn clamp(value: Real, min: Real, max: Real) -> Real {
    value.max(min).min(max)
}

/// Build a symmetric 3x3 matrix from its upper triangle
#[inline]
pub fn symmetric3(k11: Real, k12: Real, k13: Real, k22: Real, k23: Real, k33: Real) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(k11, k12, k13),
        Vec3::new(k12, k22, k23),
        Vec3::new(k13, k23, k33),
    )
}

/// Linear solves that treat a singular matrix as "no solution needed".
///
/// glam's `inverse` divides by a zero determinant and produces infinities; the
/// solver instead wants a zero impulse when a constraint has no effective mass.
pub trait Solve {
    type Vector;

    /// Solve `self * x = b`, yielding the zero vector when singular
    fn solve(&self, b: Self::Vector) -> Self::Vector;
}

impl Solve for Mat2 {
    type Vector = Vec2;

    fn solve(&self, b: Vec2) -> Vec2 {
        let mut det = self.determinant();
        if det != 0.0 {
            det = 1.0 / det;
        }

        let (a11, a21) = (self.x_axis.x, self.x_axis.y);
        let (a12, a22) = (self.y_axis.x, self.y_axis.y);
        Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }
}

impl Solve for Mat3 {
    type Vector = Vec3;

    fn solve(&self, b: Vec3) -> Vec3 {
        let (ex, ey, ez) = (self.x_axis, self.y_axis, self.z_axis);

        let mut det = ex.dot(ey.cross(ez));
        if det != 0.0 {
            det = 1.0 / det;
        }

        Vec3::new(
            det * b.dot(ey.cross(ez)),
            det * ex.dot(b.cross(ez)),
            det * ex.dot(ey.cross(b)),
        )
    }
}

/// Solve against the leading 2x2 block of a 3x3 matrix
#[inline]
pub fn solve2x2(m: &Mat3, b: Vec2) -> Vec2 {
    Mat2::from_mat3(*m).solve(b)
}
