//! Mass properties of simple shapes.
//!
//! Inertia is reported about the body origin; [`Body::set_mass_properties`]
//! moves it to the centre of mass.
//!
//! [`Body::set_mass_properties`]: crate::Body::set_mass_properties

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tether_core::math::{Real, Vec2};

use crate::error::{PhysicsError, Result};

/// Mass, rotational inertia about the body origin, and local centre of mass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: Real,
    pub inertia: Real,
    pub centroid: Vec2,
}

impl MassProperties {
    /// Solid disc or ring centred at `center`
    pub fn circle(density: Real, radius_outer: Real, radius_inner: Real, center: Vec2) -> Result<Self> {
        check_density(density)?;
        let (ro2, ri2) = (radius_outer * radius_outer, radius_inner * radius_inner);
        let area = PI * (ro2 - ri2);
        if area.is_nan() || area <= 0.0 {
            return Err(PhysicsError::InvalidShape("circle has no area"));
        }

        let mass = area * density;
        Ok(Self {
            mass,
            inertia: mass * ((ro2 + ri2) * 0.5 + center.length_squared()),
            centroid: center,
        })
    }

    /// Axis-aligned box of `width` x `height` centred on the origin
    pub fn cuboid(density: Real, width: Real, height: Real) -> Result<Self> {
        check_density(density)?;
        let area = width * height;
        if area.is_nan() || area <= 0.0 {
            return Err(PhysicsError::InvalidShape("box has no area"));
        }

        let mass = area * density;
        Ok(Self {
            mass,
            inertia: mass * (width * width + height * height) / 12.0,
            centroid: Vec2::ZERO,
        })
    }

    /// Capsule swept by a disc of `radius` from `a` to `b`
    pub fn segment(density: Real, a: Vec2, b: Vec2, radius: Real) -> Result<Self> {
        check_density(density)?;
        let length = a.distance(b);
        let area = radius * (PI * radius + 2.0 * length);
        if area.is_nan() || area <= 0.0 {
            return Err(PhysicsError::InvalidShape("segment has no area"));
        }

        let mass = area * density;
        let centroid = (a + b) * 0.5;
        Ok(Self {
            mass,
            inertia: mass * (length * length / 12.0 + centroid.length_squared()),
            centroid,
        })
    }

    /// Convex or simple polygon with counter-clockwise winding
    pub fn polygon(density: Real, vertices: &[Vec2]) -> Result<Self> {
        check_density(density)?;
        if vertices.len() < 3 {
            return Err(PhysicsError::InvalidShape("polygon needs at least three vertices"));
        }

        let mut area2 = 0.0;
        let mut weighted = Vec2::ZERO;
        let mut inertia_sum = 0.0;
        let mut inertia_div = 0.0;

        for (i, &v1) in vertices.iter().enumerate() {
            let v2 = vertices[(i + 1) % vertices.len()];

            let c = v1.perp_dot(v2);
            area2 += c;
            weighted += (v1 + v2) * c;

            let a = v2.perp_dot(v1);
            inertia_sum += a * (v1.dot(v1) + v1.dot(v2) + v2.dot(v2));
            inertia_div += a;
        }

        if area2.is_nan() || area2 <= 0.0 {
            return Err(PhysicsError::InvalidShape(
                "polygon must wind counter-clockwise and enclose an area",
            ));
        }

        let mass = area2 * 0.5 * density;
        Ok(Self {
            mass,
            inertia: mass * inertia_sum / (6.0 * inertia_div),
            centroid: weighted / (3.0 * area2),
        })
    }

    /// Sum several parts into one set of properties
    pub fn combine(parts: &[MassProperties]) -> Result<Self> {
        let mass: Real = parts.iter().map(|p| p.mass).sum();
        if mass.is_nan() || mass <= 0.0 {
            return Err(PhysicsError::InvalidShape("combined mass must be positive"));
        }

        let centroid = parts.iter().map(|p| p.centroid * p.mass).sum::<Vec2>() / mass;
        Ok(Self {
            mass,
            inertia: parts.iter().map(|p| p.inertia).sum(),
            centroid,
        })
    }

    /// Inertia about the centre of mass rather than the body origin
    pub fn inertia_about_centroid(&self) -> Real {
        self.inertia - self.mass * self.centroid.length_squared()
    }
}

fn check_density(density: Real) -> Result<()> {
    if density.is_finite() && density > 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidShape("density must be positive"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near(a: Real, b: Real) {
        assert!((a - b).abs() < 1e-12, "{a} != {b}");
    }

    #[test]
    fn test_cuboid() {
        let mp = MassProperties::cuboid(2.0, 1.0, 1.0).unwrap();
        assert_near(mp.mass, 2.0);
        assert_near(mp.inertia, 1.0 / 3.0);
        assert_eq!(mp.centroid, Vec2::ZERO);
    }

    #[test]
    fn test_polygon_matches_cuboid() {
        let square = [
            Vec2::new(-0.5, -0.5),
            Vec2::new(0.5, -0.5),
            Vec2::new(0.5, 0.5),
            Vec2::new(-0.5, 0.5),
        ];
        let poly = MassProperties::polygon(2.0, &square).unwrap();
        let cuboid = MassProperties::cuboid(2.0, 1.0, 1.0).unwrap();
        assert_near(poly.mass, cuboid.mass);
        assert_near(poly.inertia, cuboid.inertia);
        assert!(poly.centroid.length() < 1e-12);
    }

    #[test]
    fn test_offset_polygon_uses_parallel_axis() {
        let rect = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        let mp = MassProperties::polygon(1.0, &rect).unwrap();
        assert_near(mp.mass, 2.0);
        assert!((mp.centroid - Vec2::new(1.0, 0.5)).length() < 1e-12);
        assert_near(mp.inertia_about_centroid(), 2.0 * 5.0 / 12.0);
    }

    #[test]
    fn test_clockwise_polygon_rejected() {
        let cw = [Vec2::new(0.0, 0.0), Vec2::new(0.0, 1.0), Vec2::new(1.0, 0.0)];
        assert!(matches!(
            MassProperties::polygon(1.0, &cw),
            Err(PhysicsError::InvalidShape(_))
        ));
        assert!(MassProperties::polygon(1.0, &cw[..2]).is_err());
    }

    #[test]
    fn test_circle() {
        let mp = MassProperties::circle(1.0, 1.0, 0.0, Vec2::ZERO).unwrap();
        assert_near(mp.mass, PI);
        assert_near(mp.inertia, PI * 0.5);

        let offset = MassProperties::circle(1.0, 1.0, 0.0, Vec2::new(2.0, 0.0)).unwrap();
        assert_near(offset.inertia_about_centroid(), mp.inertia);

        assert!(MassProperties::circle(1.0, 1.0, 1.0, Vec2::ZERO).is_err());
        assert!(MassProperties::circle(0.0, 1.0, 0.0, Vec2::ZERO).is_err());
    }

    #[test]
    fn test_segment() {
        let mp = MassProperties::segment(1.0, Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), 0.5).unwrap();
        assert_near(mp.mass, 0.5 * (PI * 0.5 + 4.0));
        assert_eq!(mp.centroid, Vec2::ZERO);
        assert_near(mp.inertia, mp.mass * 4.0 / 12.0);
    }

    #[test]
    fn test_combine() {
        let a = MassProperties::circle(1.0, 1.0, 0.0, Vec2::new(-1.0, 0.0)).unwrap();
        let b = MassProperties::circle(1.0, 1.0, 0.0, Vec2::new(1.0, 0.0)).unwrap();
        let both = MassProperties::combine(&[a, b]).unwrap();
        assert_near(both.mass, 2.0 * PI);
        assert!(both.centroid.length() < 1e-12);
        assert_near(both.inertia, a.inertia + b.inertia);

        assert!(MassProperties::combine(&[]).is_err());
    }
}
