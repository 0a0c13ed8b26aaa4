//! Joints
//!
//! Every joint links two bodies and runs the same three-phase protocol each step:
//! - `init_solver`: recompute step-scoped geometry and effective masses, warm start
//! - `solve_velocity_constraints`: one sequential-impulse pass
//! - `solve_position_constraints`: one direct position correction pass,
//!   returning whether the joint is within tolerance
//!
//! Step-scoped fields (anchor offsets, effective masses, axes) are rebuilt in
//! `init_solver` and never read across steps.

mod angle;
mod distance;
mod revolute;
mod rope;
mod spring;
mod weld;

pub use angle::AngleJoint;
pub use distance::DistanceJoint;
pub use revolute::RevoluteJoint;
pub use rope::RopeJoint;
pub use spring::SpringJoint;
pub use weld::WeldJoint;

use std::any::Any;
use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};
use tether_core::arena::Handle;
use tether_core::math::{Mat3, Real, Vec2, solve2x2, symmetric3};

use crate::body::{Body, BodyHandle};
use crate::config::SolverConstants;

/// Handle to a joint owned by a [`Space`](crate::Space)
pub type JointHandle = Handle<Box<dyn Joint>>;

/// Concrete joint type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    Revolute,
    Distance,
    Rope,
    Weld,
    Spring,
    Angle,
}

/// Which side of a one-dimensional limit is being enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitState {
    #[default]
    Inactive,
    AtLower,
    AtUpper,
    /// Lower and upper bounds coincide; the axis is locked
    EqualLimits,
}

/// Per-step solver inputs
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    /// Step size in seconds
    pub dt: Real,
    pub dt_inv: Real,
    pub warm_starting: bool,
    pub constants: SolverConstants,
}

impl StepContext {
    pub fn new(dt: Real, warm_starting: bool, constants: SolverConstants) -> Self {
        Self {
            dt,
            dt_inv: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            warm_starting,
            constants,
        }
    }
}

/// State shared by every joint
#[derive(Debug, Clone)]
pub struct JointBase {
    body1: BodyHandle,
    body2: BodyHandle,
    /// Whether the two bodies may still collide with each other
    pub collide_connected: bool,
    /// Reaction force at which a breakable joint is removed
    pub max_force: Real,
    pub breakable: bool,
    max_impulse: Real,
}

impl JointBase {
    pub fn new(body1: BodyHandle, body2: BodyHandle) -> Self {
        Self {
            body1,
            body2,
            collide_connected: false,
            max_force: Real::INFINITY,
            breakable: false,
            max_impulse: Real::INFINITY,
        }
    }

    /// Get the first body
    pub fn body1(&self) -> BodyHandle {
        self.body1
    }

    /// Get the second body
    pub fn body2(&self) -> BodyHandle {
        self.body2
    }

    /// Impulse equivalent of `max_force` for the current step
    pub fn max_impulse(&self) -> Real {
        self.max_impulse
    }

    pub(crate) fn begin_step(&mut self, dt: Real) {
        self.max_impulse = self.max_force * dt;
    }

    /// Whether a reaction force exceeds the breaking threshold
    pub fn should_break(&self, reaction_force: Vec2) -> bool {
        self.breakable && reaction_force.length_squared() >= self.max_force * self.max_force
    }
}

/// A constraint between two bodies.
///
/// The space hands each call mutable access to both bodies; joints only store handles.
pub trait Joint: Any + fmt::Debug {
    fn base(&self) -> &JointBase;
    fn base_mut(&mut self) -> &mut JointBase;
    fn kind(&self) -> JointKind;

    /// Prepare for a step and apply the warm-start impulse
    fn init_solver(&mut self, body1: &mut Body, body2: &mut Body, ctx: &StepContext);

    fn solve_velocity_constraints(&mut self, body1: &mut Body, body2: &mut Body);

    /// Returns `true` once the joint is within the slop tolerances
    fn solve_position_constraints(
        &mut self,
        body1: &mut Body,
        body2: &mut Body,
        constants: &SolverConstants,
    ) -> bool;

    /// Force the joint applied over the last step
    fn reaction_force(&self, dt_inv: Real) -> Vec2;

    /// Torque the joint applied over the last step
    fn reaction_torque(&self, dt_inv: Real) -> Real;

    fn world_anchor1(&self, body1: &Body) -> Vec2;
    fn world_anchor2(&self, body2: &Body) -> Vec2;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn body1(&self) -> BodyHandle {
        self.base().body1()
    }

    fn body2(&self) -> BodyHandle {
        self.base().body2()
    }
}

/// Effective mass of a point-to-point constraint plus the relative angle row
pub(crate) fn point_angle_mass(body1: &Body, body2: &Body, r1: Vec2, r2: Vec2) -> Mat3 {
    let (m1, i1) = (body1.mass_inverse(), body1.inertia_inverse());
    let (m2, i2) = (body2.mass_inverse(), body2.inertia_inverse());
    let m = m1 + m2;

    let k11 = m + r1.y * r1.y * i1 + r2.y * r2.y * i2;
    let k12 = -r1.x * r1.y * i1 - r2.x * r2.y * i2;
    let k13 = -r1.y * i1 - r2.y * i2;
    let k22 = m + r1.x * r1.x * i1 + r2.x * r2.x * i2;
    let k23 = r1.x * i1 + r2.x * i2;
    let k33 = i1 + i2;

    symmetric3(k11, k12, k13, k22, k23, k33)
}

/// Soft constraint coefficients for a spring acting on effective mass `mass`.
///
/// Returns `(gamma, beta)`, both pre-divided by `dt`. The velocity bias is
/// `beta * C` and `gamma` is added to the inverse effective mass.
pub(crate) fn soft_coefficients(
    mass: Real,
    frequency_hz: Real,
    damping_ratio: Real,
    dt: Real,
) -> (Real, Real) {
    let omega = 2.0 * PI * frequency_hz;
    let k = mass * omega * omega;
    let c = mass * 2.0 * damping_ratio * omega;

    let gamma = (c + k * dt) * dt;
    let gamma = if gamma == 0.0 { 0.0 } else { 1.0 / gamma };
    (gamma, dt * k * gamma)
}

/// Apply equal and opposite velocity impulses: `-` on body 1, `+` on body 2.
///
/// `angular` is an extra pure angular impulse on top of the moment of `impulse`.
pub(crate) fn apply_velocity_impulse(
    body1: &mut Body,
    body2: &mut Body,
    r1: Vec2,
    r2: Vec2,
    impulse: Vec2,
    angular: Real,
) {
    body1.velocity -= impulse * body1.mass_inverse();
    body1.angular_velocity -= (r1.perp_dot(impulse) + angular) * body1.inertia_inverse();

    body2.velocity += impulse * body2.mass_inverse();
    body2.angular_velocity += (r2.perp_dot(impulse) + angular) * body2.inertia_inverse();
}

/// Pull two anchors together by moving the bodies directly.
///
/// Offsets are recomputed at the current angles and the 2x2 effective mass is
/// rebuilt from scratch. Returns the corrected position error.
pub(crate) fn correct_point_position(
    body1: &mut Body,
    body2: &mut Body,
    anchor1: Vec2,
    anchor2: Vec2,
    constants: &SolverConstants,
) -> Real {
    let r1 = body1.anchor_offset(anchor1);
    let r2 = body2.anchor_offset(anchor2);

    let error = (body2.position + r2) - (body1.position + r1);
    let correction = error.clamp_length_max(constants.max_linear_correction);
    let position_error = correction.length();

    let lambda = solve2x2(&point_angle_mass(body1, body2, r1, r2), -correction);

    body1.position -= lambda * body1.mass_inverse();
    body1.angle -= r1.perp_dot(lambda) * body1.inertia_inverse();

    body2.position += lambda * body2.mass_inverse();
    body2.angle += r2.perp_dot(lambda) * body2.inertia_inverse();

    position_error
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tether_core::arena::Arena;

    /// Two bodies in an arena so tests can drive joints without a space
    pub struct Pair {
        pub bodies: Arena<Body>,
        pub h1: BodyHandle,
        pub h2: BodyHandle,
    }

    impl Pair {
        pub fn new(body1: Body, body2: Body) -> Self {
            let mut bodies = Arena::new();
            let h1 = bodies.insert(body1);
            let h2 = bodies.insert(body2);
            Self { bodies, h1, h2 }
        }

        pub fn get(&mut self) -> (&mut Body, &mut Body) {
            self.bodies.get2_mut(self.h1, self.h2).unwrap()
        }

        pub fn body1(&self) -> &Body {
            self.bodies.get(self.h1).unwrap()
        }

        pub fn body2(&self) -> &Body {
            self.bodies.get(self.h2).unwrap()
        }

        /// One step the way a space runs it, without gravity or sleep
        pub fn step(&mut self, joint: &mut dyn Joint, ctx: &StepContext, velocity_iterations: u32) {
            let (b1, b2) = self.get();
            joint.init_solver(b1, b2, ctx);
            for _ in 0..velocity_iterations {
                joint.solve_velocity_constraints(b1, b2);
            }
            for body in [&mut *b1, &mut *b2] {
                if !body.is_static() {
                    body.integrate_position(ctx.dt);
                }
            }
        }
    }
}
