//! Angle joint: locks the relative angle of two bodies and leaves their positions free.

use std::any::Any;

use tether_core::math::{Real, Vec2, clamp};

use super::{Joint, JointBase, JointKind, StepContext};
use crate::body::{Body, BodyHandle};
use crate::config::SolverConstants;
use crate::error::{PhysicsError, Result};
use crate::space::Space;

#[derive(Debug, Clone)]
pub struct AngleJoint {
    base: JointBase,

    ref_angle: Real,
    lambda_acc: Real,

    // Step-scoped
    em: Real,
}

impl AngleJoint {
    /// Lock the current relative angle of two bodies
    pub fn from_bodies(handle1: BodyHandle, body1: &Body, handle2: BodyHandle, body2: &Body) -> Self {
        Self {
            base: JointBase::new(handle1, handle2),
            ref_angle: body2.angle - body1.angle,
            lambda_acc: 0.0,
            em: 0.0,
        }
    }

    /// Create from two bodies in a space
    pub fn new(space: &Space, body1: BodyHandle, body2: BodyHandle) -> Result<Self> {
        let b1 = space.body(body1).ok_or(PhysicsError::BodyNotFound(body1))?;
        let b2 = space.body(body2).ok_or(PhysicsError::BodyNotFound(body2))?;
        Ok(Self::from_bodies(body1, b1, body2, b2))
    }

    /// Set the force limit and whether exceeding it breaks the joint
    pub fn with_max_force(mut self, max_force: Real, breakable: bool) -> Self {
        self.base.max_force = max_force;
        self.base.breakable = breakable;
        self
    }

    /// Get the relative angle being held
    pub fn ref_angle(&self) -> Real {
        self.ref_angle
    }

    /// Set the relative angle to hold
    pub fn set_ref_angle(&mut self, ref_angle: Real) {
        self.ref_angle = ref_angle;
    }

    /// Get the deviation from the held angle
    pub fn relative_angle(&self, body1: &Body, body2: &Body) -> Real {
        body2.angle - body1.angle - self.ref_angle
    }

    fn apply_impulse(body1: &mut Body, body2: &mut Body, lambda: Real) {
        body1.angular_velocity -= lambda * body1.inertia_inverse();
        body2.angular_velocity += lambda * body2.inertia_inverse();
    }
}

impl Joint for AngleJoint {
    fn base(&self) -> &JointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut JointBase {
        &mut self.base
    }

    fn kind(&self) -> JointKind {
        JointKind::Angle
    }

    fn init_solver(&mut self, body1: &mut Body, body2: &mut Body, ctx: &StepContext) {
        self.base.begin_step(ctx.dt);

        let em_inv = body1.inertia_inverse() + body2.inertia_inverse();
        self.em = if em_inv == 0.0 { 0.0 } else { 1.0 / em_inv };

        if ctx.warm_starting {
            Self::apply_impulse(body1, body2, self.lambda_acc);
        } else {
            self.lambda_acc = 0.0;
        }
    }

    fn solve_velocity_constraints(&mut self, body1: &mut Body, body2: &mut Body) {
        let cdot = body2.angular_velocity - body1.angular_velocity;
        let lambda = -self.em * cdot;

        self.lambda_acc += lambda;
        Self::apply_impulse(body1, body2, lambda);
    }

    fn solve_position_constraints(
        &mut self,
        body1: &mut Body,
        body2: &mut Body,
        constants: &SolverConstants,
    ) -> bool {
        let c = self.relative_angle(body1, body2);
        let max = constants.max_angular_correction;
        let correction = clamp(c, -max, max);

        let em_inv = body1.inertia_inverse() + body2.inertia_inverse();
        let lambda_dt = if em_inv == 0.0 { 0.0 } else { -correction / em_inv };
        body1.angle -= lambda_dt * body1.inertia_inverse();
        body2.angle += lambda_dt * body2.inertia_inverse();

        c.abs() < constants.angular_slop
    }

    fn reaction_force(&self, _dt_inv: Real) -> Vec2 {
        Vec2::ZERO
    }

    fn reaction_torque(&self, dt_inv: Real) -> Real {
        self.lambda_acc * dt_inv
    }

    fn world_anchor1(&self, body1: &Body) -> Vec2 {
        body1.position
    }

    fn world_anchor2(&self, body2: &Body) -> Vec2 {
        body2.position
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joint::test_support::Pair;

    fn locked() -> (Pair, AngleJoint) {
        let pair = Pair::new(
            Body::dynamic(Vec2::ZERO).with_inertia(2.0),
            Body::dynamic(Vec2::new(4.0, 1.0)).with_angle(0.5),
        );
        let joint = AngleJoint::from_bodies(pair.h1, pair.body1(), pair.h2, pair.body2());
        (pair, joint)
    }

    #[test]
    fn test_reference_angle() {
        let (pair, joint) = locked();
        assert_eq!(joint.ref_angle(), 0.5);
        assert_eq!(joint.relative_angle(pair.body1(), pair.body2()), 0.0);
        assert_eq!(joint.kind(), JointKind::Angle);
        assert_eq!(joint.world_anchor2(pair.body2()), Vec2::new(4.0, 1.0));
    }

    #[test]
    fn test_relative_spin_is_removed_and_momentum_kept() {
        let (mut pair, mut joint) = locked();
        {
            let (b1, b2) = pair.get();
            b1.angular_velocity = 1.0;
            b2.angular_velocity = -2.0;
            b2.velocity = Vec2::new(3.0, 0.0);
        }

        let ctx = StepContext::new(1.0 / 60.0, true, SolverConstants::default());
        let (b1, b2) = pair.get();
        joint.init_solver(b1, b2, &ctx);
        joint.solve_velocity_constraints(b1, b2);

        assert!((b2.angular_velocity - b1.angular_velocity).abs() < 1e-12);
        // Angular momentum 2 * 1 + 1 * -2 = 0 before and after
        assert!((2.0 * b1.angular_velocity + b2.angular_velocity).abs() < 1e-12);
        // Linear motion is untouched
        assert_eq!(b2.velocity, Vec2::new(3.0, 0.0));
        assert!(joint.reaction_force(ctx.dt_inv) == Vec2::ZERO);
        assert!(joint.reaction_torque(ctx.dt_inv) > 0.0);
    }

    #[test]
    fn test_position_solve_restores_angle() {
        let (mut pair, mut joint) = locked();
        pair.get().1.angle = 0.9;
        let constants = SolverConstants::default();

        let (b1, b2) = pair.get();
        // 0.4 rad is beyond one clamped correction
        assert!(!joint.solve_position_constraints(b1, b2, &constants));
        for _ in 0..4 {
            joint.solve_position_constraints(b1, b2, &constants);
        }
        assert!(joint.solve_position_constraints(b1, b2, &constants));
        assert!(joint.relative_angle(b1, b2).abs() < constants.angular_slop);
        assert_eq!(b2.position, Vec2::new(4.0, 1.0));
    }

    #[test]
    fn test_static_partner_takes_nothing() {
        let mut pair = Pair::new(Body::new_static(Vec2::ZERO), Body::dynamic(Vec2::X));
        let mut joint = AngleJoint::from_bodies(pair.h1, pair.body1(), pair.h2, pair.body2());
        pair.get().1.angular_velocity = 5.0;

        let ctx = StepContext::new(1.0 / 60.0, false, SolverConstants::default());
        let (b1, b2) = pair.get();
        joint.init_solver(b1, b2, &ctx);
        joint.solve_velocity_constraints(b1, b2);

        assert_eq!(b1.angular_velocity, 0.0);
        assert!(b2.angular_velocity.abs() < 1e-12);
    }
}
