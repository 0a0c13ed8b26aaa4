//! Weld joint
//!
//! A shared anchor and a locked relative angle. Rigid welds solve both as one
//! 3x3 block. With a positive `frequency_hz` the angular row becomes a damped
//! torsional spring: it is solved on its own with a soft bias and only the
//! point block is corrected in the position pass.

use std::any::Any;

use tether_core::math::{Mat3, Real, Solve, Vec2, Vec3, clamp, solve2x2};

use super::{
    Joint, JointBase, JointKind, StepContext, apply_velocity_impulse, correct_point_position,
    point_angle_mass, soft_coefficients,
};
use crate::body::{Body, BodyHandle};
use crate::config::SolverConstants;
use crate::error::{PhysicsError, Result};
use crate::space::Space;

#[derive(Debug, Clone)]
pub struct WeldJoint {
    base: JointBase,

    anchor1: Vec2,
    anchor2: Vec2,
    ref_angle: Real,

    frequency_hz: Real,
    damping_ratio: Real,

    lambda_acc: Vec3,

    // Step-scoped
    r1: Vec2,
    r2: Vec2,
    em_inv: Mat3,
    em2: Real,
    gamma: Real,
    bias: Real,
}

impl WeldJoint {
    /// Weld two bodies at a world-space anchor, locking their current relative angle
    pub fn from_bodies(
        handle1: BodyHandle,
        body1: &Body,
        handle2: BodyHandle,
        body2: &Body,
        anchor: Vec2,
    ) -> Self {
        Self {
            base: JointBase::new(handle1, handle2),
            anchor1: body1.local_point(anchor),
            anchor2: body2.local_point(anchor),
            ref_angle: body2.angle - body1.angle,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
            lambda_acc: Vec3::ZERO,
            r1: Vec2::ZERO,
            r2: Vec2::ZERO,
            em_inv: Mat3::ZERO,
            em2: 0.0,
            gamma: 0.0,
            bias: 0.0,
        }
    }

    /// Create from two bodies in a space, welded at a world anchor
    pub fn new(space: &Space, body1: BodyHandle, body2: BodyHandle, anchor: Vec2) -> Result<Self> {
        let b1 = space.body(body1).ok_or(PhysicsError::BodyNotFound(body1))?;
        let b2 = space.body(body2).ok_or(PhysicsError::BodyNotFound(body2))?;
        Ok(Self::from_bodies(body1, b1, body2, b2, anchor))
    }

    /// Let the angle flex as a damped spring
    pub fn with_spring(mut self, frequency_hz: Real, damping_ratio: Real) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    /// Set the force limit and whether exceeding it breaks the joint
    pub fn with_max_force(mut self, max_force: Real, breakable: bool) -> Self {
        self.base.max_force = max_force;
        self.base.breakable = breakable;
        self
    }

    /// Get the relative angle captured at creation
    pub fn ref_angle(&self) -> Real {
        self.ref_angle
    }

    /// Get the deviation from the welded angle
    pub fn relative_angle(&self, body1: &Body, body2: &Body) -> Real {
        body2.angle - body1.angle - self.ref_angle
    }

    /// Get the accumulated point and angle impulse
    pub fn accumulated_impulse(&self) -> Vec3 {
        self.lambda_acc
    }

    /// Get the angular spring frequency in Hz; zero means rigid
    pub fn frequency_hz(&self) -> Real {
        self.frequency_hz
    }

    /// Get the angular spring damping ratio
    pub fn damping_ratio(&self) -> Real {
        self.damping_ratio
    }

    /// Set the angular spring frequency in Hz
    pub fn set_spring_frequency_hz(&mut self, frequency_hz: Real) {
        self.frequency_hz = frequency_hz;
    }

    /// Set the angular spring damping ratio
    pub fn set_spring_damping_ratio(&mut self, damping_ratio: Real) {
        self.damping_ratio = damping_ratio;
    }

    /// Check if the angle is held by a spring
    pub fn is_soft(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

impl Joint for WeldJoint {
    fn base(&self) -> &JointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut JointBase {
        &mut self.base
    }

    fn kind(&self) -> JointKind {
        JointKind::Weld
    }

    fn init_solver(&mut self, body1: &mut Body, body2: &mut Body, ctx: &StepContext) {
        self.base.begin_step(ctx.dt);

        self.r1 = body1.anchor_offset(self.anchor1);
        self.r2 = body2.anchor_offset(self.anchor2);
        self.em_inv = point_angle_mass(body1, body2, self.r1, self.r2);

        if self.is_soft() {
            let k33 = self.em_inv.z_axis.z;
            let em = if k33 == 0.0 { 0.0 } else { 1.0 / k33 };
            let (gamma, beta) =
                soft_coefficients(em, self.frequency_hz, self.damping_ratio, ctx.dt);
            self.gamma = gamma;
            self.bias = beta * self.relative_angle(body1, body2);

            let k33 = k33 + gamma;
            self.em2 = if k33 == 0.0 { 0.0 } else { 1.0 / k33 };
        } else {
            self.em2 = 0.0;
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if ctx.warm_starting {
            let lambda_xy = Vec2::new(self.lambda_acc.x, self.lambda_acc.y);
            apply_velocity_impulse(body1, body2, self.r1, self.r2, lambda_xy, self.lambda_acc.z);
        } else {
            self.lambda_acc = Vec3::ZERO;
        }
    }

    fn solve_velocity_constraints(&mut self, body1: &mut Body, body2: &mut Body) {
        if self.is_soft() {
            let cdot2 = body2.angular_velocity - body1.angular_velocity;
            let lambda2 = -self.em2 * (cdot2 + self.bias + self.gamma * self.lambda_acc.z);
            self.lambda_acc.z += lambda2;
            apply_velocity_impulse(body1, body2, self.r1, self.r2, Vec2::ZERO, lambda2);

            let v1 = body1.velocity + self.r1.perp() * body1.angular_velocity;
            let v2 = body2.velocity + self.r2.perp() * body2.angular_velocity;
            let lambda1 = solve2x2(&self.em_inv, -(v2 - v1));
            self.lambda_acc.x += lambda1.x;
            self.lambda_acc.y += lambda1.y;
            apply_velocity_impulse(body1, body2, self.r1, self.r2, lambda1, 0.0);
            return;
        }

        let v1 = body1.velocity + self.r1.perp() * body1.angular_velocity;
        let v2 = body2.velocity + self.r2.perp() * body2.angular_velocity;
        let cdot1 = v2 - v1;
        let cdot2 = body2.angular_velocity - body1.angular_velocity;

        let lambda = self.em_inv.solve(-Vec3::new(cdot1.x, cdot1.y, cdot2));
        self.lambda_acc += lambda;

        apply_velocity_impulse(
            body1,
            body2,
            self.r1,
            self.r2,
            Vec2::new(lambda.x, lambda.y),
            lambda.z,
        );
    }

    fn solve_position_constraints(
        &mut self,
        body1: &mut Body,
        body2: &mut Body,
        constants: &SolverConstants,
    ) -> bool {
        let mut angular_error = 0.0;

        // A soft angle is left to its spring
        if !self.is_soft() {
            let max = constants.max_angular_correction;
            let c = clamp(self.relative_angle(body1, body2), -max, max);
            angular_error = c.abs();

            let k33 = body1.inertia_inverse() + body2.inertia_inverse();
            let impulse = if k33 != 0.0 { -c / k33 } else { 0.0 };
            body1.angle -= impulse * body1.inertia_inverse();
            body2.angle += impulse * body2.inertia_inverse();
        }

        let position_error =
            correct_point_position(body1, body2, self.anchor1, self.anchor2, constants);

        position_error < constants.linear_slop && angular_error < constants.angular_slop
    }
    fn reaction_force(&self, dt_inv: Real) -> Vec2 {
        Vec2::new(self.lambda_acc.x, self.lambda_acc.y) * dt_inv
    }

    fn reaction_torque(&self, dt_inv: Real) -> Real {
        self.lambda_acc.z * dt_inv
    }

    fn world_anchor1(&self, body1: &Body) -> Vec2 {
        body1.world_point(self.anchor1)
    }

    fn world_anchor2(&self, body2: &Body) -> Vec2 {
        body2.world_point(self.anchor2)
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

    fn welded() -> (Pair, WeldJoint) {
        let pair = Pair::new(
            Body::dynamic(Vec2::ZERO),
            Body::dynamic(Vec2::new(1.0, 0.0)).with_angle(0.25),
        );
        let joint = WeldJoint::from_bodies(
            pair.h1,
            pair.body1(),
            pair.h2,
            pair.body2(),
            Vec2::new(0.5, 0.0),
        );
        (pair, joint)
    }

    #[test]
    fn test_reference_angle() {
        let (pair, joint) = welded();
        assert_eq!(joint.ref_angle(), 0.25);
        assert_eq!(joint.relative_angle(pair.body1(), pair.body2()), 0.0);
        assert_eq!(joint.kind(), JointKind::Weld);
    }

    #[test]
    fn test_relative_motion_is_removed() {
        let (mut pair, mut joint) = welded();
        {
            let (_, b2) = pair.get();
            b2.angular_velocity = 3.0;
            b2.velocity = Vec2::new(0.0, -1.0);
        }

        let ctx = StepContext::new(1.0 / 60.0, true, SolverConstants::default());
        let (b1, b2) = pair.get();
        joint.init_solver(b1, b2, &ctx);
        joint.solve_velocity_constraints(b1, b2);

        assert!((b2.angular_velocity - b1.angular_velocity).abs() < 1e-12);
        let anchor = joint.world_anchor1(b1);
        assert!((b2.velocity_at(anchor) - b1.velocity_at(anchor)).length() < 1e-12);
        assert!(joint.reaction_torque(ctx.dt_inv) != 0.0);
    }

    #[test]
    fn test_position_solve_restores_angle() {
        let (mut pair, mut joint) = welded();
        pair.get().1.angle = 0.35;
        let constants = SolverConstants::default();

        let (b1, b2) = pair.get();
        let mut solved = false;
        for _ in 0..10 {
            if joint.solve_position_constraints(b1, b2, &constants) {
                solved = true;
                break;
            }
        }
        assert!(solved);
        assert!(joint.relative_angle(b1, b2).abs() < constants.angular_slop);
        let gap = joint.world_anchor2(b2) - joint.world_anchor1(b1);
        assert!(gap.length() < constants.linear_slop);
    }

    #[test]
    fn test_soft_weld_leaves_angle_to_the_spring() {
        let mut pair = Pair::new(Body::dynamic(Vec2::ZERO), Body::dynamic(Vec2::new(1.0, 0.0)));
        let anchor = Vec2::new(1.0, 0.0);
        let mut joint = WeldJoint::from_bodies(pair.h1, pair.body1(), pair.h2, pair.body2(), anchor)
            .with_spring(2.0, 0.7);
        assert!(joint.is_soft());
        pair.get().1.angle = 0.75;

        let (b1, b2) = pair.get();
        assert!(joint.solve_position_constraints(b1, b2, &SolverConstants::default()));
        assert_eq!(b1.angle, 0.0);
        assert_eq!(b2.angle, 0.75);
    }

    #[test]
    fn test_soft_weld_springs_back() {
        let mut pair = Pair::new(Body::new_static(Vec2::ZERO), Body::dynamic(Vec2::new(1.0, 0.0)));
        let mut joint =
            WeldJoint::from_bodies(pair.h1, pair.body1(), pair.h2, pair.body2(), Vec2::ZERO)
                .with_spring(1.0, 0.1);
        {
            let (_, b2) = pair.get();
            b2.angle = 0.5;
            b2.position = Vec2::from_angle(0.5);
        }

        let ctx = StepContext::new(1.0 / 60.0, true, SolverConstants::default());
        let mut lowest: Real = 0.5;
        for _ in 0..60 {
            pair.step(&mut joint, &ctx, 8);
            let (b1, b2) = pair.get();
            joint.solve_position_constraints(b1, b2, &ctx.constants);
            lowest = lowest.min(joint.relative_angle(b1, b2));
        }

        // Lightly damped: the angle swings through zero while the pin holds
        assert!(lowest < 0.0);
        let gap = joint.world_anchor2(pair.body2()) - joint.world_anchor1(pair.body1());
        assert!(gap.length() < 1e-3);
    }
}
