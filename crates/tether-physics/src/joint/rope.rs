//! Rope joint
//!
//! Keeps the anchor separation inside `[min_length, max_length]`. Inside the
//! range the joint is slack: no impulses, always converged. Outside it acts as
//! a one-sided distance constraint that may only push back toward the range.

use std::any::Any;

use tether_core::math::{Real, Vec2, clamp};

use super::{Joint, JointBase, JointKind, LimitState, StepContext};
use crate::body::{Body, BodyHandle};
use crate::config::SolverConstants;
use crate::error::{PhysicsError, Result};
use crate::space::Space;

#[derive(Debug, Clone)]
pub struct RopeJoint {
    base: JointBase,

    anchor1: Vec2,
    anchor2: Vec2,
    min_length: Real,
    max_length: Real,

    lambda_acc: Real,
    state: LimitState,

    // Step-scoped
    r1: Vec2,
    r2: Vec2,
    u: Vec2,
    s1: Real,
    s2: Real,
    em: Real,
}

impl RopeJoint {
    /// Tie two world-space anchors together; the current separation is the
    /// maximum length and there is no minimum.
    pub fn from_bodies(
        handle1: BodyHandle,
        body1: &Body,
        handle2: BodyHandle,
        body2: &Body,
        anchor1: Vec2,
        anchor2: Vec2,
    ) -> Self {
        Self {
            base: JointBase::new(handle1, handle2),
            anchor1: body1.local_point(anchor1),
            anchor2: body2.local_point(anchor2),
            min_length: 0.0,
            max_length: anchor1.distance(anchor2),
            lambda_acc: 0.0,
            state: LimitState::Inactive,
            r1: Vec2::ZERO,
            r2: Vec2::ZERO,
            u: Vec2::ZERO,
            s1: 0.0,
            s2: 0.0,
            em: 0.0,
        }
    }

    /// Tie two world-space anchors on bodies of `space`
    pub fn new(
        space: &Space,
        body1: BodyHandle,
        body2: BodyHandle,
        anchor1: Vec2,
        anchor2: Vec2,
    ) -> Result<Self> {
        let b1 = space.body(body1).ok_or(PhysicsError::BodyNotFound(body1))?;
        let b2 = space.body(body2).ok_or(PhysicsError::BodyNotFound(body2))?;
        Ok(Self::from_bodies(body1, b1, body2, b2, anchor1, anchor2))
    }

    /// Set the allowed separation range; the bounds are reordered if given backwards
    pub fn with_range(mut self, min_length: Real, max_length: Real) -> Self {
        self.set_range(min_length, max_length);
        self
    }

    /// Cap the reaction force; a breakable joint is removed when it exceeds the cap
    pub fn with_max_force(mut self, max_force: Real, breakable: bool) -> Self {
        self.base.max_force = max_force;
        self.base.breakable = breakable;
        self
    }

    /// Set the allowed separation range, clamping the minimum at zero
    pub fn set_range(&mut self, min_length: Real, max_length: Real) {
        self.min_length = min_length.min(max_length).max(0.0);
        self.max_length = min_length.max(max_length);
    }

    /// Get the minimum separation
    pub fn min_length(&self) -> Real {
        self.min_length
    }

    /// Get the maximum separation
    pub fn max_length(&self) -> Real {
        self.max_length
    }

    /// Which bound was violated at the last `init_solver`
    pub fn state(&self) -> LimitState {
        self.state
    }

    /// Check if either bound was active at the last `init_solver`
    pub fn is_taut(&self) -> bool {
        self.state != LimitState::Inactive
    }

    /// Current anchor separation
    pub fn current_length(&self, body1: &Body, body2: &Body) -> Real {
        self.world_anchor1(body1).distance(self.world_anchor2(body2))
    }

    fn classify(&self, dist: Real) -> LimitState {
        if self.max_length - self.min_length <= 0.0 {
            LimitState::EqualLimits
        } else if dist < self.min_length {
            LimitState::AtLower
        } else if dist > self.max_length {
            LimitState::AtUpper
        } else {
            LimitState::Inactive
        }
    }

    fn apply_impulse(&self, body1: &mut Body, body2: &mut Body, lambda: Real) {
        let impulse = self.u * lambda;

        body1.velocity -= impulse * body1.mass_inverse();
        body1.angular_velocity -= self.s1 * lambda * body1.inertia_inverse();

        body2.velocity += impulse * body2.mass_inverse();
        body2.angular_velocity += self.s2 * lambda * body2.inertia_inverse();
    }
}

impl Joint for RopeJoint {
    fn base(&self) -> &JointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut JointBase {
        &mut self.base
    }

    fn kind(&self) -> JointKind {
        JointKind::Rope
    }

    fn init_solver(&mut self, body1: &mut Body, body2: &mut Body, ctx: &StepContext) {
        self.base.begin_step(ctx.dt);

        self.r1 = body1.anchor_offset(self.anchor1);
        self.r2 = body2.anchor_offset(self.anchor2);

        let d = (body2.position + self.r2) - (body1.position + self.r1);
        let dist = d.length();
        self.u = if dist > ctx.constants.linear_slop {
            d / dist
        } else {
            Vec2::ZERO
        };

        self.s1 = self.r1.perp_dot(self.u);
        self.s2 = self.r2.perp_dot(self.u);

        let em_inv = body1.mass_inverse()
            + body2.mass_inverse()
            + body1.inertia_inverse() * self.s1 * self.s1
            + body2.inertia_inverse() * self.s2 * self.s2;
        self.em = if em_inv == 0.0 { 0.0 } else { 1.0 / em_inv };

        let state = self.classify(dist);
        if state != self.state {
            self.lambda_acc = 0.0;
        }
        self.state = state;

        if self.state == LimitState::Inactive || !ctx.warm_starting {
            self.lambda_acc = 0.0;
        } else {
            self.apply_impulse(body1, body2, self.lambda_acc);
        }
    }

    fn solve_velocity_constraints(&mut self, body1: &mut Body, body2: &mut Body) {
        if self.state == LimitState::Inactive {
            return;
        }

        let cdot = self.u.dot(body2.velocity - body1.velocity) + self.s2 * body2.angular_velocity
            - self.s1 * body1.angular_velocity;
        let lambda = -self.em * cdot;

        // Stretched ropes may only pull, compressed ones only push
        let old = self.lambda_acc;
        self.lambda_acc = match self.state {
            LimitState::AtUpper => (old + lambda).min(0.0),
            LimitState::AtLower => (old + lambda).max(0.0),
            _ => old + lambda,
        };

        let applied = self.lambda_acc - old;
        self.apply_impulse(body1, body2, applied);
    }

    fn solve_position_constraints(
        &mut self,
        body1: &mut Body,
        body2: &mut Body,
        constants: &SolverConstants,
    ) -> bool {
        if self.state == LimitState::Inactive {
            return true;
        }

        let r1 = body1.anchor_offset(self.anchor1);
        let r2 = body2.anchor_offset(self.anchor2);

        let d = (body2.position + r2) - (body1.position + r1);
        let dist = d.length();
        let u = if dist > 0.0 { d / dist } else { Vec2::ZERO };

        let c = if dist < self.min_length {
            dist - self.min_length
        } else if dist > self.max_length {
            dist - self.max_length
        } else {
            0.0
        };
        let max = constants.max_linear_correction;
        let correction = clamp(c, -max, max);

        let s1 = r1.perp_dot(u);
        let s2 = r2.perp_dot(u);
        let em_inv = body1.mass_inverse()
            + body2.mass_inverse()
            + body1.inertia_inverse() * s1 * s1
            + body2.inertia_inverse() * s2 * s2;
        let lambda_dt = if em_inv == 0.0 { 0.0 } else { -correction / em_inv };

        let impulse_dt = u * lambda_dt;
        body1.position -= impulse_dt * body1.mass_inverse();
        body1.angle -= s1 * lambda_dt * body1.inertia_inverse();
        body2.position += impulse_dt * body2.mass_inverse();
        body2.angle += s2 * lambda_dt * body2.inertia_inverse();

        c.abs() < constants.linear_slop
    }

    fn reaction_force(&self, dt_inv: Real) -> Vec2 {
        self.u * (self.lambda_acc * dt_inv)
    }

    fn reaction_torque(&self, _dt_inv: Real) -> Real {
        0.0
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
