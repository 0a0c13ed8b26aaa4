//! Distance joint
//!
//! Holds two anchors at a fixed separation along the line between them. With a
//! positive `frequency_hz` it becomes a damped spring: the error feeds back as a
//! soft velocity bias and no position correction runs.

use std::any::Any;

use tether_core::math::{Real, Vec2, clamp};

use super::{Joint, JointBase, JointKind, StepContext, soft_coefficients};
use crate::body::{Body, BodyHandle};
use crate::config::SolverConstants;
use crate::error::{PhysicsError, Result};
use crate::space::Space;

#[derive(Debug, Clone)]
pub struct DistanceJoint {
    base: JointBase,

    anchor1: Vec2,
    anchor2: Vec2,
    rest_length: Real,

    frequency_hz: Real,
    damping_ratio: Real,

    lambda_acc: Real,

    // Step-scoped
    r1: Vec2,
    r2: Vec2,
    u: Vec2,
    s1: Real,
    s2: Real,
    em: Real,
    gamma: Real,
    beta_c: Real,
}

impl DistanceJoint {
    /// Connect two world-space anchors; their current separation is the rest length
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
            rest_length: anchor1.distance(anchor2),
            frequency_hz: 0.0,
            damping_ratio: 0.0,
            lambda_acc: 0.0,
            r1: Vec2::ZERO,
            r2: Vec2::ZERO,
            u: Vec2::ZERO,
            s1: 0.0,
            s2: 0.0,
            em: 0.0,
            gamma: 0.0,
            beta_c: 0.0,
        }
    }

    /// Connect two world-space anchors on bodies of `space`
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

    /// Turn the joint into a spring.
    ///
    /// Keep `frequency_hz` well under a quarter of the step rate.
    pub fn with_spring(mut self, frequency_hz: Real, damping_ratio: Real) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    /// Override the rest length taken from the anchors
    pub fn with_rest_length(mut self, rest_length: Real) -> Self {
        self.rest_length = rest_length;
        self
    }

    /// Cap the reaction force; a breakable joint is removed when it exceeds the cap
    pub fn with_max_force(mut self, max_force: Real, breakable: bool) -> Self {
        self.base.max_force = max_force;
        self.base.breakable = breakable;
        self
    }

    /// Move the first anchor; the rest length becomes the new separation
    pub fn set_world_anchor1(&mut self, body1: &Body, body2: &Body, anchor: Vec2) {
        self.anchor1 = body1.local_point(anchor);
        self.rest_length = anchor.distance(self.world_anchor2(body2));
    }

    /// Move the second anchor; the rest length becomes the new separation
    pub fn set_world_anchor2(&mut self, body1: &Body, body2: &Body, anchor: Vec2) {
        self.anchor2 = body2.local_point(anchor);
        self.rest_length = anchor.distance(self.world_anchor1(body1));
    }

    /// Get the rest length
    pub fn rest_length(&self) -> Real {
        self.rest_length
    }

    /// Set the rest length
    pub fn set_rest_length(&mut self, rest_length: Real) {
        self.rest_length = rest_length;
    }

    /// Get the spring frequency in Hz; zero means rigid
    pub fn frequency_hz(&self) -> Real {
        self.frequency_hz
    }

    /// Get the spring damping ratio
    pub fn damping_ratio(&self) -> Real {
        self.damping_ratio
    }

    /// Set the spring frequency in Hz
    pub fn set_spring_frequency_hz(&mut self, frequency_hz: Real) {
        self.frequency_hz = frequency_hz;
    }

    /// Set the spring damping ratio
    pub fn set_spring_damping_ratio(&mut self, damping_ratio: Real) {
        self.damping_ratio = damping_ratio;
    }

    /// Whether the joint behaves as a spring
    pub fn is_soft(&self) -> bool {
        self.frequency_hz > 0.0
    }

    /// Current anchor separation
    pub fn current_length(&self, body1: &Body, body2: &Body) -> Real {
        self.world_anchor1(body1).distance(self.world_anchor2(body2))
    }

    fn apply_impulse(&self, body1: &mut Body, body2: &mut Body, lambda: Real) {
        let impulse = self.u * lambda;

        body1.velocity -= impulse * body1.mass_inverse();
        body1.angular_velocity -= self.s1 * lambda * body1.inertia_inverse();

        body2.velocity += impulse * body2.mass_inverse();
        body2.angular_velocity += self.s2 * lambda * body2.inertia_inverse();
    }
}

impl Joint for DistanceJoint {
    fn base(&self) -> &JointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut JointBase {
        &mut self.base
    }

    fn kind(&self) -> JointKind {
        JointKind::Distance
    }

    fn init_solver(&mut self, body1: &mut Body, body2: &mut Body, ctx: &StepContext) {
        let dt = ctx.dt;
        self.base.begin_step(dt);

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

        let mut em_inv = body1.mass_inverse()
            + body2.mass_inverse()
            + body1.inertia_inverse() * self.s1 * self.s1
            + body2.inertia_inverse() * self.s2 * self.s2;
        self.em = if em_inv == 0.0 { 0.0 } else { 1.0 / em_inv };

        if self.is_soft() {
            let (gamma, beta) =
                soft_coefficients(self.em, self.frequency_hz, self.damping_ratio, dt);
            self.gamma = gamma;
            self.beta_c = beta * (dist - self.rest_length);

            em_inv += self.gamma;
            self.em = if em_inv == 0.0 { 0.0 } else { 1.0 / em_inv };
        } else {
            self.gamma = 0.0;
            self.beta_c = 0.0;
        }

        if ctx.warm_starting {
            self.apply_impulse(body1, body2, self.lambda_acc);
        } else {
            self.lambda_acc = 0.0;
        }
    }

    fn solve_velocity_constraints(&mut self, body1: &mut Body, body2: &mut Body) {
        let cdot = self.u.dot(body2.velocity - body1.velocity) + self.s2 * body2.angular_velocity
            - self.s1 * body1.angular_velocity;
        let soft = self.beta_c + self.gamma * self.lambda_acc;
        let lambda = -self.em * (cdot + soft);

        self.lambda_acc += lambda;
        self.apply_impulse(body1, body2, lambda);
    }

    fn solve_position_constraints(
        &mut self,
        body1: &mut Body,
        body2: &mut Body,
        constants: &SolverConstants,
    ) -> bool {
        if self.is_soft() {
            return true;
        }

        let r1 = body1.anchor_offset(self.anchor1);
        let r2 = body2.anchor_offset(self.anchor2);

        let d = (body2.position + r2) - (body1.position + r1);
        let dist = d.length();
        // Coincident anchors give no direction to push along
        let u = if dist > 0.0 { d / dist } else { Vec2::ZERO };

        let c = dist - self.rest_length;
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
