//! Damped spring
//!
//! An explicit Hooke spring between two anchors. The spring impulse is applied
//! once per step in `init_solver`; the velocity iterations then bleed off a
//! fixed fraction of the relative velocity along the spring axis. Nothing is
//! corrected in the position pass and the joint never warm starts.

use std::any::Any;

use tether_core::math::{Real, Vec2};

use super::{Joint, JointBase, JointKind, StepContext};
use crate::body::{Body, BodyHandle};
use crate::config::SolverConstants;
use crate::error::{PhysicsError, Result};
use crate::space::Space;

#[derive(Debug, Clone)]
pub struct SpringJoint {
    base: JointBase,

    anchor1: Vec2,
    anchor2: Vec2,
    rest_length: Real,
    stiffness: Real,
    damping: Real,

    // Step-scoped
    r1: Vec2,
    r2: Vec2,
    u: Vec2,
    s1: Real,
    s2: Real,
    em: Real,
    spring_impulse: Real,
    target_rnv: Real,
    v_coeff: Real,
}

impl SpringJoint {
    /// Connect two world-space anchors with a spring resting at their current
    /// separation. Connected bodies keep colliding.
    pub fn from_bodies(
        handle1: BodyHandle,
        body1: &Body,
        handle2: BodyHandle,
        body2: &Body,
        anchor1: Vec2,
        anchor2: Vec2,
    ) -> Self {
        let mut base = JointBase::new(handle1, handle2);
        base.collide_connected = true;

        Self {
            base,
            anchor1: body1.local_point(anchor1),
            anchor2: body2.local_point(anchor2),
            rest_length: anchor1.distance(anchor2),
            stiffness: 0.0,
            damping: 0.0,
            r1: Vec2::ZERO,
            r2: Vec2::ZERO,
            u: Vec2::ZERO,
            s1: 0.0,
            s2: 0.0,
            em: 0.0,
            spring_impulse: 0.0,
            target_rnv: 0.0,
            v_coeff: 0.0,
        }
    }

    /// Create from two bodies in a space
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

    /// Set the spring constant (force per unit stretch) and the damping rate
    pub fn with_spring(mut self, stiffness: Real, damping: Real) -> Self {
        self.stiffness = stiffness;
        self.damping = damping;
        self
    }

    /// Set the rest length
    pub fn with_rest_length(mut self, rest_length: Real) -> Self {
        self.rest_length = rest_length;
        self
    }

    /// Set the force limit and whether exceeding it breaks the joint
    pub fn with_max_force(mut self, max_force: Real, breakable: bool) -> Self {
        self.base.max_force = max_force;
        self.base.breakable = breakable;
        self
    }

    /// Get the rest length
    pub fn rest_length(&self) -> Real {
        self.rest_length
    }

    /// Set the rest length
    pub fn set_rest_length(&mut self, rest_length: Real) {
        self.rest_length = rest_length;
    }

    /// Get the spring constant
    pub fn stiffness(&self) -> Real {
        self.stiffness
    }

    /// Set the spring constant
    pub fn set_stiffness(&mut self, stiffness: Real) {
        self.stiffness = stiffness;
    }

    /// Get the damping rate
    pub fn damping(&self) -> Real {
        self.damping
    }

    /// Set the damping rate
    pub fn set_damping(&mut self, damping: Real) {
        self.damping = damping;
    }

    /// Get the current distance between the world anchors
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

impl Joint for SpringJoint {
    fn base(&self) -> &JointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut JointBase {
        &mut self.base
    }

    fn kind(&self) -> JointKind {
        JointKind::Spring
    }

    fn init_solver(&mut self, body1: &mut Body, body2: &mut Body, ctx: &StepContext) {
        let dt = ctx.dt;
        self.base.begin_step(dt);

        self.r1 = body1.anchor_offset(self.anchor1);
        self.r2 = body2.anchor_offset(self.anchor2);

        let d = (body2.position + self.r2) - (body1.position + self.r1);
        let dist = d.length();
        self.u = if dist > 0.0 { d / dist } else { Vec2::ZERO };

        self.s1 = self.r1.perp_dot(self.u);
        self.s2 = self.r2.perp_dot(self.u);

        let em_inv = body1.mass_inverse()
            + body2.mass_inverse()
            + body1.inertia_inverse() * self.s1 * self.s1
            + body2.inertia_inverse() * self.s2 * self.s2;
        self.em = if em_inv == 0.0 { 0.0 } else { 1.0 / em_inv };

        self.target_rnv = 0.0;
        self.v_coeff = 1.0 - (-self.damping * dt * em_inv).exp();

        // Negative when stretched, pulling the anchors together
        self.spring_impulse = (self.rest_length - dist) * self.stiffness * dt;
        self.apply_impulse(body1, body2, self.spring_impulse);
    }

    fn solve_velocity_constraints(&mut self, body1: &mut Body, body2: &mut Body) {
        let cdot = self.u.dot(body2.velocity - body1.velocity) + self.s2 * body2.angular_velocity
            - self.s1 * body1.angular_velocity;
        let rnv = cdot + self.target_rnv;

        let v_damp = rnv * self.v_coeff;
        self.target_rnv = -rnv + v_damp;

        let lambda = -self.em * v_damp;
        self.apply_impulse(body1, body2, lambda);
    }

    fn solve_position_constraints(
        &mut self,
        _body1: &mut Body,
        _body2: &mut Body,
        _constants: &SolverConstants,
    ) -> bool {
        true
    }

    fn reaction_force(&self, dt_inv: Real) -> Vec2 {
        self.u * (self.spring_impulse * dt_inv)
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
