//! Revolute joint
//!
//! Pins two bodies together at a shared anchor while leaving the relative
//! rotation free. Optional features:
//! - Angle limit `[lower, upper]` on `body2.angle - body1.angle - ref_angle`,
//!   enforced one-sidedly with an active-set correction
//! - Motor driving the relative angular velocity to a target speed under a
//!   torque budget
//!
//! The point constraint and an active limit are solved together as one 3x3
//! block. When a one-sided limit would start pulling, the angular row is
//! released and only the 2x2 point block is solved.

use std::any::Any;

use tether_core::math::{Mat3, Real, Solve, Vec2, Vec3, clamp, solve2x2};

use super::{
    Joint, JointBase, JointKind, LimitState, StepContext, apply_velocity_impulse,
    correct_point_position, point_angle_mass,
};
use crate::body::{Body, BodyHandle};
use crate::config::SolverConstants;
use crate::error::{PhysicsError, Result};
use crate::space::Space;

/// Pin joint with optional angle limit and motor
#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    base: JointBase,

    anchor1: Vec2,
    anchor2: Vec2,
    ref_angle: Real,

    /// Point impulse in x/y, limit impulse in z
    lambda_acc: Vec3,
    motor_lambda_acc: Real,

    limit_enabled: bool,
    limit_lower_angle: Real,
    limit_upper_angle: Real,
    limit_state: LimitState,

    motor_enabled: bool,
    motor_speed: Real,
    max_motor_torque: Real,
    max_motor_impulse: Real,

    // Step-scoped
    r1: Vec2,
    r2: Vec2,
    em_inv: Mat3,
    em2: Real,
}

impl RevoluteJoint {
    /// Join two bodies at a world-space anchor.
    ///
    /// The current relative angle becomes the reference angle.
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
            lambda_acc: Vec3::ZERO,
            motor_lambda_acc: 0.0,
            limit_enabled: false,
            limit_lower_angle: 0.0,
            limit_upper_angle: 0.0,
            limit_state: LimitState::Inactive,
            motor_enabled: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            max_motor_impulse: 0.0,
            r1: Vec2::ZERO,
            r2: Vec2::ZERO,
            em_inv: Mat3::ZERO,
            em2: 0.0,
        }
    }

    /// Join two bodies of `space` at a world-space anchor
    pub fn new(space: &Space, body1: BodyHandle, body2: BodyHandle, anchor: Vec2) -> Result<Self> {
        let b1 = space.body(body1).ok_or(PhysicsError::BodyNotFound(body1))?;
        let b2 = space.body(body2).ok_or(PhysicsError::BodyNotFound(body2))?;
        Ok(Self::from_bodies(body1, b1, body2, b2, anchor))
    }

    /// Enable the angle limit with the given bounds
    pub fn with_limits(mut self, lower: Real, upper: Real) -> Self {
        self.set_limits(lower, upper);
        self.enable_limit(true);
        self
    }

    /// Enable the motor with the given target speed and torque budget
    pub fn with_motor(mut self, speed: Real, max_torque: Real) -> Self {
        self.set_motor_speed(speed);
        self.set_max_motor_torque(max_torque);
        self.enable_motor(true);
        self
    }

    /// Cap the reaction force; a breakable joint is removed when it exceeds the cap
    pub fn with_max_force(mut self, max_force: Real, breakable: bool) -> Self {
        self.base.max_force = max_force;
        self.base.breakable = breakable;
        self
    }

    /// Re-bind both local anchors to one world point.
    ///
    /// Any offset between the two previous anchors is discarded.
    pub fn set_world_anchor(&mut self, body1: &Body, body2: &Body, anchor: Vec2) {
        self.anchor1 = body1.local_point(anchor);
        self.anchor2 = body2.local_point(anchor);
    }

    /// Get the anchor in body 1's origin frame
    pub fn anchor1(&self) -> Vec2 {
        self.anchor1
    }

    /// Get the anchor in body 2's origin frame
    pub fn anchor2(&self) -> Vec2 {
        self.anchor2
    }

    /// Get the relative angle captured at creation
    pub fn ref_angle(&self) -> Real {
        self.ref_angle
    }

    /// Relative angle measured from the reference angle
    pub fn relative_angle(&self, body1: &Body, body2: &Body) -> Real {
        body2.angle - body1.angle - self.ref_angle
    }

    /// Accumulated point (x, y) and limit (z) impulse
    pub fn accumulated_impulse(&self) -> Vec3 {
        self.lambda_acc
    }

    /// Get the accumulated motor impulse
    pub fn motor_impulse(&self) -> Real {
        self.motor_lambda_acc
    }

    /// Check if the angle limit is enabled
    pub fn is_limit_enabled(&self) -> bool {
        self.limit_enabled
    }

    /// Enable or disable the angle limit
    pub fn enable_limit(&mut self, enabled: bool) {
        self.limit_enabled = enabled;
    }

    /// Set limit bounds in radians; they are reordered if given backwards
    pub fn set_limits(&mut self, lower: Real, upper: Real) {
        self.limit_lower_angle = lower.min(upper);
        self.limit_upper_angle = lower.max(upper);
    }

    /// Get the lower angle limit
    pub fn lower_limit(&self) -> Real {
        self.limit_lower_angle
    }

    /// Get the upper angle limit
    pub fn upper_limit(&self) -> Real {
        self.limit_upper_angle
    }

    /// Limit side found by the last `init_solver`
    pub fn limit_state(&self) -> LimitState {
        self.limit_state
    }

    /// Check if the motor is enabled
    pub fn is_motor_enabled(&self) -> bool {
        self.motor_enabled
    }

    /// Enable or disable the motor
    pub fn enable_motor(&mut self, enabled: bool) {
        self.motor_enabled = enabled;
    }

    /// Get the motor target speed in rad/s
    pub fn motor_speed(&self) -> Real {
        self.motor_speed
    }

    /// Set the motor target speed in rad/s
    pub fn set_motor_speed(&mut self, speed: Real) {
        self.motor_speed = speed;
    }

    /// Get the motor torque budget
    pub fn max_motor_torque(&self) -> Real {
        self.max_motor_torque
    }

    /// Set the motor torque budget
    pub fn set_max_motor_torque(&mut self, torque: Real) {
        self.max_motor_torque = torque;
    }

    fn update_limit_state(&mut self, relative_angle: Real, constants: &SolverConstants) {
        if !self.limit_enabled {
            self.limit_state = LimitState::Inactive;
            self.lambda_acc.z = 0.0;
            return;
        }

        let (lower, upper) = (self.limit_lower_angle, self.limit_upper_angle);
        if (upper - lower).abs() < constants.angular_slop {
            self.limit_state = LimitState::EqualLimits;
        } else if relative_angle <= lower {
            if self.limit_state != LimitState::AtLower {
                self.lambda_acc.z = 0.0;
            }
            self.limit_state = LimitState::AtLower;
        } else if relative_angle >= upper {
            if self.limit_state != LimitState::AtUpper {
                self.lambda_acc.z = 0.0;
            }
            self.limit_state = LimitState::AtUpper;
        } else {
            self.limit_state = LimitState::Inactive;
            self.lambda_acc.z = 0.0;
        }
    }

    fn solve_motor(&mut self, body1: &mut Body, body2: &mut Body) {
        let cdot = body2.angular_velocity - body1.angular_velocity - self.motor_speed;
        let mut lambda = -self.em2 * cdot;

        let old = self.motor_lambda_acc;
        self.motor_lambda_acc = clamp(old + lambda, -self.max_motor_impulse, self.max_motor_impulse);
        lambda = self.motor_lambda_acc - old;

        body1.angular_velocity -= lambda * body1.inertia_inverse();
        body2.angular_velocity += lambda * body2.inertia_inverse();
    }
}

impl Joint for RevoluteJoint {
    fn base(&self) -> &JointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut JointBase {
        &mut self.base
    }

    fn kind(&self) -> JointKind {
        JointKind::Revolute
    }

    fn init_solver(&mut self, body1: &mut Body, body2: &mut Body, ctx: &StepContext) {
        self.base.begin_step(ctx.dt);

        if self.motor_enabled {
            self.max_motor_impulse = self.max_motor_torque * ctx.dt;
        } else {
            self.motor_lambda_acc = 0.0;
        }

        let relative_angle = self.relative_angle(body1, body2);
        self.update_limit_state(relative_angle, &ctx.constants);

        self.r1 = body1.anchor_offset(self.anchor1);
        self.r2 = body2.anchor_offset(self.anchor2);

        self.em_inv = point_angle_mass(body1, body2, self.r1, self.r2);
        let k33 = self.em_inv.z_axis.z;
        self.em2 = if k33 != 0.0 { 1.0 / k33 } else { 0.0 };

        if ctx.warm_starting {
            let lambda_xy = Vec2::new(self.lambda_acc.x, self.lambda_acc.y);
            let lambda_z = self.lambda_acc.z + self.motor_lambda_acc;
            apply_velocity_impulse(body1, body2, self.r1, self.r2, lambda_xy, lambda_z);
        } else {
            self.lambda_acc = Vec3::ZERO;
            self.motor_lambda_acc = 0.0;
        }
    }

    fn solve_velocity_constraints(&mut self, body1: &mut Body, body2: &mut Body) {
        if self.motor_enabled && self.limit_state != LimitState::EqualLimits {
            self.solve_motor(body1, body2);
        }

        let v1 = body1.velocity + self.r1.perp() * body1.angular_velocity;
        let v2 = body2.velocity + self.r2.perp() * body2.angular_velocity;
        let cdot1 = v2 - v1;

        if self.limit_enabled && self.limit_state != LimitState::Inactive {
            let cdot2 = body2.angular_velocity - body1.angular_velocity;
            let mut lambda = self.em_inv.solve(-Vec3::new(cdot1.x, cdot1.y, cdot2));

            match self.limit_state {
                LimitState::AtLower | LimitState::AtUpper => {
                    let new_lambda_z = self.lambda_acc.z + lambda.z;
                    let pulls = if self.limit_state == LimitState::AtLower {
                        new_lambda_z < 0.0
                    } else {
                        new_lambda_z > 0.0
                    };

                    if pulls {
                        // Release the limit row: the z impulse becomes exactly
                        // -lambda_acc.z and the point block absorbs its coupling.
                        let k = &self.em_inv;
                        let rhs = cdot1 - k.z_axis.truncate() * self.lambda_acc.z;
                        let reduced = solve2x2(k, -rhs);
                        lambda = Vec3::new(reduced.x, reduced.y, -self.lambda_acc.z);

                        self.lambda_acc.x += reduced.x;
                        self.lambda_acc.y += reduced.y;
                        self.lambda_acc.z = 0.0;
                    } else {
                        self.lambda_acc += lambda;
                    }
                }
                _ => self.lambda_acc += lambda,
            }

            apply_velocity_impulse(
                body1,
                body2,
                self.r1,
                self.r2,
                Vec2::new(lambda.x, lambda.y),
                lambda.z,
            );
        } else {
            let lambda = solve2x2(&self.em_inv, -cdot1);
            self.lambda_acc.x += lambda.x;
            self.lambda_acc.y += lambda.y;

            apply_velocity_impulse(body1, body2, self.r1, self.r2, lambda, 0.0);
        }
    }

    fn solve_position_constraints(
        &mut self,
        body1: &mut Body,
        body2: &mut Body,
        constants: &SolverConstants,
    ) -> bool {
        let mut angular_error = 0.0;

        if self.limit_enabled && self.limit_state != LimitState::Inactive {
            let da = self.relative_angle(body1, body2);
            let max = constants.max_angular_correction;
            let slop = constants.angular_slop;

            let c = match self.limit_state {
                LimitState::EqualLimits => {
                    let c = clamp(da - self.limit_lower_angle, -max, max);
                    angular_error = c.abs();
                    c
                }
                LimitState::AtLower => {
                    let c = da - self.limit_lower_angle;
                    angular_error = -c;
                    clamp(c + slop, -max, 0.0)
                }
                LimitState::AtUpper => {
                    let c = da - self.limit_upper_angle;
                    angular_error = c;
                    clamp(c - slop, 0.0, max)
                }
                LimitState::Inactive => 0.0,
            };

            let impulse = -self.em2 * c;
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
