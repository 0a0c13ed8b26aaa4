//! Rigid Body
//!
//! A body's `position` is its world centre of mass. Joint anchors are stored
//! relative to the body origin, which sits at `position - rotate(centroid, angle)`.
//! Static and kinematic bodies always carry zero inverse mass and inertia, so
//! joint impulses never move them.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tether_core::arena::Handle;
use tether_core::math::{Real, Transform, Vec2, clamp};

use crate::joint::JointHandle;
use crate::mass::MassProperties;

/// Handle to a body owned by a [`Space`](crate::Space)
pub type BodyHandle = Handle<Body>;

/// How a body takes part in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    /// Never moves
    Static,
    /// Moves with its set velocity, unaffected by joints
    Kinematic,
    /// Fully simulated
    #[default]
    Dynamic,
}

/// Rigid body
#[derive(Debug, Clone)]
pub struct Body {
    /// Optional name for scenes and logs
    pub name: Option<String>,
    body_type: BodyType,

    /// World centre of mass
    pub position: Vec2,
    /// Orientation in radians, never wrapped
    pub angle: Real,
    pub velocity: Vec2,
    pub angular_velocity: Real,

    /// Accumulated force, cleared after every step
    pub force: Vec2,
    /// Accumulated torque, cleared after every step
    pub torque: Real,

    /// Centre of mass relative to the body origin
    centroid: Vec2,
    mass: Real,
    mass_inverse: Real,
    /// Rotational inertia about the centre of mass
    inertia: Real,
    inertia_inverse: Real,
    fixed_rotation: bool,

    pub linear_damping: Real,
    pub angular_damping: Real,

    awake: bool,
    sleep_time: Real,

    joints: SmallVec<[JointHandle; 4]>,
}

impl Body {
    /// Create a body with unit mass and inertia at `position`
    pub fn new(body_type: BodyType, position: Vec2) -> Self {
        let mut body = Self {
            name: None,
            body_type,
            position,
            angle: 0.0,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            force: Vec2::ZERO,
            torque: 0.0,
            centroid: Vec2::ZERO,
            mass: 1.0,
            mass_inverse: 0.0,
            inertia: 1.0,
            inertia_inverse: 0.0,
            fixed_rotation: false,
            linear_damping: 0.0,
            angular_damping: 0.0,
            awake: true,
            sleep_time: 0.0,
            joints: SmallVec::new(),
        };
        body.update_inverses();
        body
    }

    /// Create a dynamic body
    pub fn dynamic(position: Vec2) -> Self {
        Self::new(BodyType::Dynamic, position)
    }

    /// Create a static body
    pub fn new_static(position: Vec2) -> Self {
        Self::new(BodyType::Static, position)
    }

    /// Create a kinematic body
    pub fn kinematic(position: Vec2) -> Self {
        Self::new(BodyType::Kinematic, position)
    }

    /// Set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the orientation
    pub fn with_angle(mut self, angle: Real) -> Self {
        self.angle = angle;
        self
    }

    /// Set the linear velocity
    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    /// Set the angular velocity
    pub fn with_angular_velocity(mut self, angular_velocity: Real) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    /// Set the mass
    pub fn with_mass(mut self, mass: Real) -> Self {
        self.set_mass(mass);
        self
    }

    /// Set the inertia about the centre of mass
    pub fn with_inertia(mut self, inertia: Real) -> Self {
        self.set_inertia(inertia);
        self
    }

    /// Set mass, inertia and centre of mass from shape properties
    pub fn with_mass_properties(mut self, properties: MassProperties) -> Self {
        self.set_mass_properties(properties);
        self
    }

    /// Lock rotation
    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.set_fixed_rotation(fixed);
        self
    }

    /// Set per-body damping
    pub fn with_damping(mut self, linear: Real, angular: Real) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    pub fn is_kinematic(&self) -> bool {
        self.body_type == BodyType::Kinematic
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    /// Change the body type. Motion and accumulated forces are cleared.
    pub fn set_type(&mut self, body_type: BodyType) {
        if self.body_type == body_type {
            return;
        }

        self.body_type = body_type;
        self.velocity = Vec2::ZERO;
        self.angular_velocity = 0.0;
        self.force = Vec2::ZERO;
        self.torque = 0.0;
        self.update_inverses();
        self.set_awake(true);
    }

    pub fn mass(&self) -> Real {
        self.mass
    }

    pub fn mass_inverse(&self) -> Real {
        self.mass_inverse
    }

    /// Rotational inertia about the centre of mass
    pub fn inertia(&self) -> Real {
        self.inertia
    }

    pub fn inertia_inverse(&self) -> Real {
        self.inertia_inverse
    }

    pub fn centroid(&self) -> Vec2 {
        self.centroid
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    /// Set the mass. Non-positive values give an infinite mass.
    pub fn set_mass(&mut self, mass: Real) {
        self.mass = mass;
        self.update_inverses();
    }

    /// Set the inertia about the centre of mass
    pub fn set_inertia(&mut self, inertia: Real) {
        self.inertia = inertia;
        self.update_inverses();
    }

    /// Replace mass, inertia and centroid, keeping the body origin in place.
    ///
    /// The centre of mass moves, so its velocity picks up the rotational
    /// contribution of the shift.
    pub fn set_mass_properties(&mut self, properties: MassProperties) {
        let origin = self.origin();
        let old_position = self.position;

        self.centroid = properties.centroid;
        self.mass = properties.mass;
        self.inertia = properties.inertia_about_centroid();
        self.update_inverses();

        self.position = origin + self.rotation().rotate(self.centroid);
        self.velocity += (self.position - old_position).perp() * self.angular_velocity;
    }

    /// Lock or unlock rotation
    pub fn set_fixed_rotation(&mut self, fixed: bool) {
        self.fixed_rotation = fixed;
        self.update_inverses();
    }

    fn update_inverses(&mut self) {
        let dynamic = self.is_dynamic();
        self.mass_inverse = if dynamic && self.mass > 0.0 {
            1.0 / self.mass
        } else {
            0.0
        };
        self.inertia_inverse = if dynamic && !self.fixed_rotation && self.inertia > 0.0 {
            1.0 / self.inertia
        } else {
            0.0
        };
    }

    /// Whether the body can take no impulse at all
    pub fn is_immovable(&self) -> bool {
        self.mass_inverse == 0.0 && self.inertia_inverse == 0.0
    }

    /// World position of the body origin
    pub fn origin(&self) -> Vec2 {
        self.position - self.rotation().rotate(self.centroid)
    }

    /// Unit rotation vector `(cos, sin)` of the current angle
    pub fn rotation(&self) -> Vec2 {
        Vec2::from_angle(self.angle)
    }

    /// Transform from the body origin frame to world space
    pub fn transform(&self) -> Transform {
        Transform::from_angle_translation(self.angle, self.origin())
    }

    /// Move the body so its origin lands at `origin` with the given rotation
    pub fn set_transform(&mut self, origin: Vec2, angle: Real) {
        self.angle = angle;
        self.position =
            Transform::from_angle_translation(angle, origin).transform_point2(self.centroid);
    }

    /// Map a point from the body origin frame into world space
    pub fn world_point(&self, local: Vec2) -> Vec2 {
        self.transform().transform_point2(local)
    }

    /// Map a world point into the body origin frame
    pub fn local_point(&self, world: Vec2) -> Vec2 {
        self.transform().inverse().transform_point2(world)
    }

    pub fn world_vector(&self, local: Vec2) -> Vec2 {
        self.rotation().rotate(local)
    }

    pub fn local_vector(&self, world: Vec2) -> Vec2 {
        Vec2::from_angle(-self.angle).rotate(world)
    }

    /// World offset from the centre of mass to a local anchor
    pub fn anchor_offset(&self, local_anchor: Vec2) -> Vec2 {
        self.rotation().rotate(local_anchor - self.centroid)
    }

    /// Velocity of the material point at `world_point`
    pub fn velocity_at(&self, world_point: Vec2) -> Vec2 {
        self.velocity + (world_point - self.position).perp() * self.angular_velocity
    }

    /// Accumulate a force acting at a world point
    pub fn apply_force(&mut self, force: Vec2, world_point: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.force += force;
        self.torque += (world_point - self.position).perp_dot(force);
    }

    /// Accumulate a force through the centre of mass
    pub fn apply_force_to_center(&mut self, force: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.force += force;
    }

    pub fn apply_torque(&mut self, torque: Real) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.torque += torque;
    }

    /// Apply an instantaneous impulse at a world point
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, world_point: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.velocity += impulse * self.mass_inverse;
        self.angular_velocity +=
            (world_point - self.position).perp_dot(impulse) * self.inertia_inverse;
    }

    pub fn apply_angular_impulse(&mut self, impulse: Real) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.angular_velocity += impulse * self.inertia_inverse;
    }

    /// Semi-implicit Euler velocity update followed by damping.
    ///
    /// Force and torque accumulators are cleared afterwards.
    pub fn integrate_velocity(&mut self, gravity: Vec2, h: Real, damping: Real) {
        self.velocity += (gravity + self.force * self.mass_inverse) * h;
        self.angular_velocity += self.torque * self.inertia_inverse * h;

        self.velocity *= clamp(1.0 - h * (damping + self.linear_damping), 0.0, 1.0);
        self.angular_velocity *= clamp(1.0 - h * (damping + self.angular_damping), 0.0, 1.0);

        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    pub fn integrate_position(&mut self, h: Real) {
        self.position += self.velocity * h;
        self.angle += self.angular_velocity * h;
    }

    /// `0.5 * (m |v|^2 + I w^2)`, zero for bodies that are not dynamic
    pub fn kinetic_energy(&self) -> Real {
        if !self.is_dynamic() {
            return 0.0;
        }
        0.5 * (self.mass * self.velocity.length_squared()
            + self.inertia * self.angular_velocity * self.angular_velocity)
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Wake or sleep the body. Sleeping clears all motion and forces.
    pub fn set_awake(&mut self, awake: bool) {
        if awake {
            if !self.awake {
                log::trace!("waking body {}", self.label());
            }
            self.sleep_time = 0.0;
        } else {
            self.velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
        self.awake = awake;
    }

    /// Time the body has spent below the sleep tolerances
    pub fn sleep_time(&self) -> Real {
        self.sleep_time
    }

    pub(crate) fn set_sleep_time(&mut self, sleep_time: Real) {
        self.sleep_time = sleep_time;
    }

    /// Joints attached to this body
    pub fn joints(&self) -> &[JointHandle] {
        &self.joints
    }

    pub(crate) fn attach_joint(&mut self, joint: JointHandle) {
        self.joints.push(joint);
    }

    pub(crate) fn detach_joint(&mut self, joint: JointHandle) {
        self.joints.retain(|h| *h != joint);
    }

    pub(crate) fn clear_joints(&mut self) {
        self.joints.clear();
    }

    /// Name for log output
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::dynamic(Vec2::ZERO)
    }
}
