//! Space
//!
//! Owns every body and joint and runs the step pipeline:
//! 1. joint `init_solver` (warm start)
//! 2. velocity integration of awake dynamic bodies
//! 3. wake propagation across joints
//! 4. velocity iterations
//! 5. position integration
//! 6. removal of broken joints
//! 7. position iterations, stopping early once every joint converged
//! 8. sleep bookkeeping
//!
//! Bodies and joints are visited in arena slot order, so the same sequence of
//! adds and removes always produces the same trajectory.

use tether_core::arena::Arena;
use tether_core::math::{Real, Vec2};

use crate::body::{Body, BodyHandle};
use crate::config::{SolverConstants, SpaceConfig};
use crate::error::{PhysicsError, Result};
use crate::joint::{Joint, JointHandle, StepContext};

/// Outcome of one [`Space::step`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Every joint ended within the slop tolerances
    pub position_solved: bool,
    /// Position iterations actually run
    pub position_iterations_used: u32,
    /// Breakable joints removed during the step
    pub broken_joints: Vec<JointHandle>,
}

/// Collection of bodies and the joints between them
#[derive(Debug, Default)]
pub struct Space {
    config: SpaceConfig,
    bodies: Arena<Body>,
    joints: Arena<Box<dyn Joint>>,
    step_count: u64,
}

impl Space {
    /// Create an empty space with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty space after validating `config`
    pub fn with_config(config: SpaceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    pub fn constants(&self) -> &SolverConstants {
        &self.config.constants
    }

    pub fn gravity(&self) -> Vec2 {
        self.config.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.config.gravity = gravity;
    }

    pub fn damping(&self) -> Real {
        self.config.damping
    }

    pub fn set_damping(&mut self, damping: Real) {
        self.config.damping = damping;
    }

    /// Add a body; it starts awake
    pub fn add_body(&mut self, mut body: Body) -> BodyHandle {
        body.clear_joints();
        body.set_awake(true);
        self.bodies.insert(body)
    }

    /// Remove a body together with every joint attached to it
    pub fn remove_body(&mut self, handle: BodyHandle) -> Option<Body> {
        let attached: Vec<JointHandle> = self.bodies.get(handle)?.joints().to_vec();
        for joint in attached {
            self.remove_joint(joint);
        }

        let body = self.bodies.remove(handle)?;
        log::debug!("removed body {} ({})", handle, body.label());
        Some(body)
    }

    /// Add a joint between two bodies of this space; both bodies are woken
    pub fn add_joint(&mut self, joint: impl Joint) -> Result<JointHandle> {
        self.add_boxed_joint(Box::new(joint))
    }

    /// Add an already boxed joint
    pub fn add_boxed_joint(&mut self, joint: Box<dyn Joint>) -> Result<JointHandle> {
        let (h1, h2) = (joint.body1(), joint.body2());
        if h1 == h2 {
            return Err(PhysicsError::SelfJoint(h1));
        }

        for handle in [h1, h2] {
            if !self.bodies.contains(handle) {
                return Err(PhysicsError::BodyNotFound(handle));
            }
        }

        let (b1, b2) = self
            .bodies
            .get2_mut(h1, h2)
            .ok_or(PhysicsError::BodyNotFound(h1))?;
        if b1.is_immovable() && b2.is_immovable() {
            return Err(PhysicsError::StaticPair(h1, h2));
        }
        b1.set_awake(true);
        b2.set_awake(true);

        let kind = joint.kind();
        let handle = self.joints.insert(joint);
        if let Some((b1, b2)) = self.bodies.get2_mut(h1, h2) {
            b1.attach_joint(handle);
            b2.attach_joint(handle);
        }

        log::debug!("added {kind:?} joint {handle} between {h1} and {h2}");
        Ok(handle)
    }

    /// Remove a joint; both of its bodies are woken
    pub fn remove_joint(&mut self, handle: JointHandle) -> Option<Box<dyn Joint>> {
        let joint = self.joints.remove(handle)?;
        for body_handle in [joint.body1(), joint.body2()] {
            if let Some(body) = self.bodies.get_mut(body_handle) {
                body.detach_joint(handle);
                body.set_awake(true);
            }
        }

        log::debug!("removed {:?} joint {}", joint.kind(), handle);
        Some(joint)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle)
    }

    /// Borrow two distinct bodies mutably
    pub fn body_pair_mut(&mut self, a: BodyHandle, b: BodyHandle) -> Option<(&mut Body, &mut Body)> {
        self.bodies.get2_mut(a, b)
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&dyn Joint> {
        self.joints.get(handle).map(|joint| joint.as_ref())
    }

    pub fn joint_mut(&mut self, handle: JointHandle) -> Option<&mut dyn Joint> {
        match self.joints.get_mut(handle) {
            Some(joint) => Some(joint.as_mut()),
            None => None,
        }
    }

    /// Get a joint as its concrete type
    pub fn joint_as<T: Joint>(&self, handle: JointHandle) -> Option<&T> {
        self.joints.get(handle)?.as_any().downcast_ref::<T>()
    }

    /// Get a joint mutably as its concrete type
    pub fn joint_as_mut<T: Joint>(&mut self, handle: JointHandle) -> Option<&mut T> {
        self.joints.get_mut(handle)?.as_any_mut().downcast_mut::<T>()
    }

    /// World anchors of a joint, read from its current bodies
    pub fn joint_anchors(&self, handle: JointHandle) -> Option<(Vec2, Vec2)> {
        let joint = self.joints.get(handle)?;
        let b1 = self.bodies.get(joint.body1())?;
        let b2 = self.bodies.get(joint.body2())?;
        Some((joint.world_anchor1(b1), joint.world_anchor2(b2)))
    }

    /// Bodies in slot order
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter()
    }

    pub fn bodies_mut(&mut self) -> impl Iterator<Item = (BodyHandle, &mut Body)> {
        self.bodies.iter_mut()
    }

    /// Joints in slot order, which is also solve order
    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &dyn Joint)> {
        self.joints.iter().map(|(handle, joint)| (handle, joint.as_ref()))
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// First body with the given name
    pub fn find_body(&self, name: &str) -> Option<BodyHandle> {
        self.bodies
            .iter()
            .find(|(_, body)| body.name.as_deref() == Some(name))
            .map(|(handle, _)| handle)
    }

    /// Remove every body and joint
    pub fn clear(&mut self) {
        self.joints.clear();
        self.bodies.clear();
    }

    /// Total kinetic energy of all dynamic bodies
    pub fn kinetic_energy(&self) -> Real {
        self.bodies.values().map(Body::kinetic_energy).sum()
    }

    /// Steps run so far
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Whether every dynamic body is asleep
    pub fn is_sleeping(&self) -> bool {
        self.bodies
            .values()
            .filter(|body| body.is_dynamic())
            .all(|body| !body.is_awake())
    }

    /// Advance the simulation by `h` seconds
    pub fn step(
        &mut self,
        h: Real,
        velocity_iterations: u32,
        position_iterations: u32,
        warm_starting: bool,
        allow_sleep: bool,
    ) -> StepReport {
        let mut report = StepReport::default();
        if h <= 0.0 {
            return report;
        }

        let ctx = StepContext::new(h, warm_starting, self.config.constants);
        self.step_count += 1;

        for (_, joint) in self.joints.iter_mut() {
            if let Some((b1, b2)) = self.bodies.get2_mut(joint.body1(), joint.body2()) {
                joint.init_solver(b1, b2, &ctx);
            }
        }

        let (gravity, damping) = (self.config.gravity, self.config.damping);
        for body in self.bodies.values_mut() {
            if body.is_dynamic() && body.is_awake() {
                body.integrate_velocity(gravity, h, damping);
            }
        }

        self.propagate_wake();

        for _ in 0..velocity_iterations {
            for (_, joint) in self.joints.iter_mut() {
                if let Some((b1, b2)) = self.bodies.get2_mut(joint.body1(), joint.body2()) {
                    joint.solve_velocity_constraints(b1, b2);
                }
            }
        }

        for body in self.bodies.values_mut() {
            if !body.is_static() && body.is_awake() {
                body.integrate_position(h);
            }
        }

        report.broken_joints = self.remove_broken_joints(ctx.dt_inv);

        for _ in 0..position_iterations {
            report.position_iterations_used += 1;

            let mut all_solved = true;
            for (_, joint) in self.joints.iter_mut() {
                if let Some((b1, b2)) = self.bodies.get2_mut(joint.body1(), joint.body2()) {
                    let solved = joint.solve_position_constraints(b1, b2, &ctx.constants);
                    all_solved = solved && all_solved;
                }
            }

            if all_solved {
                report.position_solved = true;
                break;
            }
        }

        if allow_sleep {
            self.update_sleep(h, report.position_solved);
        }

        log::trace!(
            "step {}: solved={} position_iterations={} energy={:.6}",
            self.step_count,
            report.position_solved,
            report.position_iterations_used,
            self.kinetic_energy()
        );

        report
    }

    /// A joint between an awake body and a sleeping one wakes the sleeper
    fn propagate_wake(&mut self) {
        for (_, joint) in self.joints.iter() {
            if let Some((b1, b2)) = self.bodies.get2_mut(joint.body1(), joint.body2()) {
                let awake1 = b1.is_awake() && !b1.is_static();
                let awake2 = b2.is_awake() && !b2.is_static();
                if awake1 != awake2 {
                    if !awake1 {
                        b1.set_awake(true);
                    }
                    if !awake2 {
                        b2.set_awake(true);
                    }
                }
            }
        }
    }

    fn remove_broken_joints(&mut self, dt_inv: Real) -> Vec<JointHandle> {
        let broken: Vec<JointHandle> = self
            .joints
            .iter()
            .filter(|(_, joint)| joint.base().should_break(joint.reaction_force(dt_inv)))
            .map(|(handle, _)| handle)
            .collect();

        for &handle in &broken {
            if let Some(joint) = self.remove_joint(handle) {
                log::debug!(
                    "joint {} broke under {:.3} N (max {:.3})",
                    handle,
                    joint.reaction_force(dt_inv).length(),
                    joint.base().max_force
                );
            }
        }
        broken
    }

    fn update_sleep(&mut self, h: Real, position_solved: bool) {
        let sleep = self.config.sleep;
        let lin_tol_sq = sleep.linear_tolerance * sleep.linear_tolerance;
        let ang_tol_sq = sleep.angular_tolerance * sleep.angular_tolerance;

        let mut min_sleep_time = Real::MAX;
        for body in self.bodies.values_mut() {
            if !body.is_dynamic() {
                continue;
            }

            if body.angular_velocity * body.angular_velocity > ang_tol_sq
                || body.velocity.length_squared() > lin_tol_sq
            {
                body.set_sleep_time(0.0);
            } else {
                body.set_sleep_time(body.sleep_time() + h);
            }
            min_sleep_time = min_sleep_time.min(body.sleep_time());
        }

        if position_solved && min_sleep_time >= sleep.time_to_sleep {
            let mut slept = 0;
            for body in self.bodies.values_mut() {
                if body.is_dynamic() && body.is_awake() {
                    body.set_awake(false);
                    slept += 1;
                }
            }
            if slept > 0 {
                log::debug!("space asleep after step {} ({} bodies)", self.step_count, slept);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joint::{DistanceJoint, RevoluteJoint, WeldJoint};

    fn hanging() -> (Space, BodyHandle, BodyHandle) {
        let mut space =
            Space::with_config(SpaceConfig::default().with_gravity(Vec2::new(0.0, -10.0))).unwrap();
        let ground = space.add_body(Body::new_static(Vec2::ZERO).with_name("ground"));
        let bob = space.add_body(Body::dynamic(Vec2::new(0.0, -1.0)).with_name("bob"));
        (space, ground, bob)
    }

    #[test]
    fn test_add_joint_validation() {
        let (mut space, ground, bob) = hanging();

        let joint = RevoluteJoint::new(&space, bob, bob, Vec2::ZERO).unwrap();
        assert!(matches!(space.add_joint(joint), Err(PhysicsError::SelfJoint(_))));

        let other = space.add_body(Body::new_static(Vec2::X));
        let joint = RevoluteJoint::new(&space, ground, other, Vec2::ZERO).unwrap();
        assert!(matches!(space.add_joint(joint), Err(PhysicsError::StaticPair(_, _))));

        let joint = RevoluteJoint::new(&space, ground, bob, Vec2::ZERO).unwrap();
        space.remove_body(bob);
        assert!(matches!(space.add_joint(joint), Err(PhysicsError::BodyNotFound(h)) if h == bob));
        assert!(RevoluteJoint::new(&space, ground, bob, Vec2::ZERO).is_err());
    }

    #[test]
    fn test_joint_back_references() {
        let (mut space, ground, bob) = hanging();
        let joint = RevoluteJoint::new(&space, ground, bob, Vec2::ZERO).unwrap();
        let handle = space.add_joint(joint).unwrap();

        assert_eq!(space.body(ground).unwrap().joints(), &[handle]);
        assert_eq!(space.body(bob).unwrap().joints(), &[handle]);
        assert!(space.joint_as::<RevoluteJoint>(handle).is_some());
        assert!(space.joint_as::<WeldJoint>(handle).is_none());

        space.remove_joint(handle);
        assert!(space.body(bob).unwrap().joints().is_empty());
        assert_eq!(space.joint_count(), 0);
    }

    #[test]
    fn test_remove_body_removes_its_joints() {
        let (mut space, ground, bob) = hanging();
        let third = space.add_body(Body::dynamic(Vec2::new(0.0, -2.0)));

        let j1 = space.add_joint(RevoluteJoint::new(&space, ground, bob, Vec2::ZERO).unwrap()).unwrap();
        let j2 = space
            .add_joint(RevoluteJoint::new(&space, bob, third, Vec2::new(0.0, -1.0)).unwrap())
            .unwrap();

        let removed = space.remove_body(bob).unwrap();
        assert_eq!(removed.label(), "bob");
        assert!(space.joint(j1).is_none());
        assert!(space.joint(j2).is_none());
        assert!(space.body(ground).unwrap().joints().is_empty());
        assert!(space.body(third).unwrap().joints().is_empty());
        assert_eq!(space.body_count(), 2);
    }

    #[test]
    fn test_hanging_pendulum_is_at_rest() {
        let (mut space, ground, bob) = hanging();
        let handle = space.add_joint(RevoluteJoint::new(&space, ground, bob, Vec2::ZERO).unwrap()).unwrap();

        for _ in 0..30 {
            space.step(1.0 / 60.0, 8, 4, true, false);
        }
        let body = space.body(bob).unwrap();
        assert!((body.position - Vec2::new(0.0, -1.0)).length() < 1e-9);

        // The joint carries the weight: 10 N upward on the bob
        let force = space.joint(handle).unwrap().reaction_force(60.0);
        assert!((force - Vec2::new(0.0, 10.0)).length() < 1e-9, "{force:?}");
    }

    #[test]
    fn test_breakable_joint_is_removed() {
        let (mut space, ground, bob) = hanging();
        let joint = RevoluteJoint::new(&space, ground, bob, Vec2::ZERO)
            .unwrap()
            .with_max_force(5.0, true);
        let handle = space.add_joint(joint).unwrap();

        let report = space.step(1.0 / 60.0, 8, 4, true, false);
        assert_eq!(report.broken_joints, vec![handle]);
        assert_eq!(space.joint_count(), 0);
        assert!(space.body(bob).unwrap().joints().is_empty());

        // Without the joint the bob falls freely
        space.step(1.0 / 60.0, 8, 4, true, false);
        assert!(space.body(bob).unwrap().position.y < -1.0);
    }

    #[test]
    fn test_strong_joint_survives() {
        let (mut space, ground, bob) = hanging();
        let joint = RevoluteJoint::new(&space, ground, bob, Vec2::ZERO)
            .unwrap()
            .with_max_force(50.0, true);
        space.add_joint(joint).unwrap();

        for _ in 0..10 {
            assert!(space.step(1.0 / 60.0, 8, 4, true, false).broken_joints.is_empty());
        }
        assert_eq!(space.joint_count(), 1);
    }

    #[test]
    fn test_resting_space_falls_asleep_and_wakes() {
        let (mut space, ground, bob) = hanging();
        space.add_joint(RevoluteJoint::new(&space, ground, bob, Vec2::ZERO).unwrap()).unwrap();

        for _ in 0..40 {
            space.step(1.0 / 60.0, 8, 4, true, true);
        }
        assert!(space.is_sleeping());
        let body = space.body(bob).unwrap();
        assert_eq!(body.velocity, Vec2::ZERO);
        let resting = body.position;

        // Asleep, gravity no longer moves it
        space.step(1.0 / 60.0, 8, 4, true, true);
        assert_eq!(space.body(bob).unwrap().position, resting);

        space.body_mut(bob).unwrap().apply_force_to_center(Vec2::new(100.0, 0.0));
        assert!(!space.is_sleeping());
        space.step(1.0 / 60.0, 8, 4, true, true);
        assert!(space.body(bob).unwrap().position.x > 0.0);
    }

    #[test]
    fn test_moving_body_stays_awake() {
        let (mut space, ground, bob) = hanging();
        space.body_mut(bob).unwrap().velocity = Vec2::new(3.0, 0.0);
        space.add_joint(RevoluteJoint::new(&space, ground, bob, Vec2::ZERO).unwrap()).unwrap();

        for _ in 0..60 {
            space.step(1.0 / 60.0, 8, 4, true, true);
        }
        assert!(!space.is_sleeping());
    }

    #[test]
    fn test_wake_propagates_through_joint() {
        let mut space = Space::new();
        let a = space.add_body(Body::dynamic(Vec2::ZERO));
        let b = space.add_body(Body::dynamic(Vec2::new(1.0, 0.0)));
        space
            .add_joint(DistanceJoint::new(&space, a, b, Vec2::ZERO, Vec2::new(1.0, 0.0)).unwrap())
            .unwrap();

        space.body_mut(a).unwrap().set_awake(false);
        space.body_mut(b).unwrap().set_awake(false);
        space.body_mut(a).unwrap().velocity = Vec2::new(1.0, 0.0);
        space.body_mut(a).unwrap().set_awake(true);

        space.step(1.0 / 60.0, 8, 4, true, false);
        assert!(space.body(b).unwrap().is_awake());
        assert!(space.body(b).unwrap().position.x > 1.0);
    }

    #[test]
    fn test_kinematic_body_moves_at_its_velocity() {
        let mut space = Space::new();
        let platform = space.add_body(Body::kinematic(Vec2::ZERO).with_velocity(Vec2::new(1.0, 0.0)));
        let load = space.add_body(Body::dynamic(Vec2::new(0.0, -1.0)));
        space
            .add_joint(RevoluteJoint::new(&space, platform, load, Vec2::ZERO).unwrap())
            .unwrap();

        for _ in 0..60 {
            space.step(1.0 / 60.0, 8, 4, true, false);
        }
        let platform = space.body(platform).unwrap();
        assert!((platform.position.x - 1.0).abs() < 1e-9);
        assert_eq!(platform.velocity, Vec2::new(1.0, 0.0));

        // Dragged along on its rod
        let load = space.body(load).unwrap();
        assert!(load.position.x > 0.0);
        assert!(((load.position - platform.position).length() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_space_step() {
        let mut space = Space::new();
        let report = space.step(1.0 / 60.0, 8, 4, true, true);
        assert!(report.position_solved);
        assert_eq!(report.position_iterations_used, 1);

        let report = space.step(0.0, 8, 4, true, true);
        assert_eq!(report, StepReport::default());
        assert_eq!(space.step_count(), 1);
    }

    #[test]
    fn test_find_body_and_clear() {
        let (mut space, ground, _) = hanging();
        assert_eq!(space.find_body("ground"), Some(ground));
        assert_eq!(space.find_body("missing"), None);

        space.clear();
        assert_eq!(space.body_count(), 0);
        assert!(space.body(ground).is_none());
    }
}
