//! Simulation Driver
//!
//! Wraps a [`Space`] in a fixed-step clock:
//! - Variable frame times in, fixed `1 / frame_rate_hz` steps out
//! - At most `max_steps` catch-up steps per update, extra backlog dropped
//! - Pause, resume and single stepping

use tether_core::math::{Real, Vec2};
use tether_core::time::StepClock;
use tether_core::units;

use crate::body::{Body, BodyHandle};
use crate::config::{SimulationConfig, SpaceConfig};
use crate::error::{PhysicsError, Result};
use crate::joint::{Joint, JointHandle};
use crate::space::{Space, StepReport};

/// Fixed-step driver around a [`Space`]
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    space: Space,
    clock: StepClock,
    last_report: Option<StepReport>,
}

impl Simulation {
    /// Create a driver with an empty space
    pub fn new(config: SimulationConfig, space_config: SpaceConfig) -> Result<Self> {
        Self::with_space(config, Space::with_config(space_config)?)
    }

    /// Drive an existing space
    pub fn with_space(config: SimulationConfig, space: Space) -> Result<Self> {
        config.validate()?;
        log::debug!(
            "simulation at {} Hz, {} velocity / {} position iterations",
            config.frame_rate_hz,
            config.velocity_iterations,
            config.position_iterations
        );

        Ok(Self {
            clock: StepClock::new(config.fixed_time_step()),
            config,
            space,
            last_report: None,
        })
    }

    /// Feed one frame of wall-clock time and run the steps that are due.
    ///
    /// Returns the number of steps taken.
    pub fn update(&mut self, frame_time: Real) -> usize {
        let steps = self.clock.advance(frame_time);
        for _ in 0..steps {
            self.step_space();
        }
        steps as usize
    }

    fn step_space(&mut self) {
        let report = self.space.step(
            self.clock.step(),
            self.config.velocity_iterations,
            self.config.position_iterations,
            self.config.warm_starting,
            self.config.allow_sleep,
        );

        if !report.broken_joints.is_empty() {
            log::debug!("{} joints broke this step", report.broken_joints.len());
        }
        self.last_report = Some(report);
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Fixed step size in seconds
    pub fn step_size(&self) -> Real {
        self.clock.step()
    }

    pub fn time_delta(&self) -> Real {
        self.clock.time_delta()
    }

    /// Fraction of a step waiting in the accumulator, for blending rendered
    /// positions between the last two steps
    pub fn interpolation(&self) -> Real {
        self.clock.interpolation()
    }

    /// Simulated time so far
    pub fn elapsed(&self) -> Real {
        self.clock.step_count() as Real * self.clock.step()
    }

    pub fn step_count(&self) -> u64 {
        self.clock.step_count()
    }

    /// Report of the most recent step
    pub fn last_report(&self) -> Option<&StepReport> {
        self.last_report.as_ref()
    }

    pub fn is_paused(&self) -> bool {
        self.clock.is_paused()
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    pub fn resume(&mut self) {
        self.clock.resume();
    }

    /// Run exactly one step on the next update, even while paused
    pub fn request_step(&mut self) {
        self.clock.request_step();
    }

    pub fn set_warm_starting(&mut self, enabled: bool) {
        self.config.warm_starting = enabled;
    }

    pub fn set_allow_sleep(&mut self, enabled: bool) {
        self.config.allow_sleep = enabled;
    }

    pub fn set_iterations(&mut self, velocity_iterations: u32, position_iterations: u32) {
        self.config.velocity_iterations = velocity_iterations.max(1);
        self.config.position_iterations = position_iterations.max(1);
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn space_mut(&mut self) -> &mut Space {
        &mut self.space
    }

    pub fn add_body(&mut self, body: Body) -> BodyHandle {
        self.space.add_body(body)
    }

    /// Remove a body together with its joints
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<Body> {
        self.space
            .remove_body(handle)
            .ok_or(PhysicsError::BodyNotFound(handle))
    }

    pub fn add_joint(&mut self, joint: impl Joint) -> Result<JointHandle> {
        self.space.add_joint(joint)
    }

    pub fn remove_joint(&mut self, handle: JointHandle) -> Result<Box<dyn Joint>> {
        self.space
            .remove_joint(handle)
            .ok_or(PhysicsError::JointNotFound(handle))
    }

    pub fn pixels_to_meters(&self, value: Real) -> Real {
        units::pixels_to_meters(value)
    }

    pub fn meters_to_pixels(&self, value: Real) -> Real {
        units::meters_to_pixels(value)
    }

    /// Position of a body in pixel space
    pub fn body_position_pixels(&self, handle: BodyHandle) -> Option<Vec2> {
        self.space
            .body(handle)
            .map(|body| units::vec_meters_to_pixels(body.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LINEAR_SLOP;
    use crate::joint::{JointKind, LimitState, RevoluteJoint};

    const H: Real = 1.0 / 60.0;

    fn no_sleep() -> SimulationConfig {
        SimulationConfig {
            allow_sleep: false,
            ..Default::default()
        }
    }

    /// Static pivot at the origin, unit bob starting at (1, 0)
    fn pendulum() -> (Simulation, BodyHandle, BodyHandle, JointHandle) {
        let space = SpaceConfig::default().with_gravity(Vec2::new(0.0, -10.0));
        let mut sim = Simulation::new(no_sleep(), space).unwrap();
        let pivot = sim.add_body(Body::new_static(Vec2::ZERO));
        let bob = sim.add_body(Body::dynamic(Vec2::new(1.0, 0.0)).with_mass(1.0).with_inertia(1.0));
        let joint = RevoluteJoint::new(sim.space(), pivot, bob, Vec2::ZERO).unwrap();
        let joint = sim.add_joint(joint).unwrap();
        (sim, pivot, bob, joint)
    }

    #[test]
    fn test_pendulum_keeps_its_length() {
        let (mut sim, _, bob, joint) = pendulum();

        let mut steps = 0;
        for _ in 0..60 {
            steps += sim.update(H);
            let (a1, a2) = sim.space().joint_anchors(joint).unwrap();
            assert!(a1.distance(a2) < LINEAR_SLOP);
        }
        assert_eq!(steps, 60);

        let body = sim.space().body(bob).unwrap();
        let radius = body.position.length();
        assert!((radius - 1.0).abs() < LINEAR_SLOP, "radius {radius}");
        // It has swung down from the horizontal
        assert!(body.position.y < -0.5);
    }

    #[test]
    fn test_energy_does_not_grow() {
        let mut sim = Simulation::new(no_sleep(), SpaceConfig::default()).unwrap();
        let a = sim.add_body(Body::dynamic(Vec2::ZERO).with_mass(2.0).with_inertia(0.5));
        let b = sim.add_body(
            Body::dynamic(Vec2::new(1.0, 0.5))
                .with_mass(1.0)
                .with_inertia(0.25)
                .with_velocity(Vec2::new(0.0, 2.0))
                .with_angular_velocity(-3.0),
        );
        let joint = RevoluteJoint::new(sim.space(), a, b, Vec2::new(0.5, 0.25)).unwrap();
        sim.add_joint(joint).unwrap();

        // The first step projects the initial state onto the constraint
        sim.update(H);
        let mut previous = sim.space().kinetic_energy();
        let start = previous;
        assert!(start > 0.0);

        for _ in 0..600 {
            sim.update(H);
            let energy = sim.space().kinetic_energy();
            assert!(energy <= previous * (1.0 + 1e-9), "{energy} > {previous}");
            previous = energy;
        }
        assert!(previous <= start * (1.0 + 1e-9));
    }

    #[test]
    fn test_angle_limit_contains_motor() {
        let mut sim = Simulation::new(no_sleep(), SpaceConfig::default()).unwrap();
        let base = sim.add_body(Body::new_static(Vec2::ZERO));
        let arm = sim.add_body(Body::dynamic(Vec2::new(1.0, 0.0)));
        let joint = RevoluteJoint::new(sim.space(), base, arm, Vec2::new(1.0, 0.0))
            .unwrap()
            .with_limits(-0.5, 0.5)
            .with_motor(1.0, 10.0);
        let joint = sim.add_joint(joint).unwrap();
        let slop = sim.space().constants().angular_slop;

        let relative_angle = |sim: &Simulation| {
            let space = sim.space();
            let revolute = space.joint_as::<RevoluteJoint>(joint).unwrap();
            revolute.relative_angle(space.body(base).unwrap(), space.body(arm).unwrap())
        };

        let mut highest: Real = 0.0;
        for _ in 0..120 {
            sim.update(H);
            let angle = relative_angle(&sim);
            assert!(angle <= 0.5 + slop, "angle {angle}");
            highest = highest.max(angle);
        }
        // The motor really did drive it into the upper stop
        assert!(highest > 0.5 - slop);

        sim.space_mut()
            .joint_as_mut::<RevoluteJoint>(joint)
            .unwrap()
            .set_motor_speed(-1.0);

        let mut lowest: Real = 0.0;
        for _ in 0..180 {
            sim.update(H);
            let angle = relative_angle(&sim);
            assert!(angle >= -0.5 - slop, "angle {angle}");
            lowest = lowest.min(angle);
        }
        assert!(lowest < -0.5 + slop);
    }

    #[test]
    fn test_angle_limit_contains_strong_motor() {
        for max_torque in [10.0, 1e3, 1e6] {
            for speed in [5.0, 50.0] {
                let mut sim = Simulation::new(no_sleep(), SpaceConfig::default()).unwrap();
                let base = sim.add_body(Body::new_static(Vec2::ZERO));
                let arm = sim.add_body(Body::dynamic(Vec2::new(1.0, 0.0)));
                let joint = RevoluteJoint::new(sim.space(), base, arm, Vec2::new(1.0, 0.0))
                    .unwrap()
                    .with_limits(-0.5, 0.5)
                    .with_motor(speed, max_torque);
                let joint = sim.add_joint(joint).unwrap();
                let slop = sim.space().constants().angular_slop;

                // The step that first crosses the stop may overshoot it; only
                // the settled angle is bounded
                for step in 0..240 {
                    sim.update(H);
                    let space = sim.space();
                    let (b1, b2) = (space.body(base).unwrap(), space.body(arm).unwrap());
                    let revolute = space.joint_as::<RevoluteJoint>(joint).unwrap();
                    let angle = revolute.relative_angle(b1, b2);
                    if step >= 60 {
                        assert!(
                            angle <= 0.5 + slop + 1e-9,
                            "torque {max_torque} speed {speed} step {step}: angle {angle}"
                        );
                        assert!(angle > 0.5 - slop, "motor left the stop: {angle}");
                        assert_eq!(revolute.limit_state(), LimitState::AtUpper);
                    }
                }
            }
        }
    }

    #[test]
    fn test_motor_reaches_speed_at_centre() {
        let mut sim = Simulation::new(no_sleep(), SpaceConfig::default()).unwrap();
        let base = sim.add_body(Body::new_static(Vec2::ZERO));
        let wheel = sim.add_body(Body::dynamic(Vec2::new(2.0, 1.0)));
        let joint = RevoluteJoint::new(sim.space(), base, wheel, Vec2::new(2.0, 1.0))
            .unwrap()
            .with_motor(3.0, 1e9);
        sim.add_joint(joint).unwrap();

        sim.update(H);
        let w = sim.space().body(wheel).unwrap().angular_velocity;
        assert!((w - 3.0).abs() < 1e-9, "w = {w}");
    }

    #[test]
    fn test_motor_tracks_speed_off_centre() {
        let mut sim = Simulation::new(no_sleep(), SpaceConfig::default()).unwrap();
        let base = sim.add_body(Body::new_static(Vec2::ZERO));
        let arm = sim.add_body(Body::dynamic(Vec2::new(1.0, 0.0)));
        let joint = RevoluteJoint::new(sim.space(), base, arm, Vec2::ZERO)
            .unwrap()
            .with_motor(-2.0, 1e9);
        sim.add_joint(joint).unwrap();

        for _ in 0..30 {
            sim.update(H);
        }
        let w = sim.space().body(arm).unwrap().angular_velocity;
        assert!((w + 2.0).abs() < 1e-3, "w = {w}");
    }

    #[test]
    fn test_resting_impulse_is_a_fixed_point() {
        let config = SimulationConfig {
            warm_starting: false,
            allow_sleep: false,
            ..Default::default()
        };
        let space = SpaceConfig::default().with_gravity(Vec2::new(0.0, -10.0));
        let mut sim = Simulation::new(config, space).unwrap();
        let pivot = sim.add_body(Body::new_static(Vec2::ZERO));
        let bob = sim.add_body(Body::dynamic(Vec2::new(0.0, -1.0)));
        let joint = RevoluteJoint::new(sim.space(), pivot, bob, Vec2::ZERO).unwrap();
        let joint = sim.add_joint(joint).unwrap();

        let impulse = |sim: &Simulation| {
            sim.space()
                .joint_as::<RevoluteJoint>(joint)
                .unwrap()
                .accumulated_impulse()
        };

        sim.update(H);
        let first = impulse(&sim);
        assert!((first.y - 10.0 * H).abs() < 1e-12);

        for _ in 0..20 {
            sim.update(H);
            assert_eq!(impulse(&sim), first);
        }
        assert_eq!(sim.space().body(bob).unwrap().position, Vec2::new(0.0, -1.0));
    }

    fn chain_run(frames: &[Real]) -> Vec<(Vec2, Real)> {
        let space = SpaceConfig::default().with_gravity(Vec2::new(0.0, -10.0));
        let mut sim = Simulation::new(no_sleep(), space).unwrap();
        let mut previous = sim.add_body(Body::new_static(Vec2::ZERO));
        for i in 1..=5 {
            let link = sim.add_body(Body::dynamic(Vec2::new(i as Real * 0.5, 0.0)));
            let anchor = Vec2::new((i - 1) as Real * 0.5, 0.0);
            let joint = RevoluteJoint::new(sim.space(), previous, link, anchor).unwrap();
            sim.add_joint(joint).unwrap();
            previous = link;
        }

        for &frame_time in frames {
            sim.update(frame_time);
        }
        sim.space()
            .bodies()
            .map(|(_, body)| (body.position, body.angle))
            .collect()
    }

    #[test]
    fn test_runs_are_bit_identical() {
        let frames: Vec<Real> = (0..240).map(|i| 0.01 + 0.005 * (i % 7) as Real).collect();
        assert_eq!(chain_run(&frames), chain_run(&frames));
    }

    #[test]
    fn test_catch_up_is_bounded() {
        let (mut sim, ..) = pendulum();
        assert_eq!(sim.update(0.5), 4);
        assert_eq!(sim.time_delta(), 0.0);
        assert_eq!(sim.update(0.004), 0);
        assert_eq!(sim.step_count(), 4);
        assert!((sim.elapsed() - 4.0 * H).abs() < 1e-12);
    }

    #[test]
    fn test_pause_and_single_step() {
        let (mut sim, _, bob, _) = pendulum();
        sim.pause();
        assert!(sim.is_paused());
        assert_eq!(sim.update(H), 0);
        let frozen = sim.space().body(bob).unwrap().position;
        assert_eq!(frozen, Vec2::new(1.0, 0.0));

        sim.request_step();
        assert_eq!(sim.update(0.0), 1);
        assert_ne!(sim.space().body(bob).unwrap().position, frozen);
        assert!(sim.last_report().is_some());

        sim.resume();
        assert_eq!(sim.update(H), 1);
    }

    #[test]
    fn test_remove_missing_handles() {
        let (mut sim, _, bob, joint) = pendulum();
        assert_eq!(sim.remove_joint(joint).unwrap().kind(), JointKind::Revolute);
        assert!(matches!(
            sim.remove_joint(joint),
            Err(PhysicsError::JointNotFound(handle)) if handle == joint
        ));

        assert!(sim.remove_body(bob).is_ok());
        assert!(matches!(sim.remove_body(bob), Err(PhysicsError::BodyNotFound(_))));
        assert_eq!(sim.space().joint_count(), 0);
    }

    #[test]
    fn test_interpolation_tracks_backlog() {
        let (mut sim, ..) = pendulum();
        assert_eq!(sim.interpolation(), 0.0);

        // Without quantization a frame and a half runs one step and keeps half
        let config = SimulationConfig {
            quantize_hz: None,
            ..no_sleep()
        };
        let mut smooth = Simulation::new(config, SpaceConfig::default()).unwrap();
        assert_eq!(smooth.update(1.5 * H), 1);
        assert!((smooth.interpolation() - 0.5).abs() < 1e-9);
        assert_eq!(smooth.update(0.25 * H), 0);
        assert!((smooth.interpolation() - 0.75).abs() < 1e-9);

        assert_eq!(sim.update(H), 1);
        assert_eq!(sim.interpolation(), 0.0);
    }

    #[test]
    fn test_units() {
        let (sim, _, bob, _) = pendulum();
        assert_eq!(sim.pixels_to_meters(100.0), 2.0);
        assert_eq!(sim.meters_to_pixels(2.0), 100.0);
        assert_eq!(sim.body_position_pixels(bob), Some(Vec2::new(50.0, 0.0)));
    }

    #[test]
    fn test_invalid_config() {
        let config = SimulationConfig {
            max_steps: 0,
            ..Default::default()
        };
        assert!(Simulation::new(config, SpaceConfig::default()).is_err());
    }
}
