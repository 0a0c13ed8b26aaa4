//! # Tether Physics
//!
//! Impulse-based 2D joint solver.
//!
//! ## Features
//! - Rigid bodies with static, kinematic and dynamic behaviour
//! - Revolute joints with angle limits and a torque-limited motor
//! - Distance (rigid or soft), rope, weld (rigid or soft), spring and angle joints
//! - Warm-started sequential impulses with a separate position pass
//! - Breakable joints and island-free sleeping
//! - Fixed-step driver and JSON scene loading

pub mod body;
pub mod config;
pub mod error;
pub mod joint;
pub mod mass;
pub mod scene;
pub mod simulation;
pub mod space;

pub use body::{Body, BodyHandle, BodyType};
pub use config::{
    ANGULAR_SLOP, LINEAR_SLOP, MAX_ANGULAR_CORRECTION, MAX_LINEAR_CORRECTION, SimulationConfig,
    SleepConfig, SolverConstants, SpaceConfig,
};
pub use error::{PhysicsError, Result};
pub use joint::{
    AngleJoint, DistanceJoint, Joint, JointBase, JointHandle, JointKind, LimitState, RevoluteJoint,
    RopeJoint, SpringJoint, StepContext, WeldJoint,
};
pub use mass::MassProperties;
pub use scene::{
    AngleLimit, BodyDef, BodyState, BuiltScene, JointDef, JointKindDef, MotorDef, SceneDef,
    ShapeDef,
};
pub use simulation::Simulation;
pub use space::{Space, StepReport};

pub use tether_core;
