//! Error types for body, joint and scene construction.
//!
//! The solve path itself never fails; only building and looking things up can.

use thiserror::Error;

use crate::body::BodyHandle;
use crate::joint::JointHandle;

/// Errors raised while assembling a simulation
#[derive(Debug, Error)]
pub enum PhysicsError {
    #[error("body {0} does not exist")]
    BodyNotFound(BodyHandle),

    #[error("joint {0} does not exist")]
    JointNotFound(JointHandle),

    #[error("a joint cannot connect body {0} to itself")]
    SelfJoint(BodyHandle),

    #[error("bodies {0} and {1} both have zero inverse mass and inertia")]
    StaticPair(BodyHandle, BodyHandle),

    #[error("invalid shape: {0}")]
    InvalidShape(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("scene refers to unknown body '{0}'")]
    UnknownBody(String),

    #[error("scene defines body '{0}' more than once")]
    DuplicateBody(String),

    #[error("failed to parse scene: {0}")]
    Scene(#[from] serde_json::Error),
}

/// Result type for physics construction
pub type Result<T> = std::result::Result<T, PhysicsError>;
