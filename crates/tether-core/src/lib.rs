//! # Tether Core
//!
//! Foundation library for the Tether 2D joint solver.
//!
//! This crate provides the building blocks the solver is written against:
//! - **Math**: `f64` vectors from glam plus singular-safe solvers for the joint systems
//! - **Arena**: Generational slot storage with stable, typed handles
//! - **Time**: Fixed-step accumulator that decouples frame time from the physics rate
//! - **Units**: Conversion between solver units and pixel space

pub mod arena;
pub mod math;
pub mod time;
pub mod units;

pub use arena::{Arena, Handle};
pub use math::{Mat2, Mat3, Real, Solve, Transform, Vec2, Vec3};
pub use time::{FixedTimeStep, StepClock};
pub use units::{METERS_TO_PIXELS, PIXELS_TO_METERS};
