//! Solver configuration
//!
//! - [`SolverConstants`]: slop and correction limits, fixed for the life of a space
//! - [`SleepConfig`]: when resting bodies are put to sleep
//! - [`SpaceConfig`]: world-wide settings (gravity, damping)
//! - [`SimulationConfig`]: fixed-step driver settings

use serde::{Deserialize, Serialize};
use tether_core::math::{DEG_TO_RAD, Real, Vec2};
use tether_core::time::{DEFAULT_QUANTIZE_HZ, FixedTimeStep};

use crate::error::{PhysicsError, Result};

/// Position error below which the point constraint counts as solved
pub const LINEAR_SLOP: Real = 0.0008;

/// Angular error below which a limit counts as solved (2 degrees)
pub const ANGULAR_SLOP: Real = 2.0 * DEG_TO_RAD;

/// Largest positional correction applied in one position iteration
pub const MAX_LINEAR_CORRECTION: Real = 0.5;

/// Largest angular correction applied in one position iteration (8 degrees)
pub const MAX_ANGULAR_CORRECTION: Real = 8.0 * DEG_TO_RAD;

/// Slop and correction limits shared by every joint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConstants {
    pub linear_slop: Real,
    pub angular_slop: Real,
    pub max_linear_correction: Real,
    pub max_angular_correction: Real,
}

impl Default for SolverConstants {
    fn default() -> Self {
        Self {
            linear_slop: LINEAR_SLOP,
            angular_slop: ANGULAR_SLOP,
            max_linear_correction: MAX_LINEAR_CORRECTION,
            max_angular_correction: MAX_ANGULAR_CORRECTION,
        }
    }
}

impl SolverConstants {
    /// Check that every tolerance is usable
    pub fn validate(&self) -> Result<()> {
        let values = [
            ("linear_slop", self.linear_slop),
            ("angular_slop", self.angular_slop),
            ("max_linear_correction", self.max_linear_correction),
            ("max_angular_correction", self.max_angular_correction),
        ];

        for (name, value) in values {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PhysicsError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Sleep thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepConfig {
    /// Seconds every dynamic body must stay slow before the space sleeps
    pub time_to_sleep: Real,
    /// Linear speed under which a body counts as resting
    pub linear_tolerance: Real,
    /// Angular speed under which a body counts as resting
    pub angular_tolerance: Real,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            time_to_sleep: 0.5,
            linear_tolerance: 0.5,
            angular_tolerance: 2.0 * DEG_TO_RAD,
        }
    }
}

/// World settings captured by a [`Space`](crate::Space) at construction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Acceleration applied to every awake dynamic body
    pub gravity: Vec2,
    /// Global damping, added to each body's own damping
    pub damping: Real,
    pub sleep: SleepConfig,
    pub constants: SolverConstants,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::ZERO,
            damping: 0.0,
            sleep: SleepConfig::default(),
            constants: SolverConstants::default(),
        }
    }
}

impl SpaceConfig {
    /// Set gravity
    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    /// Set global damping
    pub fn with_damping(mut self, damping: Real) -> Self {
        self.damping = damping;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.gravity.is_finite() {
            return Err(PhysicsError::InvalidConfig(format!(
                "gravity must be finite, got {}",
                self.gravity
            )));
        }
        if !(self.damping.is_finite() && self.damping >= 0.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "damping must be non-negative, got {}",
                self.damping
            )));
        }

        let sleep = &self.sleep;
        if sleep.time_to_sleep < 0.0 || sleep.linear_tolerance < 0.0 || sleep.angular_tolerance < 0.0
        {
            return Err(PhysicsError::InvalidConfig(
                "sleep thresholds must be non-negative".to_string(),
            ));
        }

        self.constants.validate()
    }
}

/// Fixed-step driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Physics rate; one step is `1 / frame_rate_hz` seconds
    pub frame_rate_hz: Real,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub warm_starting: bool,
    pub allow_sleep: bool,
    /// Catch-up steps allowed per update
    pub max_steps: u32,
    /// Frame times are rounded to this rate before accumulating
    pub quantize_hz: Option<Real>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60.0,
            velocity_iterations: 8,
            position_iterations: 4,
            warm_starting: true,
            allow_sleep: true,
            max_steps: 4,
            quantize_hz: Some(DEFAULT_QUANTIZE_HZ),
        }
    }
}

impl SimulationConfig {
    /// Fixed step size in seconds
    pub fn step(&self) -> Real {
        1.0 / self.frame_rate_hz
    }

    /// Clock settings for the driver
    pub fn fixed_time_step(&self) -> FixedTimeStep {
        FixedTimeStep::from_hz(self.frame_rate_hz)
            .with_max_updates(self.max_steps)
            .with_quantization(self.quantize_hz)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.frame_rate_hz.is_finite() && self.frame_rate_hz > 0.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "frame_rate_hz must be positive, got {}",
                self.frame_rate_hz
            )));
        }
        if self.velocity_iterations == 0 {
            return Err(PhysicsError::InvalidConfig(
                "velocity_iterations must be at least 1".to_string(),
            ));
        }
        if self.position_iterations == 0 {
            return Err(PhysicsError::InvalidConfig(
                "position_iterations must be at least 1".to_string(),
            ));
        }
        if self.max_steps == 0 {
            return Err(PhysicsError::InvalidConfig(
                "max_steps must be at least 1".to_string(),
            ));
        }
        if let Some(hz) = self.quantize_hz {
            if !(hz.is_finite() && hz > 0.0) {
                return Err(PhysicsError::InvalidConfig(format!(
                    "quantize_hz must be positive, got {hz}"
                )));
            }
        }
        Ok(())
    }
}
