//! Time Management
//!
//! Fixed-step model for the solver:
//! - Frame times are quantized to the display refresh grid
//! - Unsimulated time accumulates until whole steps are due
//! - Catch-up steps per frame are capped (to prevent spiral of death)
//! - Manual single stepping works even while paused

use serde::{Deserialize, Serialize};

use crate::math::Real;

/// Refresh rate frame times are snapped to
pub const DEFAULT_QUANTIZE_HZ: Real = 60.0;

/// Fixed time step configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedTimeStep {
    /// Fixed timestep in seconds
    pub step: Real,
    /// Maximum number of fixed updates per frame
    pub max_updates: u32,
    /// Frame times are rounded to the nearest `1 / quantize_hz`.
    /// `None` feeds frame times through untouched.
    pub quantize_hz: Option<Real>,
}

impl Default for FixedTimeStep {
    fn default() -> Self {
        Self {
            step: 1.0 / 60.0, // 60 Hz
            max_updates: 4,
            quantize_hz: Some(DEFAULT_QUANTIZE_HZ),
        }
    }
}

impl FixedTimeStep {
    /// Create a new fixed time step with the given frequency
    pub fn from_hz(hz: Real) -> Self {
        Self {
            step: 1.0 / hz,
            ..Self::default()
        }
    }

    /// Create a new fixed time step with the given step size
    pub fn from_step(step: Real) -> Self {
        Self {
            step,
            ..Self::default()
        }
    }

    /// Set the maximum number of updates per frame
    pub fn with_max_updates(mut self, max: u32) -> Self {
        self.max_updates = max;
        self
    }

    /// Set the frame time quantization rate
    pub fn with_quantization(mut self, hz: Option<Real>) -> Self {
        self.quantize_hz = hz;
        self
    }

    /// Step frequency in Hz
    pub fn hz(&self) -> Real {
        1.0 / self.step
    }

    /// Snap a frame time to the quantization grid
    pub fn quantize(&self, frame_time: Real) -> Real {
        match self.quantize_hz {
            Some(hz) if hz > 0.0 => (frame_time * hz + 0.5).floor() / hz,
            _ => frame_time,
        }
    }
}

/// Accumulator that turns variable frame times into a count of fixed steps
#[derive(Debug, Clone)]
pub struct StepClock {
    config: FixedTimeStep,
    /// Accumulated time not yet simulated
    time_delta: Real,
    /// Whether the clock is paused
    paused: bool,
    /// One manual step requested
    step_requested: bool,
    /// Frame count
    frame_count: u64,
    /// Fixed update count
    step_count: u64,
}

impl StepClock {
    /// Create a new clock
    pub fn new(config: FixedTimeStep) -> Self {
        Self {
            config,
            time_delta: 0.0,
            paused: false,
            step_requested: false,
            frame_count: 0,
            step_count: 0,
        }
    }

    /// Feed one frame's worth of wall-clock time.
    ///
    /// Returns the number of fixed steps the caller must run now. While
    /// paused nothing accumulates unless a manual step was requested, in
    /// which case exactly one step is due regardless of `frame_time`.
    pub fn advance(&mut self, frame_time: Real) -> u32 {
        self.frame_count += 1;

        if self.paused && !self.step_requested {
            return 0;
        }

        let h = self.config.step;
        self.time_delta += self.config.quantize(frame_time);

        if self.step_requested {
            self.step_requested = false;
            self.time_delta = h;
        }

        let mut steps = 0;
        while steps < self.config.max_updates && self.time_delta >= h {
            self.time_delta -= h;
            steps += 1;
        }

        if self.time_delta > h {
            log::debug!(
                "dropping {:.4}s of simulation backlog after {} steps",
                self.time_delta,
                steps
            );
            self.time_delta = 0.0;
        }

        self.step_count += u64::from(steps);
        steps
    }

    /// Get the clock configuration
    pub fn config(&self) -> &FixedTimeStep {
        &self.config
    }

    /// Fixed step size in seconds
    pub fn step(&self) -> Real {
        self.config.step
    }

    /// Accumulated time not yet simulated
    pub fn time_delta(&self) -> Real {
        self.time_delta
    }

    /// Get the interpolation factor for rendering between fixed updates
    pub fn interpolation(&self) -> Real {
        (self.time_delta / self.config.step).clamp(0.0, 1.0)
    }

    /// Get the frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get the fixed update count
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Check if the clock is paused
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Pause the clock
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume the clock
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Request exactly one step on the next `advance`, even while paused
    pub fn request_step(&mut self) {
        self.step_requested = true;
    }
}

impl Default for StepClock {
    fn default() -> Self {
        Self::new(FixedTimeStep::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_time_step() {
        let fts = FixedTimeStep::from_hz(120.0);
        assert!((fts.step - 1.0 / 120.0).abs() < 1e-12);
        assert_eq!(fts.max_updates, 4);
        assert!((fts.hz() - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_quantize() {
        let fts = FixedTimeStep::default();
        assert_eq!(fts.quantize(0.016), 1.0 / 60.0);
        assert_eq!(fts.quantize(0.005), 0.0);
        assert_eq!(fts.quantize(0.034), 2.0 / 60.0);

        let raw = fts.with_quantization(None);
        assert_eq!(raw.quantize(0.005), 0.005);
    }

    #[test]
    fn test_single_frame_single_step() {
        let mut clock = StepClock::default();
        assert_eq!(clock.advance(0.016), 1);
        assert!(clock.time_delta().abs() < 1e-12);
        assert_eq!(clock.step_count(), 1);
    }

    #[test]
    fn test_short_frames_accumulate() {
        let mut clock = StepClock::new(FixedTimeStep::from_hz(30.0));
        assert_eq!(clock.advance(1.0 / 60.0), 0);
        assert!(clock.interpolation() > 0.4);
        assert_eq!(clock.advance(1.0 / 60.0), 1);
    }

    #[test]
    fn test_catch_up_is_capped_and_backlog_dropped() {
        let mut clock = StepClock::default();
        assert_eq!(clock.advance(0.1), 4);
        assert_eq!(clock.time_delta(), 0.0);

        assert_eq!(clock.advance(1.0), 4);
        assert_eq!(clock.time_delta(), 0.0);
        assert_eq!(clock.step_count(), 8);
    }

    #[test]
    fn test_pause() {
        let mut clock = StepClock::default();
        clock.pause();
        assert!(clock.is_paused());
        assert_eq!(clock.advance(0.05), 0);
        assert_eq!(clock.time_delta(), 0.0);

        clock.resume();
        assert!(!clock.is_paused());
        assert_eq!(clock.advance(1.0 / 60.0), 1);
    }

    #[test]
    fn test_manual_step_while_paused() {
        let mut clock = StepClock::default();
        clock.pause();
        clock.request_step();
        assert_eq!(clock.advance(0.5), 1);
        assert_eq!(clock.time_delta(), 0.0);

        // Request is consumed
        assert_eq!(clock.advance(0.5), 0);
        assert_eq!(clock.frame_count(), 2);
    }
}
