//! Unit conversion between pixel space and solver space.
//!
//! The solver works in metre-like units where one unit is 50 pixels.
//! Conversion only happens at the boundary, when bodies are created from or
//! drawn to pixel-space sprites.

use serde::{Deserialize, Serialize};

use crate::math::{Real, Vec2};

/// Pixels to solver units
pub const PIXELS_TO_METERS: Real = 0.02;

/// Solver units to pixels
pub const METERS_TO_PIXELS: Real = 50.0;

/// Convert a pixel length to solver units
#[inline]
pub fn pixels_to_meters(value: Real) -> Real {
    value * PIXELS_TO_METERS
}

/// Convert a solver length to pixels
#[inline]
pub fn meters_to_pixels(value: Real) -> Real {
    value * METERS_TO_PIXELS
}

/// Convert a pixel-space vector to solver units
#[inline]
pub fn vec_pixels_to_meters(v: Vec2) -> Vec2 {
    v * PIXELS_TO_METERS
}

/// Convert a solver-space vector to pixels
#[inline]
pub fn vec_meters_to_pixels(v: Vec2) -> Vec2 {
    v * METERS_TO_PIXELS
}

/// Unit system a piece of external data is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    /// Already in solver units
    #[default]
    Meters,
    /// Pixel space, scaled by [`PIXELS_TO_METERS`] on the way in
    Pixels,
}

impl Units {
    /// Convert a length into solver units
    pub fn length(self, value: Real) -> Real {
        match self {
            Self::Meters => value,
            Self::Pixels => pixels_to_meters(value),
        }
    }

    /// Convert a point or vector into solver units
    pub fn vector(self, v: Vec2) -> Vec2 {
        match self {
            Self::Meters => v,
            Self::Pixels => vec_pixels_to_meters(v),
        }
    }

    /// Convert a solver-space point or vector back out
    pub fn vector_out(self, v: Vec2) -> Vec2 {
        match self {
            Self::Meters => v,
            Self::Pixels => vec_meters_to_pixels(v),
        }
    }
}
