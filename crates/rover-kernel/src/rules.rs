//! [`SafetyRule`] – ordered physical invariants checked for every non-STOP
//! command.
//!
//! [`SafetyValidator`][crate::SafetyValidator] evaluates its registered rules
//! in insertion order; the first violation wins and the command is **not**
//! forwarded to the actuators.
//!
//! Four built-in rules are provided, registered by default in this order:
//! - [`CliffRule`] – nothing but STOP while the center sensor sees no floor.
//! - [`EdgeRule`] – no FORWARD while a side sensor sees no floor.
//! - [`ObstacleRule`] – no FORWARD closer than the stop distance.
//! - [`SpeedBoundsRule`] – speed must stay within the motor range.

use rover_types::{Action, RoverCommand, SensorSnapshot};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Violations
// ────────────────────────────────────────────────────────────────────────────

/// Reason a command was vetoed.  Carries the numbers that triggered it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SafetyViolation {
    #[error("Rate limit exceeded: {count} commands in {window_ms}ms window (max {max})")]
    RateLimited { count: u32, max: u32, window_ms: u64 },

    #[error("Cliff detected: {action} blocked, only STOP allowed")]
    CliffDetected { action: Action },

    #[error("Edge detected: FORWARD blocked")]
    EdgeDetected,

    #[error("Obstacle too close: {distance_cm:.1}cm < {threshold_cm:.1}cm")]
    ObstacleTooClose { distance_cm: f32, threshold_cm: f32 },

    #[error("Speed {speed} outside [{min}, {max}]")]
    SpeedOutOfBounds { speed: i32, min: i32, max: i32 },
}

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single invariant a command must satisfy against the current sensors.
pub trait SafetyRule: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// `Ok(())` when `command` is acceptable given `sensors`.
    fn check(&self, command: &RoverCommand, sensors: &SensorSnapshot) -> Result<(), SafetyViolation>;
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

pub struct CliffRule;

impl SafetyRule for CliffRule {
    fn name(&self) -> &str {
        "cliff"
    }

    fn check(&self, command: &RoverCommand, sensors: &SensorSnapshot) -> Result<(), SafetyViolation> {
        if sensors.cliff_detected && !command.is_stop() {
            return Err(SafetyViolation::CliffDetected { action: command.cmd });
        }
        Ok(())
    }
}

pub struct EdgeRule;

impl SafetyRule for EdgeRule {
    fn name(&self) -> &str {
        "edge"
    }

    fn check(&self, command: &RoverCommand, sensors: &SensorSnapshot) -> Result<(), SafetyViolation> {
        if sensors.edge_detected && command.cmd == Action::Forward {
            return Err(SafetyViolation::EdgeDetected);
        }
        Ok(())
    }
}

/// Rejects FORWARD when the ultrasonic distance is strictly below
/// `stop_distance_cm`.
pub struct ObstacleRule {
    pub stop_distance_cm: f32,
}

impl SafetyRule for ObstacleRule {
    fn name(&self) -> &str {
        "obstacle"
    }

    fn check(&self, command: &RoverCommand, sensors: &SensorSnapshot) -> Result<(), SafetyViolation> {
        if command.cmd == Action::Forward && sensors.distance_cm < self.stop_distance_cm {
            return Err(SafetyViolation::ObstacleTooClose {
                distance_cm: sensors.distance_cm,
                threshold_cm: self.stop_distance_cm,
            });
        }
        Ok(())
    }
}

/// Rejects commands whose speed leaves `[min, max]` (inclusive).
pub struct SpeedBoundsRule {
    pub min: i32,
    pub max: i32,
}

impl SafetyRule for SpeedBoundsRule {
    fn name(&self) -> &str {
        "speed_bounds"
    }

    fn check(&self, command: &RoverCommand, _sensors: &SensorSnapshot) -> Result<(), SafetyViolation> {
        if command.speed < self.min || command.speed > self.max {
            return Err(SafetyViolation::SpeedOutOfBounds {
                speed: command.speed,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}
