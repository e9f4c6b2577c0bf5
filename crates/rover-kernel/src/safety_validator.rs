//! [`SafetyValidator`] – last-mile veto between the decision core and the
//! actuators.
//!
//! Every candidate command goes through
//! [`SafetyValidator::validate_command`], which applies these checks in order:
//!
//! 1. **Rate limit** ([`RateWindow`]): counted for every command, STOP
//!    included, before anything else.
//! 2. **STOP bypass**: STOP is always allowed once it has been counted.
//! 3. **Rules** ([`SafetyRule`]): cliff, edge, obstacle and speed bounds, first
//!    violation wins.
//!
//! An allowed non-STOP command stamps the [`CommandCooldown`] used by
//! [`SafetyValidator::can_send_command`].
//!
//! # Example
//!
//! ```
//! use rover_kernel::{SafetyLimits, SafetyValidator};
//! use rover_types::{RoverCommand, SensorSnapshot};
//!
//! let mut validator = SafetyValidator::new(SafetyLimits::default());
//! let close = SensorSnapshot { distance_cm: 10.0, ..SensorSnapshot::default() };
//!
//! assert!(validator.validate_command(&RoverCommand::forward(180), &close).is_err());
//! assert!(validator.validate_command(&RoverCommand::left(180), &close).is_ok());
//! assert!(validator.is_safe(&RoverCommand::stop(), &close));
//! ```

use std::time::{Duration, Instant};

use rover_types::{
    COMMAND_RATE_LIMIT_MS, MAX_COMMANDS_PER_SECOND, MAX_MOTOR_SPEED, MIN_MOTOR_SPEED,
    OBSTACLE_STOP_CM, RATE_LIMIT_WINDOW_MS, RoverCommand, SensorSnapshot,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::rate_limit::{CommandCooldown, RateWindow};
use crate::rules::{
    CliffRule, EdgeRule, ObstacleRule, SafetyRule, SafetyViolation, SpeedBoundsRule,
};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Thresholds enforced by [`SafetyValidator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyLimits {
    pub obstacle_stop_cm: f32,
    pub min_speed: i32,
    pub max_speed: i32,
    pub rate_limit_window_ms: u64,
    pub max_commands_per_window: u32,
    /// Minimum gap between validated commands.
    pub command_gap_ms: u64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            obstacle_stop_cm: OBSTACLE_STOP_CM,
            min_speed: MIN_MOTOR_SPEED,
            max_speed: MAX_MOTOR_SPEED,
            rate_limit_window_ms: RATE_LIMIT_WINDOW_MS,
            max_commands_per_window: MAX_COMMANDS_PER_SECOND,
            command_gap_ms: COMMAND_RATE_LIMIT_MS,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SafetyValidator
// ────────────────────────────────────────────────────────────────────────────

pub struct SafetyValidator {
    limits: SafetyLimits,
    rules: Vec<Box<dyn SafetyRule>>,
    rate_window: RateWindow,
    cooldown: CommandCooldown,
}

impl SafetyValidator {
    /// Build a validator with the four built-in rules registered in order.
    pub fn new(limits: SafetyLimits) -> Self {
        let mut validator = Self::without_rules(limits.clone());
        validator.add_rule(Box::new(CliffRule));
        validator.add_rule(Box::new(EdgeRule));
        validator.add_rule(Box::new(ObstacleRule {
            stop_distance_cm: limits.obstacle_stop_cm,
        }));
        validator.add_rule(Box::new(SpeedBoundsRule {
            min: limits.min_speed,
            max: limits.max_speed,
        }));
        validator
    }

    /// A validator that only rate-limits; rules are added with
    /// [`add_rule`][Self::add_rule].
    pub fn without_rules(limits: SafetyLimits) -> Self {
        let rate_window = RateWindow::new(
            Duration::from_millis(limits.rate_limit_window_ms),
            limits.max_commands_per_window,
        );
        let cooldown = CommandCooldown::new(Duration::from_millis(limits.command_gap_ms));
        Self {
            limits,
            rules: Vec::new(),
            rate_window,
            cooldown,
        }
    }

    /// Register a rule.  Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn SafetyRule>) {
        self.rules.push(rule);
    }

    pub fn limits(&self) -> &SafetyLimits {
        &self.limits
    }

    /// Validate `command` against the current `sensors`.
    ///
    /// # Errors
    ///
    /// Returns the first [`SafetyViolation`] hit; the command must not be sent.
    pub fn validate_command(
        &mut self,
        command: &RoverCommand,
        sensors: &SensorSnapshot,
    ) -> Result<(), SafetyViolation> {
        self.validate_command_at(command, sensors, Instant::now())
    }

    /// [`validate_command`][Self::validate_command] with an explicit clock.
    pub fn validate_command_at(
        &mut self,
        command: &RoverCommand,
        sensors: &SensorSnapshot,
        now: Instant,
    ) -> Result<(), SafetyViolation> {
        if let Err(violation) = self.rate_window.admit(now) {
            warn!(command = %command, reason = %violation, "command rejected");
            return Err(violation);
        }

        if command.is_stop() {
            return Ok(());
        }

        if let Some((rule, violation)) = self.first_violation(command, sensors) {
            warn!(
                command = %command,
                rule,
                distance_cm = sensors.distance_cm,
                reason = %violation,
                "command rejected"
            );
            return Err(violation);
        }

        self.cooldown.record(now);
        debug!(command = %command, "command validated");
        Ok(())
    }

    /// Same verdict as [`validate_command`][Self::validate_command] minus the
    /// rate limit, without touching any state.
    pub fn is_safe(&self, command: &RoverCommand, sensors: &SensorSnapshot) -> bool {
        command.is_stop() || self.first_violation(command, sensors).is_none()
    }

    /// `true` once the minimum gap since the last validated command has passed.
    pub fn can_send_command(&self) -> bool {
        self.cooldown.can_send_at(Instant::now())
    }

    pub fn can_send_command_at(&self, now: Instant) -> bool {
        self.cooldown.can_send_at(now)
    }

    /// Time left before [`can_send_command`][Self::can_send_command] turns true.
    pub fn command_cooldown(&self) -> Duration {
        self.cooldown.remaining_at(Instant::now())
    }

    pub fn command_cooldown_at(&self, now: Instant) -> Duration {
        self.cooldown.remaining_at(now)
    }

    /// Commands counted in the current rate-limit window.
    pub fn commands_in_window(&self) -> u32 {
        self.rate_window.count()
    }

    /// Clear rate-limit counters and the last-command timestamp.
    pub fn reset(&mut self) {
        self.rate_window.reset();
        self.cooldown.reset();
    }

    /// The first rule `command` breaks, by name, with its violation.
    fn first_violation(
        &self,
        command: &RoverCommand,
        sensors: &SensorSnapshot,
    ) -> Option<(&str, SafetyViolation)> {
        self.rules
            .iter()
            .find_map(|rule| rule.check(command, sensors).err().map(|v| (rule.name(), v)))
    }
}

impl Default for SafetyValidator {
    fn default() -> Self {
        Self::new(SafetyLimits::default())
    }
}
