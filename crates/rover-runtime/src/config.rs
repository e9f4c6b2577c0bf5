//! [`RuntimeConfig`] – every tunable of the decision core in one serde tree.
//!
//! All sections default to the stock constants, so a config file only needs
//! the values it changes:
//!
//! ```toml
//! tick_ms = 250
//!
//! [fusion.safety]
//! max_speed = 200
//!
//! [emotion]
//! hysteresis_ms = 5000
//! ```

use rover_types::{
    CONTROL_TICK_MS, EMOTION_TICK_MS, MAX_MOTOR_SPEED, MIN_MOTOR_SPEED, PersonalityTraits,
    RoverError,
};
use serde::{Deserialize, Serialize};

use crate::emotion_engine::EmotionConfig;
use crate::fusion_engine::FusionConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Control loop period.
    pub tick_ms: u64,
    /// Emotion loop period.
    pub emotion_tick_ms: u64,
    pub fusion: FusionConfig,
    pub emotion: EmotionConfig,
    /// Starting personality.
    pub personality: PersonalityTraits,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_ms: CONTROL_TICK_MS,
            emotion_tick_ms: EMOTION_TICK_MS,
            fusion: FusionConfig::default(),
            emotion: EmotionConfig::default(),
            personality: PersonalityTraits::default(),
        }
    }
}

impl RuntimeConfig {
    /// Reject settings the loops cannot run with.
    ///
    /// # Errors
    ///
    /// [`RoverError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), RoverError> {
        if self.tick_ms == 0 {
            return Err(RoverError::Config("tick_ms must be > 0".into()));
        }
        if self.emotion_tick_ms == 0 {
            return Err(RoverError::Config("emotion_tick_ms must be > 0".into()));
        }

        let safety = &self.fusion.safety;
        if safety.min_speed < MIN_MOTOR_SPEED
            || safety.max_speed > MAX_MOTOR_SPEED
            || safety.min_speed > safety.max_speed
        {
            return Err(RoverError::Config(format!(
                "speed bounds [{}, {}] must lie within [{MIN_MOTOR_SPEED}, {MAX_MOTOR_SPEED}]",
                safety.min_speed, safety.max_speed
            )));
        }

        let speed = self.fusion.default_speed;
        if speed < safety.min_speed || speed > safety.max_speed {
            return Err(RoverError::Config(format!(
                "default speed {speed} outside [{}, {}]",
                safety.min_speed, safety.max_speed
            )));
        }
        if self.fusion.goals.default_speed != speed {
            return Err(RoverError::Config(format!(
                "goal speed {} differs from fusion default speed {speed}",
                self.fusion.goals.default_speed
            )));
        }

        let stop_cm = self.fusion.obstacle_stop_cm;
        if stop_cm.is_nan() || stop_cm <= 0.0 {
            return Err(RoverError::Config(format!(
                "obstacle stop distance {stop_cm}cm must be > 0"
            )));
        }
        for (field, value) in [
            ("fusion.safety.obstacle_stop_cm", safety.obstacle_stop_cm),
            ("fusion.goals.obstacle_stop_cm", self.fusion.goals.obstacle_stop_cm),
        ] {
            if value != stop_cm {
                return Err(RoverError::Config(format!(
                    "{field} = {value}cm differs from fusion.obstacle_stop_cm = {stop_cm}cm"
                )));
            }
        }
        if self.emotion.critical_battery != self.fusion.critical_battery {
            return Err(RoverError::Config(format!(
                "emotion.critical_battery = {}% differs from fusion.critical_battery = {}%",
                self.emotion.critical_battery, self.fusion.critical_battery
            )));
        }
        Ok(())
    }

    /// Set the cruise speed everywhere it is used.
    pub fn set_default_speed(&mut self, speed: i32) {
        self.fusion.default_speed = speed;
        self.fusion.goals.default_speed = speed;
    }

    /// Set the obstacle stop distance for the override, the validator and the
    /// explore walk at once.
    pub fn set_obstacle_stop_cm(&mut self, distance_cm: f32) {
        self.fusion.obstacle_stop_cm = distance_cm;
        self.fusion.safety.obstacle_stop_cm = distance_cm;
        self.fusion.goals.obstacle_stop_cm = distance_cm;
    }

    /// Cap the motor speed, pulling the cruise speed down if needed.
    pub fn set_max_speed(&mut self, max: i32) {
        self.fusion.safety.max_speed = max;
        if self.fusion.default_speed > max {
            self.set_default_speed(max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_config_keeps_other_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let cfg: RuntimeConfig = serde_json::from_value(serde_json::json!({
            "tick_ms": 250,
            "fusion": { "safety": { "max_speed": 200 } },
            "emotion": { "hysteresis_ms": 5000 }
        }))?;
        assert_eq!(cfg.tick_ms, 250);
        assert_eq!(cfg.emotion_tick_ms, EMOTION_TICK_MS);
        assert_eq!(cfg.fusion.safety.max_speed, 200);
        assert_eq!(cfg.fusion.safety.min_speed, MIN_MOTOR_SPEED);
        assert_eq!(cfg.emotion.hysteresis_ms, 5000);
        assert_eq!(cfg.fusion.max_snapshot_age_ms, None);
        Ok(())
    }

    #[test]
    fn zero_tick_is_rejected() {
        let cfg = RuntimeConfig {
            tick_ms: 0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(RoverError::Config(_))));
    }

    #[test]
    fn speed_outside_bounds_is_rejected() {
        let mut cfg = RuntimeConfig::default();
        cfg.fusion.safety.max_speed = 300;
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.fusion.default_speed = 250;
        cfg.fusion.safety.max_speed = 200;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn diverging_stop_distances_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let cfg: RuntimeConfig = serde_json::from_value(serde_json::json!({
            "fusion": { "safety": { "obstacle_stop_cm": 25.0 } }
        }))?;
        match cfg.validate() {
            Err(RoverError::Config(msg)) => assert!(msg.contains("fusion.safety.obstacle_stop_cm")),
            other => panic!("expected config error, got {other:?}"),
        }

        let mut cfg = RuntimeConfig::default();
        cfg.fusion.goals.obstacle_stop_cm = 10.0;
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.emotion.critical_battery = 10.0;
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn stop_distance_setter_keeps_components_in_step() {
        let mut cfg = RuntimeConfig::default();
        cfg.set_obstacle_stop_cm(25.0);
        assert_eq!(cfg.fusion.safety.obstacle_stop_cm, 25.0);
        assert_eq!(cfg.fusion.goals.obstacle_stop_cm, 25.0);
        assert!(cfg.validate().is_ok());

        cfg.set_obstacle_stop_cm(0.0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn lowering_max_speed_pulls_cruise_speed_down() {
        let mut cfg = RuntimeConfig::default();
        cfg.set_max_speed(150);
        assert_eq!(cfg.fusion.default_speed, 150);
        assert_eq!(cfg.fusion.goals.default_speed, 150);
        assert!(cfg.validate().is_ok());
    }
}
