//! [`DecisionFusionEngine`] – one motor command per control tick.
//!
//! Each call to [`decide`][DecisionFusionEngine::decide] walks four tiers in
//! strict priority order and returns the first command that survives the
//! [`SafetyValidator`]:
//!
//! 1. **Safety override** – cliff, obstacle inside the stop distance, or
//!    critical battery.  Returns STOP without consulting the validator.
//! 2. **Reactive** – steer toward the most confident person detection.  A
//!    rejected command falls through to tier 3.
//! 3. **Behavior goal** – [`BehaviorTree`] tick plus
//!    [`GoalCommandGenerator`].  A rejected goal is terminal: STOP.  The tier
//!    only stays silent when autonomy is disabled.
//! 4. **Suggestion** – keyword-parsed reasoning-model text.  A rejected
//!    suggestion falls through.
//!
//! Nothing left means STOP.
//!
//! # Example
//!
//! ```rust
//! use rover_middleware::RoverState;
//! use rover_runtime::fusion_engine::{DecisionFusionEngine, FusionConfig};
//! use rover_types::SensorSnapshot;
//!
//! let state = RoverState::new();
//! let mut engine = DecisionFusionEngine::new(FusionConfig::default(), state.clone());
//!
//! state.set_sensors(SensorSnapshot { cliff_detected: true, ..SensorSnapshot::default() });
//! assert!(engine.decide(None, None).is_stop());
//! ```

use std::time::Instant;

use chrono::Utc;
use rover_kernel::{SafetyLimits, SafetyValidator};
use rover_middleware::{EventBus, RoverState};
use rover_types::{
    CRITICAL_BATTERY_THRESHOLD, DEFAULT_MOTOR_SPEED, DetectionOutput, Event, EventPayload,
    HUMAN_FOLLOW_DISTANCE_CM, OBSTACLE_STOP_CM, RoverCommand, SensorSnapshot, SuggestionOutput,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::behavior_tree::{BehaviorConfig, BehaviorTree};
use crate::goal_generator::{GoalCommandGenerator, GoalConfig};
use crate::suggestion::suggestion_command;

/// Box centers left of this steer LEFT.
const CENTER_LEFT_BOUND: f32 = 0.4;
/// Box centers right of this steer RIGHT.
const CENTER_RIGHT_BOUND: f32 = 0.6;

const SOURCE: &str = "rover-runtime::fusion_engine";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub obstacle_stop_cm: f32,
    pub critical_battery: f32,
    pub follow_distance_cm: f32,
    pub default_speed: i32,
    /// Ignore detection/suggestion snapshots older than this.  `None` uses
    /// them regardless of age.
    pub max_snapshot_age_ms: Option<u64>,
    pub safety: SafetyLimits,
    pub behavior: BehaviorConfig,
    pub goals: GoalConfig,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            obstacle_stop_cm: OBSTACLE_STOP_CM,
            critical_battery: CRITICAL_BATTERY_THRESHOLD,
            follow_distance_cm: HUMAN_FOLLOW_DISTANCE_CM,
            default_speed: DEFAULT_MOTOR_SPEED,
            max_snapshot_age_ms: None,
            safety: SafetyLimits::default(),
            behavior: BehaviorConfig::default(),
            goals: GoalConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DecisionFusionEngine
// ─────────────────────────────────────────────────────────────────────────────

pub struct DecisionFusionEngine {
    config: FusionConfig,
    state: RoverState,
    bus: Option<EventBus>,
    validator: SafetyValidator,
    tree: BehaviorTree,
    goals: GoalCommandGenerator,
    last_detection: Option<DetectionOutput>,
    last_suggestion: Option<SuggestionOutput>,
    last_decision_at: Option<Instant>,
}

impl DecisionFusionEngine {
    pub fn new(config: FusionConfig, state: RoverState) -> Self {
        let validator = SafetyValidator::new(config.safety.clone());
        let tree = BehaviorTree::new(config.behavior.clone(), state.clone());
        let goals = GoalCommandGenerator::new(config.goals.clone());
        Self {
            config,
            state,
            bus: None,
            validator,
            tree,
            goals,
            last_detection: None,
            last_suggestion: None,
            last_decision_at: None,
        }
    }

    /// Publish rejections and behavior transitions on `bus`.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.tree = self.tree.with_bus(bus.clone());
        self.bus = Some(bus);
        self
    }

    pub fn last_detection(&self) -> Option<&DetectionOutput> {
        self.last_detection.as_ref()
    }

    pub fn last_suggestion(&self) -> Option<&SuggestionOutput> {
        self.last_suggestion.as_ref()
    }

    pub fn last_decision_at(&self) -> Option<Instant> {
        self.last_decision_at
    }

    pub fn behavior_tree(&self) -> &BehaviorTree {
        &self.tree
    }

    pub fn validator(&self) -> &SafetyValidator {
        &self.validator
    }

    /// Pick this tick's command.  Never fails; the fallback is STOP.
    pub fn decide(
        &mut self,
        detection: Option<&DetectionOutput>,
        suggestion: Option<&SuggestionOutput>,
    ) -> RoverCommand {
        self.decide_at(detection, suggestion, Instant::now())
    }

    /// [`decide`][Self::decide] with an explicit clock.
    pub fn decide_at(
        &mut self,
        detection: Option<&DetectionOutput>,
        suggestion: Option<&SuggestionOutput>,
        now: Instant,
    ) -> RoverCommand {
        self.last_decision_at = Some(now);
        if let Some(d) = detection {
            self.last_detection = Some(d.clone());
        }
        if let Some(s) = suggestion {
            self.last_suggestion = Some(s.clone());
        }

        let sensors = self.state.sensors();

        // Tier 1
        if self.safety_override(&sensors) {
            return RoverCommand::stop();
        }

        // Tier 2
        match detection.filter(|d| self.is_fresh(d.timestamp)) {
            Some(d) => {
                if let Some(candidate) = self.reactive_command(d, &sensors) {
                    if self.admit(candidate, &sensors, now) {
                        return candidate;
                    }
                    debug!(command = %candidate, "reactive command rejected; falling through");
                }
            }
            None => debug!("no detection this tick"),
        }

        // Tier 3
        if self.state.modes().autonomy_enabled {
            let behavior = self.tree.tick_at(now);
            let candidate = self.goals.generate_command_at(behavior, &sensors, now);
            if self.admit(candidate, &sensors, now) {
                return candidate;
            }
            return RoverCommand::stop();
        }
        debug!("autonomy disabled; behavior tier skipped");

        // Tier 4
        match suggestion.filter(|s| self.is_fresh(s.timestamp)) {
            Some(s) => match suggestion_command(&s.suggestion, self.config.default_speed) {
                Some(candidate) => {
                    if self.admit(candidate, &sensors, now) {
                        return candidate;
                    }
                    debug!(command = %candidate, "suggested command rejected");
                }
                None => debug!(text = %s.suggestion, "suggestion names no command"),
            },
            None => debug!("no suggestion this tick"),
        }

        RoverCommand::stop()
    }

    /// Clear cached snapshots and reset the tree, goals and validator.
    pub fn reset(&mut self) {
        self.last_detection = None;
        self.last_suggestion = None;
        self.last_decision_at = None;
        self.tree.reset();
        self.goals.reset();
        self.validator.reset();
    }

    fn safety_override(&self, sensors: &SensorSnapshot) -> bool {
        let battery = self.state.battery();
        let halt = sensors.cliff_detected
            || sensors.distance_cm < self.config.obstacle_stop_cm
            || battery <= self.config.critical_battery;
        if halt {
            debug!(
                cliff = sensors.cliff_detected,
                distance_cm = sensors.distance_cm,
                battery,
                "safety override"
            );
        }
        halt
    }

    fn reactive_command(
        &self,
        detection: &DetectionOutput,
        sensors: &SensorSnapshot,
    ) -> Option<RoverCommand> {
        let person = detection.person_box()?;
        let center = person.center_x();
        let speed = self.config.default_speed;
        let command = if center < CENTER_LEFT_BOUND {
            RoverCommand::left(speed)
        } else if center > CENTER_RIGHT_BOUND {
            RoverCommand::right(speed)
        } else if sensors.distance_cm > self.config.follow_distance_cm {
            RoverCommand::forward(speed)
        } else {
            RoverCommand::stop()
        };
        Some(command)
    }

    fn admit(&mut self, command: RoverCommand, sensors: &SensorSnapshot, now: Instant) -> bool {
        match self.validator.validate_command_at(&command, sensors, now) {
            Ok(()) => true,
            Err(violation) => {
                if let Some(bus) = &self.bus {
                    bus.publish(Event::new(
                        SOURCE,
                        EventPayload::CommandRejected {
                            command,
                            reason: violation.to_string(),
                        },
                    ));
                }
                false
            }
        }
    }

    fn is_fresh(&self, timestamp: chrono::DateTime<Utc>) -> bool {
        let Some(max_ms) = self.config.max_snapshot_age_ms else {
            return true;
        };
        let age_ms = (Utc::now() - timestamp).num_milliseconds();
        let fresh = age_ms <= max_ms as i64;
        if !fresh {
            debug!(age_ms, max_ms, "ignoring stale snapshot");
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_middleware::Topic;
    use rover_types::{Action, BehaviorState, BoundingBox};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn engine() -> (DecisionFusionEngine, RoverState) {
        let state = RoverState::new();
        (
            DecisionFusionEngine::new(FusionConfig::default(), state.clone()),
            state,
        )
    }

    fn person_at(x: f32, width: f32) -> DetectionOutput {
        DetectionOutput::from_boxes(vec![BoundingBox {
            x,
            y: 0.2,
            width,
            height: 0.5,
            class_name: "person".into(),
            confidence: 0.9,
        }])
    }

    /// Clear path, rover already rolling: the tree resolves to PATROL.
    fn cruising() -> SensorSnapshot {
        SensorSnapshot {
            distance_cm: 200.0,
            motor_left: 150,
            motor_right: 150,
            ..SensorSnapshot::default()
        }
    }

    #[test]
    fn cliff_always_stops() {
        let (mut engine, state) = engine();
        state.set_sensors(SensorSnapshot {
            cliff_detected: true,
            ..cruising()
        });
        let suggestion = SuggestionOutput::new("go forward", 0.9, "clear");
        let detection = person_at(0.45, 0.1);
        assert!(engine.decide(Some(&detection), Some(&suggestion)).is_stop());
        // The override never touches the validator.
        assert_eq!(engine.validator().commands_in_window(), 0);
    }

    #[test]
    fn close_obstacle_and_critical_battery_stop() {
        let (mut engine, state) = engine();
        state.set_sensors(SensorSnapshot {
            distance_cm: 14.0,
            ..cruising()
        });
        assert!(engine.decide(None, None).is_stop());

        state.set_sensors(cruising());
        state.set_battery(5.0);
        assert!(engine.decide(None, None).is_stop());
    }

    #[test]
    fn person_left_of_center_steers_left() {
        let (mut engine, state) = engine();
        state.set_sensors(cruising());
        let command = engine.decide(Some(&person_at(0.2, 0.1)), None);
        assert_eq!(command, RoverCommand::left(DEFAULT_MOTOR_SPEED));
    }

    #[test]
    fn centered_person_approaches_then_holds() {
        let (mut engine, state) = engine();
        let t0 = Instant::now();
        state.set_sensors(cruising());
        let far = engine.decide_at(Some(&person_at(0.45, 0.1)), None, t0);
        assert_eq!(far.cmd, Action::Forward);

        state.set_sensors(SensorSnapshot {
            distance_cm: 90.0,
            ..cruising()
        });
        let near = engine.decide_at(
            Some(&person_at(0.45, 0.1)),
            None,
            t0 + Duration::from_millis(200),
        );
        assert!(near.is_stop());
    }

    #[test]
    fn right_of_center_steers_right() {
        let (mut engine, state) = engine();
        state.set_sensors(cruising());
        let command = engine.decide(Some(&person_at(0.7, 0.2)), None);
        assert_eq!(command.cmd, Action::Right);
    }

    #[test]
    fn rejected_reactive_command_falls_through_to_behavior() {
        let (mut engine, state) = engine();
        // Edge under a side sensor vetoes FORWARD only; the tape on the left
        // puts the tree in LINE_FOLLOW, which turns.
        state.set_sensors(SensorSnapshot {
            edge_detected: true,
            line_follow_mode: true,
            ir_left: true,
            ..cruising()
        });
        let command = engine.decide(Some(&person_at(0.45, 0.1)), None);
        assert_eq!(command, RoverCommand::left(108));
        assert_eq!(engine.behavior_tree().current_behavior(), BehaviorState::LineFollow);
        // Reactive FORWARD rejected, then the LEFT admitted.
        assert_eq!(engine.validator().commands_in_window(), 2);
    }

    #[test]
    fn patrol_start_drives_forward() {
        let (mut engine, state) = engine();
        state.set_sensors(cruising());
        assert_eq!(
            engine.decide(None, None),
            RoverCommand::forward(DEFAULT_MOTOR_SPEED)
        );
        assert_eq!(state.behavior(), BehaviorState::Patrol);
    }

    #[test]
    fn rejected_goal_is_terminal() {
        let (mut engine, state) = engine();
        state.set_sensors(SensorSnapshot {
            edge_detected: true,
            ..cruising()
        });
        // The suggestion would be allowed, but tier 3 already halted.
        let suggestion = SuggestionOutput::new("turn left", 0.9, "");
        assert!(engine.decide(None, Some(&suggestion)).is_stop());
    }

    #[test]
    fn suggestion_used_only_without_autonomy() {
        let (mut engine, state) = engine();
        state.set_sensors(cruising());
        state.update_modes(|m| m.autonomy_enabled = false);

        let suggestion = SuggestionOutput::new("Turn right past the table", 0.8, "");
        assert_eq!(
            engine.decide(None, Some(&suggestion)),
            RoverCommand::right(DEFAULT_MOTOR_SPEED)
        );

        let chatter = SuggestionOutput::new("What a lovely room", 0.8, "");
        assert!(engine.decide(None, Some(&chatter)).is_stop());
        assert!(engine.decide(None, None).is_stop());
    }

    #[test]
    fn rejected_suggestion_falls_back_to_stop() {
        let (mut engine, state) = engine();
        state.set_sensors(SensorSnapshot {
            edge_detected: true,
            ..cruising()
        });
        state.update_modes(|m| m.autonomy_enabled = false);
        let suggestion = SuggestionOutput::new("forward", 0.8, "");
        assert!(engine.decide(None, Some(&suggestion)).is_stop());
    }

    #[test]
    fn stale_snapshots_ignored_when_max_age_set() {
        let state = RoverState::new();
        state.set_sensors(cruising());
        state.update_modes(|m| m.autonomy_enabled = false);
        let mut engine = DecisionFusionEngine::new(
            FusionConfig {
                max_snapshot_age_ms: Some(1_000),
                ..FusionConfig::default()
            },
            state,
        );

        let mut stale = SuggestionOutput::new("left", 0.9, "");
        stale.timestamp = Utc::now() - chrono::Duration::seconds(10);
        assert!(engine.decide(None, Some(&stale)).is_stop());

        let fresh = SuggestionOutput::new("left", 0.9, "");
        assert_eq!(engine.decide(None, Some(&fresh)).cmd, Action::Left);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn stale_snapshot_is_logged_at_debug() {
        let state = RoverState::new();
        state.set_sensors(cruising());
        state.update_modes(|m| m.autonomy_enabled = false);
        let mut engine = DecisionFusionEngine::new(
            FusionConfig {
                max_snapshot_age_ms: Some(1_000),
                ..FusionConfig::default()
            },
            state,
        );
        let mut stale = SuggestionOutput::new("left", 0.9, "");
        stale.timestamp = Utc::now() - chrono::Duration::seconds(10);

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            for _ in 0..3 {
                engine.decide(None, Some(&stale));
            }
        });

        let output = String::from_utf8(logs.0.lock().expect("log buffer").clone())
            .expect("utf-8 logs");
        let lines: Vec<&str> = output
            .lines()
            .filter(|l| l.contains("ignoring stale snapshot"))
            .collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.contains("DEBUG") && !l.contains("WARN")));
    }

    #[test]
    fn stale_snapshots_used_by_default() {
        let (mut engine, state) = engine();
        state.set_sensors(cruising());
        let mut old = person_at(0.1, 0.1);
        old.timestamp = Utc::now() - chrono::Duration::minutes(5);
        assert_eq!(engine.decide(Some(&old), None).cmd, Action::Left);
    }

    #[test]
    fn keeps_last_inputs_and_reset_clears_them() {
        let (mut engine, state) = engine();
        state.set_sensors(cruising());
        let detection = person_at(0.2, 0.1);
        let suggestion = SuggestionOutput::new("stop", 0.5, "");
        engine.decide(Some(&detection), Some(&suggestion));
        engine.decide(None, None);

        assert_eq!(engine.last_detection(), Some(&detection));
        assert_eq!(engine.last_suggestion(), Some(&suggestion));
        assert!(engine.last_decision_at().is_some());

        engine.reset();
        assert!(engine.last_detection().is_none());
        assert!(engine.last_suggestion().is_none());
        assert_eq!(engine.validator().commands_in_window(), 0);
        assert_eq!(engine.behavior_tree().current_behavior(), BehaviorState::Idle);
    }

    #[test]
    fn rejections_are_published() {
        let state = RoverState::new();
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Safety);
        let mut engine =
            DecisionFusionEngine::new(FusionConfig::default(), state.clone()).with_bus(bus);
        state.set_sensors(SensorSnapshot {
            edge_detected: true,
            ..cruising()
        });

        engine.decide(None, None);
        match rx.try_recv().map(|e| e.payload) {
            Some(EventPayload::CommandRejected { command, reason }) => {
                assert_eq!(command.cmd, Action::Forward);
                assert!(reason.contains("Edge"), "{reason}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
