//! `rover-types` – shared value types for the rover decision core.
//!
//! Everything that crosses a crate boundary lives here: sensor snapshots,
//! motor commands, behavior/emotion states, perception and reasoning
//! snapshots, the bus event envelope, and the workspace error type.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Motor and threshold constants
// ────────────────────────────────────────────────────────────────────────────

/// Lowest speed the motor controller accepts.
pub const MIN_MOTOR_SPEED: i32 = 0;
/// Highest speed the motor controller accepts.
pub const MAX_MOTOR_SPEED: i32 = 255;
/// Cruise speed used by autonomous goals and parsed suggestions.
pub const DEFAULT_MOTOR_SPEED: i32 = 180;
/// Multiplier applied to [`DEFAULT_MOTOR_SPEED`] when creeping near obstacles.
pub const SLOW_SPEED_FACTOR: f32 = 0.6;

/// Forward motion is refused below this ultrasonic distance.
pub const OBSTACLE_STOP_CM: f32 = 15.0;
/// Autonomous goals slow down or turn below this ultrasonic distance.
pub const OBSTACLE_SLOW_CM: f32 = 40.0;
/// Target standoff distance when following a person.
pub const HUMAN_FOLLOW_DISTANCE_CM: f32 = 100.0;
/// Relative tolerance around [`HUMAN_FOLLOW_DISTANCE_CM`].
pub const HUMAN_FOLLOW_TOLERANCE: f32 = 0.2;
/// Reading reported by the ultrasonic sensor when nothing is in range.
pub const MAX_SENSOR_RANGE_CM: f32 = 400.0;

/// Width of the sliding rate-limit window.
pub const RATE_LIMIT_WINDOW_MS: u64 = 1000;
/// Commands accepted per rate-limit window.
pub const MAX_COMMANDS_PER_SECOND: u32 = 10;
/// Minimum gap between two validated commands.
pub const COMMAND_RATE_LIMIT_MS: u64 = 100;

/// At or below this battery percentage the rover heads home.
pub const RETURN_HOME_BATTERY_THRESHOLD: f32 = 15.0;
/// At or below this battery percentage everything halts.
pub const CRITICAL_BATTERY_THRESHOLD: f32 = 5.0;
/// Battery band considered "low" by the emotion scorer.
pub const LOW_BATTERY_THRESHOLD: f32 = 20.0;

pub const EXPLORATION_TIMEOUT_MS: u64 = 30_000;
pub const EXPLORE_DIRECTION_CHANGE_MS: u64 = 3_000;
pub const PATROL_LEG_DURATION_MS: u64 = 5_000;

/// Minimum dwell time between two accepted emotion transitions.
pub const EMOTION_HYSTERESIS_MS: u64 = 3_000;

/// Cadence of the command decision loop.
pub const CONTROL_TICK_MS: u64 = 200;
/// Cadence of the emotion evaluation loop.
pub const EMOTION_TICK_MS: u64 = 500;

/// Detection class that the reactive tier and follow logic track.
pub const PERSON_CLASS: &str = "person";

// ────────────────────────────────────────────────────────────────────────────
// Motor commands
// ────────────────────────────────────────────────────────────────────────────

/// Discrete motion primitive understood by the motor controller firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Stop,
    Forward,
    Backward,
    Left,
    Right,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Stop => "STOP",
            Action::Forward => "FORWARD",
            Action::Backward => "BACKWARD",
            Action::Left => "LEFT",
            Action::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single motor command: an [`Action`] plus a speed.
///
/// The speed is signed so that out-of-range requests can be represented and
/// rejected by the safety validator rather than silently wrapped.
///
/// ```
/// use rover_types::{Action, RoverCommand};
///
/// let cmd = RoverCommand::new(Action::Forward, 180);
/// assert_eq!(cmd.to_wire().unwrap(), r#"{"cmd":"FORWARD","speed":180}"#);
/// assert!(RoverCommand::stop().is_stop());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoverCommand {
    pub cmd: Action,
    pub speed: i32,
}

impl RoverCommand {
    pub fn new(cmd: Action, speed: i32) -> Self {
        Self { cmd, speed }
    }

    /// The universal safe command.
    pub fn stop() -> Self {
        Self::new(Action::Stop, 0)
    }

    pub fn forward(speed: i32) -> Self {
        Self::new(Action::Forward, speed)
    }

    pub fn backward(speed: i32) -> Self {
        Self::new(Action::Backward, speed)
    }

    pub fn left(speed: i32) -> Self {
        Self::new(Action::Left, speed)
    }

    pub fn right(speed: i32) -> Self {
        Self::new(Action::Right, speed)
    }

    pub fn is_stop(&self) -> bool {
        self.cmd == Action::Stop
    }

    /// Serialise to the JSON text frame the motor controller expects.
    pub fn to_wire(&self) -> Result<String, RoverError> {
        serde_json::to_string(self).map_err(|e| RoverError::Serialization(e.to_string()))
    }
}

impl Default for RoverCommand {
    fn default() -> Self {
        Self::stop()
    }
}

impl fmt::Display for RoverCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.cmd, self.speed)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sensors
// ────────────────────────────────────────────────────────────────────────────

/// Latest telemetry frame from the motor controller.  Immutable per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Ultrasonic distance to the nearest obstacle ahead (cm).
    pub distance_cm: f32,
    /// Left line sensor sees the line.
    pub ir_left: bool,
    /// Center line sensor sees the line.
    pub ir_center: bool,
    /// Right line sensor sees the line.
    pub ir_right: bool,
    /// Center sensor reports no surface underneath.
    pub cliff_detected: bool,
    /// Left or right sensor reports no surface underneath.
    pub edge_detected: bool,
    /// Left motor speed readback.
    pub motor_left: i32,
    /// Right motor speed readback.
    pub motor_right: i32,
    /// The firmware has been put into line-follow mode.
    pub line_follow_mode: bool,
}

impl SensorSnapshot {
    /// `true` when either motor readback is non-zero.
    pub fn is_moving(&self) -> bool {
        self.motor_left != 0 || self.motor_right != 0
    }
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self {
            distance_cm: MAX_SENSOR_RANGE_CM,
            ir_left: false,
            ir_center: false,
            ir_right: false,
            cliff_detected: false,
            edge_detected: false,
            motor_left: 0,
            motor_right: 0,
            line_follow_mode: false,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Behavior and emotion states
// ────────────────────────────────────────────────────────────────────────────

/// High-level autonomous goal selected by the behavior tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BehaviorState {
    #[default]
    Idle,
    Explore,
    FollowHuman,
    LineFollow,
    Patrol,
    ReturnHome,
}

impl BehaviorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorState::Idle => "IDLE",
            BehaviorState::Explore => "EXPLORE",
            BehaviorState::FollowHuman => "FOLLOW_HUMAN",
            BehaviorState::LineFollow => "LINE_FOLLOW",
            BehaviorState::Patrol => "PATROL",
            BehaviorState::ReturnHome => "RETURN_HOME",
        }
    }
}

impl fmt::Display for BehaviorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discrete affective state shown by presentation layers.
///
/// Declaration order doubles as the tie-break order of the emotion scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmotionState {
    #[default]
    Neutral,
    Happy,
    Curious,
    Alert,
    Scared,
    Sleepy,
    Love,
    Confused,
    Thinking,
    LowBattery,
}

impl EmotionState {
    /// Every state, in tie-break order.
    pub const ALL: [EmotionState; 10] = [
        EmotionState::Neutral,
        EmotionState::Happy,
        EmotionState::Curious,
        EmotionState::Alert,
        EmotionState::Scared,
        EmotionState::Sleepy,
        EmotionState::Love,
        EmotionState::Confused,
        EmotionState::Thinking,
        EmotionState::LowBattery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionState::Neutral => "NEUTRAL",
            EmotionState::Happy => "HAPPY",
            EmotionState::Curious => "CURIOUS",
            EmotionState::Alert => "ALERT",
            EmotionState::Scared => "SCARED",
            EmotionState::Sleepy => "SLEEPY",
            EmotionState::Love => "LOVE",
            EmotionState::Confused => "CONFUSED",
            EmotionState::Thinking => "THINKING",
            EmotionState::LowBattery => "LOW_BATTERY",
        }
    }

    /// Position in [`EmotionState::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for EmotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionState {
    type Err = RoverError;

    /// Case-insensitive; accepts `low_battery`, `LOW-BATTERY` and `lowbattery`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        EmotionState::ALL
            .into_iter()
            .find(|e| e.as_str().replace('_', "") == normalized)
            .ok_or_else(|| RoverError::UnknownEmotion(s.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Perception and reasoning snapshots
// ────────────────────────────────────────────────────────────────────────────

/// Normalized (0–1) bounding box produced by the object detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub class_name: String,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }
}

/// One frame of object-detection output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionOutput {
    pub labels: Vec<String>,
    pub confidence: f32,
    pub boxes: Vec<BoundingBox>,
    pub timestamp: DateTime<Utc>,
}

impl DetectionOutput {
    /// Build a frame from its boxes, deriving labels and the top confidence.
    pub fn from_boxes(boxes: Vec<BoundingBox>) -> Self {
        let mut labels: Vec<String> = Vec::new();
        for b in &boxes {
            if !labels.contains(&b.class_name) {
                labels.push(b.class_name.clone());
            }
        }
        let confidence = boxes.iter().map(|b| b.confidence).fold(0.0, f32::max);
        Self {
            labels,
            confidence,
            boxes,
            timestamp: Utc::now(),
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }

    /// Highest-confidence box of class [`PERSON_CLASS`], if any.
    pub fn person_box(&self) -> Option<&BoundingBox> {
        self.boxes
            .iter()
            .filter(|b| b.class_name.eq_ignore_ascii_case(PERSON_CLASS))
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}

/// One suggestion from the vision-language reasoning model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionOutput {
    pub suggestion: String,
    pub confidence: f32,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

impl SuggestionOutput {
    pub fn new(suggestion: impl Into<String>, confidence: f32, reasoning: impl Into<String>) -> Self {
        Self {
            suggestion: suggestion.into(),
            confidence,
            reasoning: reasoning.into(),
            timestamp: Utc::now(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Emotion inputs and personality
// ────────────────────────────────────────────────────────────────────────────

/// Signals sampled at emotion-evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionInputs {
    pub battery_level: f32,
    /// Fraction of the near field occupied by obstacles, 0–1.
    pub obstacle_density: f32,
    pub human_present: bool,
    /// Progress of the current task, 0–1.
    pub task_progress: f32,
    /// Emotion proposed by an external collaborator, boosted if present.
    pub suggested_emotion: Option<EmotionState>,
    pub is_stuck: bool,
    pub is_processing: bool,
    pub recent_success: bool,
    pub recent_failure: bool,
    pub curiosity: f32,
    pub sociability: f32,
    pub confidence: f32,
    pub energy: f32,
}

impl Default for EmotionInputs {
    fn default() -> Self {
        Self {
            battery_level: 100.0,
            obstacle_density: 0.0,
            human_present: false,
            task_progress: 0.0,
            suggested_emotion: None,
            is_stuck: false,
            is_processing: false,
            recent_success: false,
            recent_failure: false,
            curiosity: 0.5,
            sociability: 0.5,
            confidence: 0.5,
            energy: 0.5,
        }
    }
}

/// Hand-tuned personality, every field kept in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonalityTraits {
    pub curiosity: f32,
    pub sociability: f32,
    pub confidence: f32,
    pub energy: f32,
    pub playfulness: f32,
}

impl PersonalityTraits {
    /// Clamp every trait back into `[0, 1]`.
    pub fn clamp(&mut self) {
        self.curiosity = self.curiosity.clamp(0.0, 1.0);
        self.sociability = self.sociability.clamp(0.0, 1.0);
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self.energy = self.energy.clamp(0.0, 1.0);
        self.playfulness = self.playfulness.clamp(0.0, 1.0);
    }
}

impl Default for PersonalityTraits {
    fn default() -> Self {
        Self {
            curiosity: 0.7,
            sociability: 0.6,
            confidence: 0.5,
            energy: 0.8,
            playfulness: 0.6,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bus events
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the decision-core event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "rover-runtime::control_loop"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A command left the decision core for the actuator transport.
    CommandIssued(RoverCommand),
    /// A candidate command was vetoed by the safety validator.
    CommandRejected { command: RoverCommand, reason: String },
    BehaviorChanged { from: BehaviorState, to: BehaviorState },
    EmotionChanged { from: EmotionState, to: EmotionState },
    Telemetry(SensorSnapshot),
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type for the plumbing around the decision core.
///
/// Safety rejections are *not* errors of this type; they are ordinary values
/// returned by the validator.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum RoverError {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Transport Error on {component}: {details}")]
    Transport { component: String, details: String },

    #[error("Unknown emotion label: {0}")]
    UnknownEmotion(String),
}
