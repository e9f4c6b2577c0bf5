//! [`EmotionEngine`] – weighted multi-factor emotion scoring with hysteresis.
//!
//! Scoring is a pure function of [`EmotionInputs`]: every one of the ten
//! [`EmotionState`]s gets an additive score from battery bands, obstacle
//! density, personality traits and status flags, and the highest score wins
//! (ties go to the state listed first in [`EmotionState::ALL`]).  A critical
//! battery short-circuits straight to `LOW_BATTERY`.
//!
//! Publishing is throttled: a new winner replaces the current emotion only
//! once the previous one has been shown for at least the hysteresis window.
//! [`EmotionEngine::force_emotion`] skips the wait.

use std::time::{Duration, Instant};

use rover_middleware::{EventBus, RoverState};
use rover_types::{
    CRITICAL_BATTERY_THRESHOLD, DetectionOutput, EMOTION_HYSTERESIS_MS, EmotionInputs,
    EmotionState, Event, EventPayload, LOW_BATTERY_THRESHOLD, OBSTACLE_SLOW_CM, PERSON_CLASS,
    PersonalityTraits,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    /// Minimum time an emotion stays published before it may change.
    pub hysteresis_ms: u64,
    pub critical_battery: f32,
    pub low_battery: f32,
    /// Added to the score of an externally suggested emotion.
    pub suggestion_boost: f32,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            hysteresis_ms: EMOTION_HYSTERESIS_MS,
            critical_battery: CRITICAL_BATTERY_THRESHOLD,
            low_battery: LOW_BATTERY_THRESHOLD,
            suggestion_boost: 0.3,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scoring
// ─────────────────────────────────────────────────────────────────────────────

/// Score of every emotion, indexed by [`EmotionState::index`].
pub fn score_emotions(inputs: &EmotionInputs, config: &EmotionConfig) -> [f32; 10] {
    let mut scores = [0.0f32; 10];
    let mut add = |state: EmotionState, value: f32| scores[state.index()] += value;

    let battery = inputs.battery_level;
    let density = inputs.obstacle_density;

    add(EmotionState::Neutral, 0.3);

    if battery <= config.critical_battery {
        add(EmotionState::LowBattery, 1.5);
    } else if battery <= config.low_battery {
        add(EmotionState::LowBattery, 0.8);
    }

    if battery < 40.0 {
        add(EmotionState::Sleepy, 0.3 + (1.0 - inputs.energy) * 0.4);
    }

    if density > 0.7 {
        add(EmotionState::Scared, 0.3 + 0.8 * (1.0 - inputs.confidence));
        add(EmotionState::Alert, 0.5);
    } else if density > 0.4 {
        add(EmotionState::Alert, 0.6);
    }
    if inputs.is_stuck {
        add(EmotionState::Scared, 0.3);
        add(EmotionState::Confused, 0.6);
    }
    if inputs.recent_failure {
        add(EmotionState::Scared, 0.2);
        add(EmotionState::Confused, 0.3);
    }
    add(EmotionState::Confused, 0.2 * (1.0 - inputs.confidence));

    add(EmotionState::Curious, inputs.curiosity * 0.6);
    if density < 0.3 {
        add(EmotionState::Curious, 0.2);
    }

    if inputs.recent_success {
        add(EmotionState::Happy, 0.6);
    }
    if battery > 60.0 {
        add(EmotionState::Happy, 0.1);
    }
    add(EmotionState::Happy, 0.1 * inputs.energy);

    if inputs.human_present {
        add(EmotionState::Happy, 0.2 * inputs.sociability);
        add(EmotionState::Love, 0.4 + 0.5 * inputs.sociability);
    } else {
        add(EmotionState::Curious, 0.1);
    }

    if inputs.is_processing {
        add(EmotionState::Thinking, 0.8);
    }
    if inputs.task_progress > 0.0 && inputs.task_progress < 1.0 {
        add(EmotionState::Thinking, 0.2);
    }

    if let Some(suggested) = inputs.suggested_emotion {
        add(suggested, config.suggestion_boost);
    }

    scores
}

/// Winner for `inputs`.  Pure; no state is touched.
pub fn compute_emotion(inputs: &EmotionInputs, config: &EmotionConfig) -> EmotionState {
    if inputs.battery_level <= config.critical_battery {
        return EmotionState::LowBattery;
    }

    let scores = score_emotions(inputs, config);
    let mut best = EmotionState::ALL[0];
    for state in EmotionState::ALL {
        if scores[state.index()] > scores[best.index()] {
            best = state;
        }
    }
    best
}

// ─────────────────────────────────────────────────────────────────────────────
// Input sampling
// ─────────────────────────────────────────────────────────────────────────────

/// Assemble [`EmotionInputs`] from the shared state, the latest detection and
/// the current personality.
///
/// Obstacle density is `1 - distance / slow distance`, clamped to `[0, 1]`.
/// Stuck / success / failure flags and task progress are left at their
/// defaults; callers that track them set them afterwards.
pub fn sample_emotion_inputs(
    state: &RoverState,
    detection: Option<&DetectionOutput>,
    traits: &PersonalityTraits,
) -> EmotionInputs {
    let sensors = state.sensors();
    EmotionInputs {
        battery_level: state.battery(),
        obstacle_density: (1.0 - sensors.distance_cm / OBSTACLE_SLOW_CM).clamp(0.0, 1.0),
        human_present: detection.is_some_and(|d| d.has_label(PERSON_CLASS)),
        is_processing: state.modes().processing,
        curiosity: traits.curiosity,
        sociability: traits.sociability,
        confidence: traits.confidence,
        energy: traits.energy,
        ..EmotionInputs::default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EmotionEngine
// ─────────────────────────────────────────────────────────────────────────────

pub struct EmotionEngine {
    config: EmotionConfig,
    state: RoverState,
    bus: Option<EventBus>,
    last_change: Option<Instant>,
}

impl EmotionEngine {
    pub fn new(config: EmotionConfig, state: RoverState) -> Self {
        Self {
            config,
            state,
            bus: None,
            last_change: None,
        }
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn current_emotion(&self) -> EmotionState {
        self.state.emotion()
    }

    pub fn compute_emotion(&self, inputs: &EmotionInputs) -> EmotionState {
        compute_emotion(inputs, &self.config)
    }

    pub fn scores(&self, inputs: &EmotionInputs) -> [f32; 10] {
        score_emotions(inputs, &self.config)
    }

    /// Score `inputs` and publish the winner if the hysteresis window allows.
    /// Returns the emotion published after the call.
    pub fn update_emotion(&mut self, inputs: &EmotionInputs) -> EmotionState {
        self.update_emotion_at(inputs, Instant::now())
    }

    /// [`update_emotion`][Self::update_emotion] with an explicit clock.
    pub fn update_emotion_at(&mut self, inputs: &EmotionInputs, now: Instant) -> EmotionState {
        let current = self.state.emotion();
        let winner = self.compute_emotion(inputs);
        if winner == current {
            return current;
        }

        let window = Duration::from_millis(self.config.hysteresis_ms);
        if let Some(since) = self.last_change.map(|at| now.saturating_duration_since(at)) {
            if since < window {
                debug!(
                    from = %current,
                    to = %winner,
                    held_ms = since.as_millis() as u64,
                    "emotion change held back"
                );
                return current;
            }
        }

        self.apply(current, winner, now);
        winner
    }

    /// Publish `emotion` immediately, ignoring hysteresis.
    pub fn force_emotion(&mut self, emotion: EmotionState) {
        self.force_emotion_at(emotion, Instant::now());
    }

    pub fn force_emotion_at(&mut self, emotion: EmotionState, now: Instant) {
        let current = self.state.emotion();
        if current != emotion {
            self.apply(current, emotion, now);
        }
    }

    fn apply(&mut self, from: EmotionState, to: EmotionState, now: Instant) {
        info!(from = %from, to = %to, "emotion transition");
        self.last_change = Some(now);
        self.state.set_emotion(to);
        if let Some(bus) = &self.bus {
            bus.publish(Event::new(
                "rover-runtime::emotion_engine",
                EventPayload::EmotionChanged { from, to },
            ));
        }
    }
}
