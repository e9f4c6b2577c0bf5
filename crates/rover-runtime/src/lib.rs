//! `rover-runtime` – The Decision Core
//!
//! Everything that decides what the rover does next and how it feels about
//! it.
//!
//! # Modules
//!
//! - [`behavior_tree`] – [`BehaviorTree`][behavior_tree::BehaviorTree]: a
//!   priority selector of [`BehaviorNode`][behavior_tree::BehaviorNode]s that
//!   picks the current high-level goal from the shared state.
//! - [`goal_generator`] – [`GoalCommandGenerator`][goal_generator::GoalCommandGenerator]:
//!   maps a goal to a concrete motor command (random-walk explore, square
//!   patrol, standoff follow, line follow).
//! - [`suggestion`] – keyword extraction from reasoning-model text.
//! - [`fusion_engine`] – [`DecisionFusionEngine`][fusion_engine::DecisionFusionEngine]:
//!   four-tier arbitration between safety override, reactive detections,
//!   behavior goals and suggestions, each candidate gated by the
//!   [`SafetyValidator`][rover_kernel::SafetyValidator].
//! - [`emotion_engine`] – [`EmotionEngine`][emotion_engine::EmotionEngine]:
//!   weighted emotion scoring published with hysteresis, plus
//!   [`sample_emotion_inputs`][emotion_engine::sample_emotion_inputs].
//! - [`personality`] – [`TraitEvolution`][personality::TraitEvolution]: slow
//!   personality drift driven by [`LifeEvent`][personality::LifeEvent]s.
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop] and
//!   [`EmotionLoop`][control_loop::EmotionLoop]: the periodic Tokio tasks.
//! - [`config`] – [`RuntimeConfig`][config::RuntimeConfig]: every tunable in
//!   one serde tree.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: tracing
//!   subscriber with optional OTLP export.

pub mod behavior_tree;
pub mod config;
pub mod control_loop;
pub mod emotion_engine;
pub mod fusion_engine;
pub mod goal_generator;
pub mod personality;
pub mod suggestion;
pub mod telemetry;

pub use behavior_tree::{BehaviorConfig, BehaviorNode, BehaviorTree, TickContext};
pub use config::RuntimeConfig;
pub use control_loop::{ControlLoop, EmotionLoop};
pub use emotion_engine::{
    EmotionConfig, EmotionEngine, compute_emotion, sample_emotion_inputs, score_emotions,
};
pub use fusion_engine::{DecisionFusionEngine, FusionConfig};
pub use goal_generator::{GoalCommandGenerator, GoalConfig};
pub use personality::{LifeEvent, TraitEvolution};
pub use suggestion::{parse_action, suggestion_command};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};

// Re-exported so callers composing the core need only this crate for the
// safety gate.
pub use rover_kernel::{SafetyLimits, SafetyValidator};
