//! The two periodic tasks that drive the rover.
//!
//! - [`ControlLoop`] – every control tick, reads the latest detection and
//!   suggestion, asks the [`DecisionFusionEngine`] for a command and hands it
//!   to the [`CommandSink`].  On shutdown it sends one last STOP.
//! - [`EmotionLoop`] – on its own slower cadence, turns what changed since
//!   the last tick into [`LifeEvent`]s for the personality, samples
//!   [`EmotionInputs`][rover_types::EmotionInputs] and lets the
//!   [`EmotionEngine`] publish with hysteresis.
//!
//! Both loops own their engines outright, so every tick runs to completion
//! before the next one starts.  They stop when the shared shutdown
//! `watch::Receiver<bool>` flips to `true` or its sender is dropped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rover_middleware::{CommandSink, EventBus, LatestSlot, RoverState, Topic, TopicReceiver};
use rover_types::{
    DetectionOutput, EmotionState, Event, EventPayload, PERSON_CLASS, RoverCommand, RoverError,
    SuggestionOutput,
};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::emotion_engine::{EmotionEngine, sample_emotion_inputs};
use crate::fusion_engine::DecisionFusionEngine;
use crate::personality::{LifeEvent, TraitEvolution};

const SOURCE: &str = "rover-runtime::control_loop";

/// Resolves once shutdown has been requested.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

pub struct ControlLoop {
    engine: DecisionFusionEngine,
    detections: LatestSlot<DetectionOutput>,
    suggestions: LatestSlot<SuggestionOutput>,
    sink: Arc<dyn CommandSink>,
    bus: EventBus,
    period: Duration,
}

impl ControlLoop {
    pub fn new(
        config: &RuntimeConfig,
        state: RoverState,
        detections: LatestSlot<DetectionOutput>,
        suggestions: LatestSlot<SuggestionOutput>,
        sink: Arc<dyn CommandSink>,
        bus: EventBus,
    ) -> Self {
        let engine =
            DecisionFusionEngine::new(config.fusion.clone(), state).with_bus(bus.clone());
        Self {
            engine,
            detections,
            suggestions,
            sink,
            bus,
            period: Duration::from_millis(config.tick_ms),
        }
    }

    pub fn engine(&self) -> &DecisionFusionEngine {
        &self.engine
    }

    /// One decision, sent and announced.
    ///
    /// # Errors
    ///
    /// Whatever the sink reports; the decision itself cannot fail.
    pub async fn tick(&mut self) -> Result<RoverCommand, RoverError> {
        let detection = self.detections.latest();
        let suggestion = self.suggestions.latest();
        let command = self.engine.decide(detection.as_ref(), suggestion.as_ref());
        self.send(command).await?;
        Ok(command)
    }

    /// Tick until shutdown, then send a final STOP.
    ///
    /// # Errors
    ///
    /// Stops early with the sink's error if the transport goes away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), RoverError> {
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_ms = self.period.as_millis() as u64, "control loop started");

        let result = loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break Ok(()),
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "command transport failed; stopping control loop");
                        break Err(e);
                    }
                }
            }
        };

        if let Err(e) = self.send(RoverCommand::stop()).await {
            warn!(error = %e, "final STOP could not be delivered");
        }
        info!("control loop stopped");
        result
    }

    async fn send(&self, command: RoverCommand) -> Result<(), RoverError> {
        self.sink.send(command).await?;
        debug!(command = %command, "command issued");
        self.bus
            .publish(Event::new(SOURCE, EventPayload::CommandIssued(command)));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EmotionLoop
// ─────────────────────────────────────────────────────────────────────────────

pub struct EmotionLoop {
    engine: EmotionEngine,
    traits: TraitEvolution,
    state: RoverState,
    detections: LatestSlot<DetectionOutput>,
    vetoes: TopicReceiver,
    critical_battery: f32,
    obstacle_slow_cm: f32,
    period: Duration,
    // Edge detectors: events fire on the change, not while a level holds.
    person_in_view: bool,
    near_obstacle: bool,
    vetoed_last_tick: bool,
    seen_labels: HashSet<String>,
}

impl EmotionLoop {
    pub fn new(
        config: &RuntimeConfig,
        state: RoverState,
        detections: LatestSlot<DetectionOutput>,
        bus: EventBus,
    ) -> Self {
        let vetoes = bus.subscribe_to(Topic::Safety);
        Self {
            engine: EmotionEngine::new(config.emotion.clone(), state.clone()).with_bus(bus),
            traits: TraitEvolution::new(config.personality),
            state,
            detections,
            vetoes,
            critical_battery: config.emotion.critical_battery,
            obstacle_slow_cm: config.fusion.goals.obstacle_slow_cm,
            period: Duration::from_millis(config.emotion_tick_ms),
            person_in_view: false,
            near_obstacle: false,
            vetoed_last_tick: false,
            seen_labels: HashSet::new(),
        }
    }

    pub fn traits(&self) -> &TraitEvolution {
        &self.traits
    }

    /// Evaluate once; returns the emotion now published.
    pub fn tick(&mut self) -> EmotionState {
        let battery = self.state.battery();
        self.traits.apply(LifeEvent::BatteryChanged(battery));

        let detection = self.detections.latest();
        let (succeeded, failed) = self.observe(detection.as_ref());

        if battery <= self.critical_battery {
            self.engine.force_emotion(EmotionState::LowBattery);
            return EmotionState::LowBattery;
        }

        let mut inputs =
            sample_emotion_inputs(&self.state, detection.as_ref(), self.traits.traits());
        inputs.recent_success = succeeded;
        inputs.recent_failure = failed;
        self.engine.update_emotion(&inputs)
    }

    /// Feed this tick's life events to the personality.  Returns whether
    /// the rover just got clear of an obstacle and whether a new run of
    /// vetoed commands started.
    fn observe(&mut self, detection: Option<&DetectionOutput>) -> (bool, bool) {
        let person = detection.is_some_and(|d| d.has_label(PERSON_CLASS));
        if person && !self.person_in_view {
            self.traits.apply(LifeEvent::HumanInteraction);
        }
        self.person_in_view = person;

        for label in detection.into_iter().flat_map(|d| d.labels.iter()) {
            let label = label.to_ascii_lowercase();
            if label != PERSON_CLASS && self.seen_labels.insert(label.clone()) {
                debug!(label = %label, "new kind of object seen");
                self.traits.apply(LifeEvent::Discovery);
            }
        }

        let sensors = self.state.sensors();
        let near = sensors.distance_cm < self.obstacle_slow_cm;
        let mut succeeded = false;
        if near && !self.near_obstacle {
            self.traits.apply(LifeEvent::ObstacleEncounter);
        } else if !near && self.near_obstacle && sensors.is_moving() {
            self.traits.apply(LifeEvent::Success);
            succeeded = true;
        }
        self.near_obstacle = near;

        let mut vetoed = false;
        while let Some(event) = self.vetoes.try_recv() {
            vetoed |= matches!(event.payload, EventPayload::CommandRejected { .. });
        }
        let failed = vetoed && !self.vetoed_last_tick;
        if failed {
            self.traits.apply(LifeEvent::Failure);
        }
        self.vetoed_last_tick = vetoed;

        (succeeded, failed)
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_ms = self.period.as_millis() as u64, "emotion loop started");

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
        info!("emotion loop stopped");
    }
}
