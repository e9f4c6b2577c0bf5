//! Headless simulation of everything around the decision core.
//!
//! - [`SimWorld`] – a one-dimensional arena: the distance ahead shrinks while
//!   driving forward, turns face a new random wall, the battery drains with
//!   motor use, and line tape or a floor edge occasionally shows up.
//! - [`run_transport`] – plays the motor controller: decodes the wire frames
//!   coming out of the [`ChannelSink`][rover_middleware::ChannelSink], applies
//!   them to the world and streams telemetry back into [`RoverState`] and
//!   onto the telemetry topic of the [`EventBus`].
//! - [`run_perception`] – plays the detector and the reasoning model,
//!   publishing into their [`LatestSlot`]s at their own pace.

use std::time::Duration;

use colored::Colorize;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rover_middleware::{ConnectionState, EventBus, LatestSlot, RoverState};
use rover_types::{
    Action, BoundingBox, DetectionOutput, Event, EventPayload, MAX_SENSOR_RANGE_CM, RoverCommand,
    RoverError, SensorSnapshot, SuggestionOutput,
};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SimConfig;

const TRANSPORT_SOURCE: &str = "rover-cli::sim::transport";

/// Centimetres covered per second at full motor speed.
const CM_PER_SEC_AT_MAX: f32 = 60.0;

const SUGGESTIONS: &[&str] = &[
    "The path ahead looks clear, move forward.",
    "There is a doorway on the left.",
    "Turn right to inspect the shelf.",
    "Wait here for a moment.",
    "I can see a sofa and a lamp.",
    "Back up, the space is too narrow.",
];

// ─────────────────────────────────────────────────────────────────────────────
// SimWorld
// ─────────────────────────────────────────────────────────────────────────────

pub struct SimWorld {
    rng: StdRng,
    distance_cm: f32,
    battery: f32,
    drain_per_sec: f32,
    command: RoverCommand,
    line: (bool, bool, bool),
    edge: bool,
}

impl SimWorld {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            distance_cm: 150.0,
            battery: config.start_battery.clamp(0.0, 100.0),
            drain_per_sec: config.drain_per_sec,
            command: RoverCommand::stop(),
            line: (false, false, false),
            edge: false,
        }
    }

    pub fn command(&self) -> RoverCommand {
        self.command
    }

    pub fn battery(&self) -> f32 {
        self.battery
    }

    /// Latch a new motor command.  Turning faces a fresh wall.
    pub fn apply(&mut self, command: RoverCommand) {
        if matches!(command.cmd, Action::Left | Action::Right) && command != self.command {
            self.distance_cm = self.rng.gen_range(20.0..MAX_SENSOR_RANGE_CM);
            self.edge = false;
        }
        self.command = command;
    }

    /// Advance the world by `dt` and report what the sensors see.
    pub fn step(&mut self, dt: Duration) -> SensorSnapshot {
        let secs = dt.as_secs_f32();
        let travel = self.command.speed as f32 / 255.0 * CM_PER_SEC_AT_MAX * secs;
        match self.command.cmd {
            Action::Forward => self.distance_cm -= travel,
            Action::Backward => self.distance_cm += travel,
            _ => {}
        }
        self.distance_cm = self.distance_cm.clamp(2.0, MAX_SENSOR_RANGE_CM);

        if !self.command.is_stop() {
            self.battery = (self.battery - self.drain_per_sec * secs).max(0.0);
        }

        // Occasional tape on the floor or a step down at the side.
        if self.rng.gen_bool(0.01) {
            self.line = (self.rng.gen_bool(0.5), true, self.rng.gen_bool(0.5));
        } else if self.rng.gen_bool(0.05) {
            self.line = (false, false, false);
        }
        if self.command.cmd == Action::Forward && self.rng.gen_bool(0.002) {
            self.edge = true;
        }

        let (ir_left, ir_center, ir_right) = self.line;
        let (motor_left, motor_right) = match self.command.cmd {
            Action::Stop => (0, 0),
            Action::Forward => (self.command.speed, self.command.speed),
            Action::Backward => (-self.command.speed, -self.command.speed),
            Action::Left => (-self.command.speed, self.command.speed),
            Action::Right => (self.command.speed, -self.command.speed),
        };

        SensorSnapshot {
            distance_cm: self.distance_cm,
            ir_left,
            ir_center,
            ir_right,
            cliff_detected: false,
            edge_detected: self.edge,
            motor_left,
            motor_right,
            line_follow_mode: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Decode one firmware frame.
pub fn decode_frame(frame: &str) -> Result<RoverCommand, RoverError> {
    serde_json::from_str(frame).map_err(|e| RoverError::Serialization(e.to_string()))
}

/// Run until the command channel closes (the control loop has stopped and
/// its final STOP has been applied).
pub async fn run_transport(
    mut world: SimWorld,
    state: RoverState,
    bus: EventBus,
    mut frames: mpsc::Receiver<String>,
    telemetry_period: Duration,
) {
    let mut interval = time::interval(telemetry_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    state.set_connection(ConnectionState::Connected);
    info!("simulated motor controller connected");

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                match decode_frame(&frame) {
                    Ok(command) => {
                        if command != world.command() {
                            println!("  {} {}", "→".cyan(), frame.dimmed());
                        }
                        world.apply(command);
                    }
                    Err(e) => warn!(error = %e, frame = %frame, "dropping malformed frame"),
                }
            }
            _ = interval.tick() => {
                let snapshot = world.step(telemetry_period);
                state.set_sensors(snapshot);
                state.set_battery(world.battery());
                bus.publish(Event::new(TRANSPORT_SOURCE, EventPayload::Telemetry(snapshot)));
            }
        }
    }

    state.set_connection(ConnectionState::Disconnected);
    info!(battery = world.battery(), "simulated motor controller disconnected");
}

// ─────────────────────────────────────────────────────────────────────────────
// Perception
// ─────────────────────────────────────────────────────────────────────────────

/// Fake detector frame: sometimes a person somewhere in view, sometimes
/// furniture only.
pub fn fake_detection(rng: &mut impl Rng) -> DetectionOutput {
    let mut boxes = vec![BoundingBox {
        x: rng.gen_range(0.0..0.8),
        y: 0.5,
        width: 0.2,
        height: 0.3,
        class_name: "chair".into(),
        confidence: rng.gen_range(0.5..0.9),
    }];
    if rng.gen_bool(0.3) {
        boxes.push(BoundingBox {
            x: rng.gen_range(0.0..0.85),
            y: 0.1,
            width: 0.15,
            height: 0.7,
            class_name: "person".into(),
            confidence: rng.gen_range(0.6..1.0),
        });
    }
    DetectionOutput::from_boxes(boxes)
}

/// Publish detections every `detection_period` and a suggestion roughly every
/// `suggestion_period` until shutdown.
pub async fn run_perception(
    seed: u64,
    state: RoverState,
    detections: LatestSlot<DetectionOutput>,
    suggestions: LatestSlot<SuggestionOutput>,
    detection_period: Duration,
    suggestion_period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut rng = StdRng::seed_from_u64(seed.rotate_left(17) ^ 0xD1B5_4A32_D192_ED03);
    let mut detect = time::interval(detection_period);
    let mut suggest = time::interval(suggestion_period);
    detect.set_missed_tick_behavior(MissedTickBehavior::Skip);
    suggest.set_missed_tick_behavior(MissedTickBehavior::Skip);
    state.update_modes(|m| m.detector_ready = true);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = detect.tick() => {
                detections.publish(fake_detection(&mut rng));
            }
            _ = suggest.tick() => {
                state.update_modes(|m| m.processing = true);
                let text = SUGGESTIONS[rng.gen_range(0..SUGGESTIONS.len())];
                debug!(suggestion = text, "reasoning model answered");
                suggestions.publish(SuggestionOutput::new(text, rng.gen_range(0.5..1.0), "simulated"));
                state.update_modes(|m| m.processing = false);
            }
        }
    }

    // Nothing is producing any more; stale output must not linger.
    detections.clear();
    suggestions.clear();
    state.update_modes(|m| m.detector_ready = false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_middleware::Topic;

    fn world() -> SimWorld {
        SimWorld::new(&SimConfig::default())
    }

    #[test]
    fn driving_forward_closes_distance_and_drains_battery() {
        let mut world = world();
        world.apply(RoverCommand::forward(255));
        let before = world.step(Duration::from_millis(0)).distance_cm;
        let after = world.step(Duration::from_secs(1)).distance_cm;
        assert!((before - after - CM_PER_SEC_AT_MAX).abs() < 1e-3 || after == 2.0);
        assert!(world.battery() < 100.0);
    }

    #[test]
    fn stopped_rover_keeps_its_charge() {
        let mut world = world();
        for _ in 0..10 {
            world.step(Duration::from_secs(1));
        }
        assert_eq!(world.battery(), 100.0);
    }

    #[test]
    fn motor_readback_matches_command() {
        let mut world = world();
        world.apply(RoverCommand::left(100));
        let snapshot = world.step(Duration::from_millis(100));
        assert_eq!((snapshot.motor_left, snapshot.motor_right), (-100, 100));
        assert!(snapshot.is_moving());
    }

    #[test]
    fn turning_faces_a_new_wall_in_range() {
        let mut world = world();
        world.apply(RoverCommand::right(180));
        let snapshot = world.step(Duration::ZERO);
        assert!((20.0..=MAX_SENSOR_RANGE_CM).contains(&snapshot.distance_cm));
    }

    #[test]
    fn frames_decode_from_wire() {
        assert_eq!(
            decode_frame(r#"{"cmd":"BACKWARD","speed":108}"#).ok(),
            Some(RoverCommand::backward(108))
        );
        assert!(matches!(
            decode_frame("garbage"),
            Err(RoverError::Serialization(_))
        ));
    }

    #[test]
    fn fake_detections_are_well_formed() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let d = fake_detection(&mut rng);
            assert!(d.has_label("chair"));
            for b in &d.boxes {
                assert!((0.0..=1.0).contains(&b.center_x()));
            }
        }
    }

    #[tokio::test]
    async fn transport_feeds_state_until_channel_closes() {
        let state = RoverState::new();
        let bus = EventBus::default();
        let mut telemetry = bus.subscribe_to(Topic::Telemetry);
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run_transport(
            world(),
            state.clone(),
            bus,
            rx,
            Duration::from_millis(5),
        ));

        tx.send(r#"{"cmd":"FORWARD","speed":200}"#.to_string())
            .await
            .expect("send");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(state.connection(), ConnectionState::Connected);
        assert!(state.sensors().is_moving());
        assert!(matches!(
            telemetry.recv().await.map(|e| e.payload),
            Some(EventPayload::Telemetry(_))
        ));

        drop(tx);
        task.await.expect("transport task");
        assert_eq!(state.connection(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn perception_publishes_then_clears_on_shutdown() {
        let state = RoverState::new();
        let detections = LatestSlot::new();
        let suggestions = LatestSlot::new();
        let mut seen = detections.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_perception(
            9,
            state.clone(),
            detections.clone(),
            suggestions.clone(),
            Duration::from_millis(5),
            Duration::from_millis(5),
            shutdown_rx,
        ));

        seen.changed().await.expect("detection published");
        assert!(detections.latest().is_some());
        assert!(state.modes().detector_ready);

        shutdown_tx.send(true).expect("shutdown");
        task.await.expect("perception task");
        assert!(detections.latest().is_none());
        assert!(suggestions.latest().is_none());
        assert!(!state.modes().detector_ready);
    }
}
