//! [`RoverState`] – rover-wide shared state store.
//!
//! One [`tokio::sync::watch`] channel per field: readers always see the
//! latest value without blocking, and can `subscribe_*` to be woken on
//! change.  Clone the handle freely; every clone shares the same channels.
//!
//! | Field | Written by | Read by |
//! |---|---|---|
//! | sensors, battery, connection | telemetry transport | behavior tree, fusion engine, emotion sampler |
//! | behavior | behavior tree | UI, logging |
//! | emotion | emotion engine | UI, logging |
//! | modes | operator / app layer | behavior tree, fusion engine |

use std::sync::Arc;

use rover_types::{BehaviorState, EmotionState, SensorSnapshot};
use tokio::sync::watch;

/// Link state between the decision core and the motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Operator-controlled switches and collaborator status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeFlags {
    /// Operator asked the rover to follow a person.
    pub human_follow: bool,
    /// The detection collaborator has loaded its model and is producing output.
    pub detector_ready: bool,
    /// Behavior-tree goals are allowed to drive the rover.
    pub autonomy_enabled: bool,
    /// A reasoning request is in flight.
    pub processing: bool,
}

impl Default for ModeFlags {
    fn default() -> Self {
        Self {
            human_follow: false,
            detector_ready: false,
            autonomy_enabled: true,
            processing: false,
        }
    }
}

struct Channels {
    sensors: watch::Sender<SensorSnapshot>,
    battery: watch::Sender<f32>,
    connection: watch::Sender<ConnectionState>,
    behavior: watch::Sender<BehaviorState>,
    emotion: watch::Sender<EmotionState>,
    modes: watch::Sender<ModeFlags>,
}

/// Shared handle to the rover-wide state.
///
/// ```
/// use rover_middleware::RoverState;
/// use rover_types::BehaviorState;
///
/// let state = RoverState::new();
/// let rx = state.subscribe_behavior();
/// state.set_behavior(BehaviorState::Patrol);
/// assert_eq!(*rx.borrow(), BehaviorState::Patrol);
/// ```
#[derive(Clone)]
pub struct RoverState {
    channels: Arc<Channels>,
}

impl RoverState {
    /// Fresh state: default sensors, full battery, IDLE, NEUTRAL.
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Channels {
                sensors: watch::Sender::new(SensorSnapshot::default()),
                battery: watch::Sender::new(100.0),
                connection: watch::Sender::new(ConnectionState::default()),
                behavior: watch::Sender::new(BehaviorState::default()),
                emotion: watch::Sender::new(EmotionState::default()),
                modes: watch::Sender::new(ModeFlags::default()),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Telemetry
    // -----------------------------------------------------------------------

    pub fn sensors(&self) -> SensorSnapshot {
        *self.channels.sensors.borrow()
    }

    pub fn set_sensors(&self, sensors: SensorSnapshot) {
        self.channels.sensors.send_replace(sensors);
    }

    pub fn subscribe_sensors(&self) -> watch::Receiver<SensorSnapshot> {
        self.channels.sensors.subscribe()
    }

    /// Battery level in percent.
    pub fn battery(&self) -> f32 {
        *self.channels.battery.borrow()
    }

    /// Store a battery reading, clamped to 0–100.
    pub fn set_battery(&self, percent: f32) {
        self.channels.battery.send_replace(percent.clamp(0.0, 100.0));
    }

    pub fn connection(&self) -> ConnectionState {
        *self.channels.connection.borrow()
    }

    pub fn set_connection(&self, connection: ConnectionState) {
        self.channels.connection.send_replace(connection);
    }

    // -----------------------------------------------------------------------
    // Behavior / emotion
    // -----------------------------------------------------------------------

    pub fn behavior(&self) -> BehaviorState {
        *self.channels.behavior.borrow()
    }

    /// Publish a behavior; returns the one it replaced.
    pub fn set_behavior(&self, behavior: BehaviorState) -> BehaviorState {
        self.channels.behavior.send_replace(behavior)
    }

    pub fn subscribe_behavior(&self) -> watch::Receiver<BehaviorState> {
        self.channels.behavior.subscribe()
    }

    pub fn emotion(&self) -> EmotionState {
        *self.channels.emotion.borrow()
    }

    /// Publish an emotion; returns the one it replaced.
    pub fn set_emotion(&self, emotion: EmotionState) -> EmotionState {
        self.channels.emotion.send_replace(emotion)
    }

    pub fn subscribe_emotion(&self) -> watch::Receiver<EmotionState> {
        self.channels.emotion.subscribe()
    }

    // -----------------------------------------------------------------------
    // Modes
    // -----------------------------------------------------------------------

    pub fn modes(&self) -> ModeFlags {
        *self.channels.modes.borrow()
    }

    /// Mutate the mode flags in place and notify subscribers.
    pub fn update_modes(&self, modify: impl FnOnce(&mut ModeFlags)) {
        self.channels.modes.send_modify(modify);
    }
}

impl Default for RoverState {
    fn default() -> Self {
        Self::new()
    }
}
