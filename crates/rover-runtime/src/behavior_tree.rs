//! Behavior Tree Engine.
//!
//! A small priority selector that turns the current sensor picture into one
//! high-level [`BehaviorState`].  The tree is built once from
//! [`BehaviorNode`]s; every [`BehaviorTree::tick`] snapshots the shared
//! [`RoverState`] into a [`TickContext`], asks the root selector for the first
//! goal whose condition holds, and publishes the result.
//!
//! # Priority order
//!
//! | # | Condition | Goal |
//! |---|---|---|
//! | 1 | battery ≤ return-home threshold | `RETURN_HOME` |
//! | 2 | cliff under the center sensor | `IDLE` |
//! | 3 | human-follow mode and detector ready | `FOLLOW_HUMAN` |
//! | 4 | line-follow mode or center line sensor | `LINE_FOLLOW` |
//! | 5 | idle and stationary, or exploring within the timeout | `EXPLORE` |
//! | 6 | always | `PATROL` |
//!
//! Battery deliberately outranks the cliff check.
//!
//! # Example
//!
//! ```rust
//! use rover_middleware::RoverState;
//! use rover_runtime::behavior_tree::{BehaviorConfig, BehaviorTree};
//! use rover_types::BehaviorState;
//!
//! let state = RoverState::new();
//! let mut tree = BehaviorTree::new(BehaviorConfig::default(), state.clone());
//!
//! state.set_battery(10.0);
//! assert_eq!(tree.tick(), BehaviorState::ReturnHome);
//! assert_eq!(state.behavior(), BehaviorState::ReturnHome);
//! ```

use std::time::{Duration, Instant};

use rover_middleware::{EventBus, ModeFlags, RoverState};
use rover_types::{
    BehaviorState, EXPLORATION_TIMEOUT_MS, Event, EventPayload, RETURN_HOME_BATTERY_THRESHOLD,
    SensorSnapshot,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Battery percentage at or below which the rover heads home.
    pub return_home_battery: f32,
    /// How long a single exploration run may last.
    pub exploration_timeout_ms: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            return_home_battery: RETURN_HOME_BATTERY_THRESHOLD,
            exploration_timeout_ms: EXPLORATION_TIMEOUT_MS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TickContext
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a node condition may look at during one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    pub sensors: SensorSnapshot,
    pub battery: f32,
    pub modes: ModeFlags,
    /// Behavior before this tick.
    pub current: BehaviorState,
    /// Time since the current exploration run started, if one is running.
    pub exploring_for: Option<Duration>,
}

// ─────────────────────────────────────────────────────────────────────────────
// BehaviorNode
// ─────────────────────────────────────────────────────────────────────────────

type Condition = Box<dyn Fn(&TickContext) -> bool + Send + Sync>;

/// A node in the behavior tree.
pub enum BehaviorNode {
    /// Composite: ticks children left-to-right and returns the first goal
    /// produced.  `None` if every child declines.
    Selector(Vec<BehaviorNode>),
    /// Leaf: yields `goal` when `condition` holds.
    Goal {
        name: &'static str,
        goal: BehaviorState,
        condition: Condition,
    },
}

impl BehaviorNode {
    pub fn goal(
        name: &'static str,
        goal: BehaviorState,
        condition: impl Fn(&TickContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        BehaviorNode::Goal {
            name,
            goal,
            condition: Box::new(condition),
        }
    }

    pub fn selector(children: Vec<BehaviorNode>) -> Self {
        BehaviorNode::Selector(children)
    }

    /// Evaluate this node against `ctx`.
    pub fn tick(&self, ctx: &TickContext) -> Option<BehaviorState> {
        match self {
            BehaviorNode::Goal {
                name,
                goal,
                condition,
            } => {
                if condition(ctx) {
                    debug!(node = name, goal = %goal, "behavior node matched");
                    Some(*goal)
                } else {
                    None
                }
            }
            BehaviorNode::Selector(children) => children.iter().find_map(|child| child.tick(ctx)),
        }
    }
}

/// The rover's standard priority selector.
fn standard_tree(config: &BehaviorConfig) -> BehaviorNode {
    let return_home_battery = config.return_home_battery;
    let exploration_timeout = Duration::from_millis(config.exploration_timeout_ms);

    BehaviorNode::selector(vec![
        BehaviorNode::goal("low_battery", BehaviorState::ReturnHome, move |ctx| {
            ctx.battery <= return_home_battery
        }),
        BehaviorNode::goal("cliff", BehaviorState::Idle, |ctx| {
            ctx.sensors.cliff_detected
        }),
        // Mode flag plus detector readiness, not an actual person detection.
        BehaviorNode::goal("human_detected", BehaviorState::FollowHuman, |ctx| {
            ctx.modes.human_follow && ctx.modes.detector_ready
        }),
        BehaviorNode::goal("line_detected", BehaviorState::LineFollow, |ctx| {
            ctx.sensors.line_follow_mode || ctx.sensors.ir_center
        }),
        BehaviorNode::goal("should_explore", BehaviorState::Explore, move |ctx| {
            let idle_and_still = ctx.current == BehaviorState::Idle && !ctx.sensors.is_moving();
            let still_exploring = ctx.current == BehaviorState::Explore
                && ctx.exploring_for.is_none_or(|d| d < exploration_timeout);
            idle_and_still || still_exploring
        }),
        BehaviorNode::goal("patrol", BehaviorState::Patrol, |_| true),
    ])
}

// ─────────────────────────────────────────────────────────────────────────────
// BehaviorTree
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the current [`BehaviorState`] and the tree that advances it.
pub struct BehaviorTree {
    root: BehaviorNode,
    state: RoverState,
    bus: Option<EventBus>,
    current: BehaviorState,
    exploration_started: Option<Instant>,
}

impl BehaviorTree {
    pub fn new(config: BehaviorConfig, state: RoverState) -> Self {
        Self {
            root: standard_tree(&config),
            state,
            bus: None,
            current: BehaviorState::Idle,
            exploration_started: None,
        }
    }

    /// Also announce transitions on `bus`.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn current_behavior(&self) -> BehaviorState {
        self.current
    }

    /// Evaluate the tree once and publish the resulting behavior.
    pub fn tick(&mut self) -> BehaviorState {
        self.tick_at(Instant::now())
    }

    /// [`tick`][Self::tick] with an explicit clock.
    pub fn tick_at(&mut self, now: Instant) -> BehaviorState {
        let ctx = TickContext {
            sensors: self.state.sensors(),
            battery: self.state.battery(),
            modes: self.state.modes(),
            current: self.current,
            exploring_for: self
                .exploration_started
                .map(|start| now.saturating_duration_since(start)),
        };

        let next = self.root.tick(&ctx).unwrap_or(BehaviorState::Patrol);

        if next == BehaviorState::Explore && self.current != BehaviorState::Explore {
            self.exploration_started = Some(now);
        }

        if next != self.current {
            let previous = self.current;
            info!(from = %previous, to = %next, "behavior transition");
            self.current = next;
            self.state.set_behavior(next);
            if let Some(bus) = &self.bus {
                bus.publish(Event::new(
                    "rover-runtime::behavior_tree",
                    EventPayload::BehaviorChanged {
                        from: previous,
                        to: next,
                    },
                ));
            }
        }

        next
    }

    /// Back to `IDLE` with no exploration run in progress.
    pub fn reset(&mut self) {
        self.current = BehaviorState::Idle;
        self.exploration_started = None;
        self.state.set_behavior(BehaviorState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_middleware::Topic;

    fn tree() -> (BehaviorTree, RoverState) {
        let state = RoverState::new();
        (BehaviorTree::new(BehaviorConfig::default(), state.clone()), state)
    }

    fn moving() -> SensorSnapshot {
        SensorSnapshot {
            motor_left: 120,
            motor_right: 120,
            ..SensorSnapshot::default()
        }
    }

    #[test]
    fn low_battery_outranks_cliff() {
        let (mut tree, state) = tree();
        state.set_battery(12.0);
        state.set_sensors(SensorSnapshot {
            cliff_detected: true,
            ..SensorSnapshot::default()
        });
        assert_eq!(tree.tick(), BehaviorState::ReturnHome);
    }

    #[test]
    fn return_home_threshold_is_inclusive() {
        let (mut tree, state) = tree();
        state.set_battery(15.0);
        assert_eq!(tree.tick(), BehaviorState::ReturnHome);
        state.set_battery(15.1);
        state.set_sensors(moving());
        assert_ne!(tree.tick(), BehaviorState::ReturnHome);
    }

    #[test]
    fn cliff_forces_idle() {
        let (mut tree, state) = tree();
        state.set_sensors(SensorSnapshot {
            cliff_detected: true,
            ir_center: true,
            ..SensorSnapshot::default()
        });
        assert_eq!(tree.tick(), BehaviorState::Idle);
    }

    #[test]
    fn follow_human_needs_mode_and_detector() {
        let (mut tree, state) = tree();
        state.set_sensors(moving());
        state.update_modes(|m| m.human_follow = true);
        assert_ne!(tree.tick(), BehaviorState::FollowHuman);

        state.update_modes(|m| m.detector_ready = true);
        assert_eq!(tree.tick(), BehaviorState::FollowHuman);
    }

    #[test]
    fn line_sensor_or_mode_selects_line_follow() {
        let (mut tree, state) = tree();
        state.set_sensors(SensorSnapshot {
            ir_center: true,
            ..moving()
        });
        assert_eq!(tree.tick(), BehaviorState::LineFollow);

        state.set_sensors(SensorSnapshot {
            line_follow_mode: true,
            ..moving()
        });
        assert_eq!(tree.tick(), BehaviorState::LineFollow);
    }

    #[test]
    fn idle_and_still_starts_exploring() {
        let (mut tree, state) = tree();
        assert_eq!(tree.tick(), BehaviorState::Explore);
        assert_eq!(state.behavior(), BehaviorState::Explore);
    }

    #[test]
    fn idle_but_moving_patrols() {
        let (mut tree, state) = tree();
        state.set_sensors(moving());
        assert_eq!(tree.tick(), BehaviorState::Patrol);
    }

    #[test]
    fn exploration_times_out_into_patrol() {
        let (mut tree, state) = tree();
        let start = Instant::now();
        assert_eq!(tree.tick_at(start), BehaviorState::Explore);

        state.set_sensors(moving());
        assert_eq!(
            tree.tick_at(start + Duration::from_secs(29)),
            BehaviorState::Explore
        );
        assert_eq!(
            tree.tick_at(start + Duration::from_secs(30)),
            BehaviorState::Patrol
        );
    }

    #[test]
    fn re_entering_explore_restarts_the_timer() {
        let (mut tree, state) = tree();
        let start = Instant::now();
        tree.tick_at(start);

        // Interrupted by a cliff, then idle again.
        state.set_sensors(SensorSnapshot {
            cliff_detected: true,
            ..SensorSnapshot::default()
        });
        assert_eq!(tree.tick_at(start + Duration::from_secs(25)), BehaviorState::Idle);

        state.set_sensors(SensorSnapshot::default());
        let restart = start + Duration::from_secs(26);
        assert_eq!(tree.tick_at(restart), BehaviorState::Explore);

        state.set_sensors(moving());
        assert_eq!(
            tree.tick_at(restart + Duration::from_secs(20)),
            BehaviorState::Explore
        );
    }

    #[test]
    fn reset_returns_to_idle() {
        let (mut tree, state) = tree();
        state.set_battery(3.0);
        tree.tick();
        tree.reset();
        assert_eq!(tree.current_behavior(), BehaviorState::Idle);
        assert_eq!(state.behavior(), BehaviorState::Idle);
    }

    #[test]
    fn transitions_are_announced_on_the_bus() {
        let state = RoverState::new();
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Behavior);
        let mut tree = BehaviorTree::new(BehaviorConfig::default(), state).with_bus(bus);

        tree.tick();
        tree.tick();

        match rx.try_recv().map(|e| e.payload) {
            Some(EventPayload::BehaviorChanged { from, to }) => {
                assert_eq!(from, BehaviorState::Idle);
                assert_eq!(to, BehaviorState::Explore);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        // No transition on the second tick.
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn selector_returns_first_match() {
        let root = BehaviorNode::selector(vec![
            BehaviorNode::goal("never", BehaviorState::Patrol, |_| false),
            BehaviorNode::goal("a", BehaviorState::Explore, |_| true),
            BehaviorNode::goal("b", BehaviorState::Idle, |_| true),
        ]);
        let ctx = TickContext {
            sensors: SensorSnapshot::default(),
            battery: 100.0,
            modes: ModeFlags::default(),
            current: BehaviorState::Idle,
            exploring_for: None,
        };
        assert_eq!(root.tick(&ctx), Some(BehaviorState::Explore));
        assert_eq!(BehaviorNode::selector(vec![]).tick(&ctx), None);
    }
}
