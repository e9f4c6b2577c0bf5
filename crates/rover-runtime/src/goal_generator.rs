//! [`GoalCommandGenerator`] – turns a [`BehaviorState`] into one motor
//! command.
//!
//! Holds the little rolling state the goals need between ticks: the last
//! explore direction and when it was chosen, and the patrol leg phase and when
//! the leg started.  Random choices come from a seeded [`StdRng`] so a given
//! seed always replays the same walk.

use std::time::{Duration, Instant};

use rover_types::{
    Action, BehaviorState, DEFAULT_MOTOR_SPEED, EXPLORE_DIRECTION_CHANGE_MS,
    HUMAN_FOLLOW_DISTANCE_CM, HUMAN_FOLLOW_TOLERANCE, OBSTACLE_SLOW_CM, OBSTACLE_STOP_CM,
    PATROL_LEG_DURATION_MS, RoverCommand, SLOW_SPEED_FACTOR, SensorSnapshot,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of legs in one patrol square.
const PATROL_PHASES: u8 = 4;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalConfig {
    pub default_speed: i32,
    pub slow_speed_factor: f32,
    pub obstacle_stop_cm: f32,
    pub obstacle_slow_cm: f32,
    pub follow_distance_cm: f32,
    /// Fractional band around `follow_distance_cm` treated as "close enough".
    pub follow_tolerance: f32,
    pub direction_change_ms: u64,
    pub patrol_leg_ms: u64,
    /// Seed for the explore walk.
    pub seed: u64,
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            default_speed: DEFAULT_MOTOR_SPEED,
            slow_speed_factor: SLOW_SPEED_FACTOR,
            obstacle_stop_cm: OBSTACLE_STOP_CM,
            obstacle_slow_cm: OBSTACLE_SLOW_CM,
            follow_distance_cm: HUMAN_FOLLOW_DISTANCE_CM,
            follow_tolerance: HUMAN_FOLLOW_TOLERANCE,
            direction_change_ms: EXPLORE_DIRECTION_CHANGE_MS,
            patrol_leg_ms: PATROL_LEG_DURATION_MS,
            seed: 0x5EED_F00D_CAFE_D00D,
        }
    }
}

impl GoalConfig {
    /// Reduced speed used near obstacles and for turns that need care.
    pub fn slow_speed(&self) -> i32 {
        (self.default_speed as f32 * self.slow_speed_factor).round() as i32
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GoalCommandGenerator
// ─────────────────────────────────────────────────────────────────────────────

pub struct GoalCommandGenerator {
    config: GoalConfig,
    rng: StdRng,
    explore_direction: Action,
    last_direction_change: Option<Instant>,
    patrol_phase: u8,
    patrol_leg_started: Option<Instant>,
}

impl GoalCommandGenerator {
    pub fn new(config: GoalConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            explore_direction: Action::Forward,
            last_direction_change: None,
            patrol_phase: 0,
            patrol_leg_started: None,
        }
    }

    pub fn config(&self) -> &GoalConfig {
        &self.config
    }

    pub fn explore_direction(&self) -> Action {
        self.explore_direction
    }

    pub fn patrol_phase(&self) -> u8 {
        self.patrol_phase
    }

    pub fn generate_command(
        &mut self,
        behavior: BehaviorState,
        sensors: &SensorSnapshot,
    ) -> RoverCommand {
        self.generate_command_at(behavior, sensors, Instant::now())
    }

    /// [`generate_command`][Self::generate_command] with an explicit clock.
    pub fn generate_command_at(
        &mut self,
        behavior: BehaviorState,
        sensors: &SensorSnapshot,
        now: Instant,
    ) -> RoverCommand {
        let command = match behavior {
            BehaviorState::Idle => RoverCommand::stop(),
            BehaviorState::Explore => self.explore(sensors, now),
            BehaviorState::FollowHuman => self.follow_human(sensors),
            BehaviorState::LineFollow => self.line_follow(sensors),
            BehaviorState::Patrol => self.patrol(sensors, now),
            // No path planning; back away slowly.
            BehaviorState::ReturnHome => RoverCommand::backward(self.config.slow_speed()),
        };
        debug!(behavior = %behavior, command = %command, "goal command");
        command
    }

    /// Forget the walk direction, patrol phase and all timers.
    pub fn reset(&mut self) {
        self.explore_direction = Action::Forward;
        self.last_direction_change = None;
        self.patrol_phase = 0;
        self.patrol_leg_started = None;
    }

    // ── Explore ──────────────────────────────────────────────────────────────

    fn explore(&mut self, sensors: &SensorSnapshot, now: Instant) -> RoverCommand {
        let speed = self.config.default_speed;
        let interval_elapsed = self.direction_interval_elapsed(now);

        if sensors.distance_cm < self.config.obstacle_stop_cm {
            let turn = self.random_turn();
            return self.record_direction(turn, speed, now);
        }

        if sensors.distance_cm < self.config.obstacle_slow_cm {
            if interval_elapsed {
                let turn = self.random_turn();
                return self.record_direction(turn, speed, now);
            }
            return RoverCommand::forward(self.config.slow_speed());
        }

        if sensors.ir_left && !sensors.ir_right {
            return self.record_direction(Action::Right, speed, now);
        }
        if sensors.ir_right && !sensors.ir_left {
            return self.record_direction(Action::Left, speed, now);
        }

        if interval_elapsed {
            let direction = match self.rng.gen_range(0..3) {
                0 => Action::Forward,
                1 => Action::Left,
                _ => Action::Right,
            };
            return self.record_direction(direction, speed, now);
        }

        RoverCommand::forward(speed)
    }

    fn direction_interval_elapsed(&self, now: Instant) -> bool {
        let interval = Duration::from_millis(self.config.direction_change_ms);
        self.last_direction_change
            .is_none_or(|at| now.saturating_duration_since(at) >= interval)
    }

    fn random_turn(&mut self) -> Action {
        if self.rng.gen_bool(0.5) {
            Action::Left
        } else {
            Action::Right
        }
    }

    fn record_direction(&mut self, direction: Action, speed: i32, now: Instant) -> RoverCommand {
        self.explore_direction = direction;
        self.last_direction_change = Some(now);
        RoverCommand::new(direction, speed)
    }

    // ── Follow human ─────────────────────────────────────────────────────────

    fn follow_human(&self, sensors: &SensorSnapshot) -> RoverCommand {
        let target = self.config.follow_distance_cm;
        let near = target * (1.0 - self.config.follow_tolerance);
        let far = target * (1.0 + self.config.follow_tolerance);

        if sensors.distance_cm < near {
            RoverCommand::backward(self.config.slow_speed())
        } else if sensors.distance_cm > far {
            RoverCommand::forward(self.config.default_speed)
        } else {
            RoverCommand::stop()
        }
    }

    // ── Line follow ──────────────────────────────────────────────────────────

    fn line_follow(&self, sensors: &SensorSnapshot) -> RoverCommand {
        match (sensors.ir_left, sensors.ir_center, sensors.ir_right) {
            (_, true, _) => RoverCommand::forward(self.config.default_speed),
            (true, false, false) => RoverCommand::left(self.config.slow_speed()),
            (false, false, true) => RoverCommand::right(self.config.slow_speed()),
            _ => {
                debug!("line lost");
                RoverCommand::stop()
            }
        }
    }

    // ── Patrol ───────────────────────────────────────────────────────────────

    fn patrol(&mut self, sensors: &SensorSnapshot, now: Instant) -> RoverCommand {
        let Some(leg_started) = self.patrol_leg_started else {
            self.patrol_leg_started = Some(now);
            return RoverCommand::forward(self.config.default_speed);
        };

        let obstacle = sensors.distance_cm < self.config.obstacle_slow_cm;
        let leg_done = now.saturating_duration_since(leg_started)
            >= Duration::from_millis(self.config.patrol_leg_ms);

        if obstacle || leg_done {
            self.patrol_phase = (self.patrol_phase + 1) % PATROL_PHASES;
            self.patrol_leg_started = Some(now);
            debug!(phase = self.patrol_phase, obstacle, "patrol leg turn");
            return RoverCommand::right(self.config.default_speed);
        }

        RoverCommand::forward(self.config.default_speed)
    }
}

impl Default for GoalCommandGenerator {
    fn default() -> Self {
        Self::new(GoalConfig::default())
    }
}
