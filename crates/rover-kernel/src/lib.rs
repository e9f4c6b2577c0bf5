//! `rover-kernel` – Safety gate
//!
//! The non-bypassable last step before any motor command reaches the
//! actuators.  It does not decide anything; it only says yes or no, and why.
//!
//! # Modules
//!
//! - [`rules`] – [`SafetyRule`][rules::SafetyRule] and the built-in cliff,
//!   edge, obstacle and speed-bound rules, plus the
//!   [`SafetyViolation`][rules::SafetyViolation] reasons they return.
//! - [`rate_limit`] – [`RateWindow`][rate_limit::RateWindow] (commands per
//!   window) and [`CommandCooldown`][rate_limit::CommandCooldown] (minimum
//!   gap between accepted commands).
//! - [`safety_validator`] – [`SafetyValidator`][safety_validator::SafetyValidator]:
//!   rate limit, STOP bypass, then the ordered rule set.

pub mod rate_limit;
pub mod rules;
pub mod safety_validator;

pub use rate_limit::{CommandCooldown, RateWindow};
pub use rules::{CliffRule, EdgeRule, ObstacleRule, SafetyRule, SafetyViolation, SpeedBoundsRule};
pub use safety_validator::{SafetyLimits, SafetyValidator};
