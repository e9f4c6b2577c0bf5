//! `rover-middleware` – The Nervous System
//!
//! Moves data between the decision core and its collaborators without caring
//! what the data means.
//!
//! # Modules
//!
//! - [`state`] – [`RoverState`]: rover-wide store (sensors, battery, behavior,
//!   emotion, modes) with change notification.
//! - [`latest`] – [`LatestSlot`]: non-blocking "latest value wins" mailbox
//!   for detection and suggestion snapshots.
//! - [`bus`] – topic-based publish/subscribe [`EventBus`] on Tokio broadcast
//!   channels.
//! - [`sink`] – [`CommandSink`] actuator seam and the wire-framing
//!   [`ChannelSink`].

pub mod bus;
pub mod latest;
pub mod sink;
pub mod state;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use latest::LatestSlot;
pub use sink::{ChannelSink, CommandSink};
pub use state::{ConnectionState, ModeFlags, RoverState};
