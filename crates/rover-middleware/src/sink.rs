//! The actuator transport seam.
//!
//! The decision core never talks to the motor controller directly.  It hands
//! each validated [`RoverCommand`] to a [`CommandSink`]; the sink owns the
//! wire.  [`ChannelSink`] serialises commands to the firmware's JSON text
//! frames (`{"cmd":"FORWARD","speed":180}`) and queues them on an mpsc
//! channel for whatever socket task drains it.

use async_trait::async_trait;
use rover_types::{RoverCommand, RoverError};
use tokio::sync::mpsc;
use tracing::trace;

/// Every actuator transport implements this trait.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Deliver one command to the actuators.
    async fn send(&self, command: RoverCommand) -> Result<(), RoverError>;
}

/// Queues wire frames on a bounded mpsc channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    /// Create a sink and the receiver the transport task drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CommandSink for ChannelSink {
    async fn send(&self, command: RoverCommand) -> Result<(), RoverError> {
        let frame = command.to_wire()?;
        trace!(frame = %frame, "queueing command frame");
        self.tx
            .send(frame)
            .await
            .map_err(|e| RoverError::Transport {
                component: "channel_sink".to_string(),
                details: e.to_string(),
            })
    }
}
