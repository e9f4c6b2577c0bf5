//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Telemetry`] | Sensor snapshots as they arrive |
//! | [`Topic::Commands`] | Commands handed to the actuator transport |
//! | [`Topic::Safety`] | Commands vetoed by the safety validator |
//! | [`Topic::Behavior`] | Behavior-tree transitions |
//! | [`Topic::Emotion`] | Accepted emotion transitions |

use rover_types::{Event, EventPayload};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Telemetry,
    Commands,
    Safety,
    Behavior,
    Emotion,
}

impl Topic {
    /// The lane an event payload belongs on.
    pub fn for_payload(payload: &EventPayload) -> Topic {
        match payload {
            EventPayload::Telemetry(_) => Topic::Telemetry,
            EventPayload::CommandIssued(_) => Topic::Commands,
            EventPayload::CommandRejected { .. } => Topic::Safety,
            EventPayload::BehaviorChanged { .. } => Topic::Behavior,
            EventPayload::EmotionChanged { .. } => Topic::Emotion,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    telemetry: broadcast::Sender<Event>,
    commands: broadcast::Sender<Event>,
    safety: broadcast::Sender<Event>,
    behavior: broadcast::Sender<Event>,
    emotion: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus; `capacity` applies to every topic independently.
    pub fn new(capacity: usize) -> Self {
        let (telemetry, _) = broadcast::channel(capacity);
        let (commands, _) = broadcast::channel(capacity);
        let (safety, _) = broadcast::channel(capacity);
        let (behavior, _) = broadcast::channel(capacity);
        let (emotion, _) = broadcast::channel(capacity);
        Self {
            telemetry,
            commands,
            safety,
            behavior,
            emotion,
        }
    }

    /// Publish `event` on the topic its payload maps to.
    ///
    /// Returns the number of receivers handed the event; `0` when nobody is
    /// listening, which is a normal condition.
    pub fn publish(&self, event: Event) -> usize {
        let topic = Topic::for_payload(&event.payload);
        self.topic_sender(topic).send(event).unwrap_or(0)
    }

    /// Subscribe to a single [`Topic`].
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Telemetry => &self.telemetry,
            Topic::Commands => &self.commands,
            Topic::Safety => &self.safety,
            Topic::Behavior => &self.behavior,
            Topic::Emotion => &self.emotion,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Lagged receivers skip the dropped events and keep going; `None` means
    /// the bus has shut down.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll; `None` when nothing is pending.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::{BehaviorState, RoverCommand};

    fn command_event() -> Event {
        Event::new(
            "rover-runtime::test",
            EventPayload::CommandIssued(RoverCommand::forward(180)),
        )
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(command_event()), 0);
    }

    #[tokio::test]
    async fn events_route_by_payload() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut commands = bus.subscribe_to(Topic::Commands);
        let mut behavior = bus.subscribe_to(Topic::Behavior);

        let event = command_event();
        assert_eq!(bus.publish(event.clone()), 1);

        let received = commands.recv().await.ok_or("no command event")?;
        assert_eq!(received.id, event.id);
        assert!(behavior.try_recv().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut a = bus.subscribe_to(Topic::Behavior);
        let mut b = bus.subscribe_to(Topic::Behavior);

        let event = Event::new(
            "rover-runtime::behavior_tree",
            EventPayload::BehaviorChanged {
                from: BehaviorState::Idle,
                to: BehaviorState::Explore,
            },
        );
        bus.publish(event.clone());

        assert_eq!(a.recv().await.ok_or("a missed event")?.id, event.id);
        assert_eq!(b.recv().await.ok_or("b missed event")?.id, event.id);
        Ok(())
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let bus = EventBus::new(4);
        let mut slow = bus.subscribe_to(Topic::Commands);
        for _ in 0..32 {
            bus.publish(command_event());
        }
        // Lag is swallowed; the receiver still yields the newest events.
        assert!(slow.recv().await.is_some());
    }

    #[test]
    fn rejected_commands_go_to_safety_topic() {
        let payload = EventPayload::CommandRejected {
            command: RoverCommand::forward(180),
            reason: "Obstacle too close".into(),
        };
        assert_eq!(Topic::for_payload(&payload), Topic::Safety);
    }
}
