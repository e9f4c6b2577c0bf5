//! [`LatestSlot`] – "latest value wins" mailbox for asynchronous producers.
//!
//! Inference workers (object detection, the reasoning model) run at their
//! own pace and [`publish`][LatestSlot::publish] into a slot.  The control
//! tick reads [`latest`][LatestSlot::latest] without ever waiting; an empty
//! slot simply means the tier has nothing to offer this tick.

use std::sync::Arc;

use tokio::sync::watch;

/// Single-value mailbox backed by a watch channel of `Option<T>`.
///
/// ```
/// use rover_middleware::LatestSlot;
///
/// let slot: LatestSlot<u32> = LatestSlot::new();
/// assert_eq!(slot.latest(), None);
/// slot.publish(1);
/// slot.publish(2);
/// assert_eq!(slot.latest(), Some(2));
/// ```
pub struct LatestSlot<T> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for LatestSlot<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Clone> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(None)),
        }
    }

    /// Replace whatever is in the slot.
    pub fn publish(&self, value: T) {
        self.tx.send_replace(Some(value));
    }

    /// Copy of the most recent value, if any.  Never blocks.
    pub fn latest(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Empty the slot, e.g. when its producer goes away.
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Receiver woken whenever a new value is published.
    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.tx.subscribe()
    }
}

impl<T: Clone> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::SuggestionOutput;

    #[test]
    fn empty_until_published() {
        let slot: LatestSlot<SuggestionOutput> = LatestSlot::new();
        assert!(slot.latest().is_none());
    }

    #[test]
    fn newer_value_replaces_older() {
        let slot = LatestSlot::new();
        slot.publish(SuggestionOutput::new("go forward", 0.8, "path clear"));
        slot.publish(SuggestionOutput::new("turn left", 0.6, "wall ahead"));
        assert_eq!(slot.latest().map(|s| s.suggestion), Some("turn left".to_string()));
    }

    #[test]
    fn clear_empties_every_clone() {
        let producer: LatestSlot<u8> = LatestSlot::new();
        let consumer = producer.clone();
        producer.publish(7);
        assert_eq!(consumer.latest(), Some(7));
        consumer.clear();
        assert!(producer.latest().is_none());
    }

    #[tokio::test]
    async fn producer_on_another_task_is_visible() -> Result<(), Box<dyn std::error::Error>> {
        let slot: LatestSlot<u32> = LatestSlot::new();
        let mut rx = slot.subscribe();
        let producer = slot.clone();

        tokio::spawn(async move {
            producer.publish(99);
        });

        rx.changed().await?;
        assert_eq!(slot.latest(), Some(99));
        Ok(())
    }
}
