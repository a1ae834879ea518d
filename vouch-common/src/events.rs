//! Event bus shared by Vouch crates
//!
//! A thin wrapper over `tokio::sync::broadcast`. Emission is lossy: events
//! sent while nobody is subscribed are dropped, and slow subscribers observe
//! `RecvError::Lagged` instead of blocking the sender.

use tokio::sync::broadcast;

/// Broadcast channel for domain events of type `E`
#[derive(Debug)]
pub struct EventBus<E: Clone> {
    tx: broadcast::Sender<E>,
    capacity: usize,
}

impl<E: Clone> EventBus<E> {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use vouch_common::events::EventBus;
    ///
    /// let bus: EventBus<String> = EventBus::new(16);
    /// assert_eq!(bus.capacity(), 16);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    pub fn emit(&self, event: E) -> Result<usize, broadcast::error::SendError<E>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: E) {
        let _ = self.tx.send(event);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<E: Clone> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus: EventBus<u32> = EventBus::new(4);
        let mut rx = bus.subscribe();

        assert_eq!(bus.emit(7).unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), 7);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus: EventBus<u32> = EventBus::new(4);
        assert!(bus.emit(1).is_err());
        bus.emit_lossy(2);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
