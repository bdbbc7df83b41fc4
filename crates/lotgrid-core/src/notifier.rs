//! Change notification channel.
//!
//! A notification says only "something in the store changed". It carries no
//! payload, may be duplicated or reordered, and may echo the subscriber's
//! own writes. The only correct reaction is a full re-read.

use tokio::sync::broadcast;

/// Buffered events per subscriber before it is reported as lagged.
const CHANNEL_CAPACITY: usize = 64;

/// Payload-free change signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent;

/// Source of change signals.
pub trait ChangeNotifier: Send + Sync {
    /// Start receiving change signals.
    fn subscribe(&self) -> Subscription;

    /// Stop receiving change signals.
    fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Signal every current subscriber.
    fn publish(&self);
}

/// Handle returned by `subscribe`. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// Wait for the next change.
    ///
    /// Returns `false` once the notifier is gone. A lagged receiver counts as
    /// a change: the missed events all mean the same thing.
    pub async fn changed(&mut self) -> bool {
        match self.rx.recv().await {
            Ok(ChangeEvent) | Err(broadcast::error::RecvError::Lagged(_)) => true,
            Err(broadcast::error::RecvError::Closed) => false,
        }
    }

    /// Discard queued signals without waiting. Returns how many were queued.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        loop {
            match self.rx.try_recv() {
                Ok(ChangeEvent) => drained += 1,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    drained += usize::try_from(missed).unwrap_or(usize::MAX);
                }
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => break,
            }
        }
        drained
    }
}

/// In-process fan-out notifier.
#[derive(Debug, Clone)]
pub struct LocalNotifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl LocalNotifier {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LocalNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier for LocalNotifier {
    fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    fn publish(&self) {
        // No subscribers is not an error.
        let _ = self.tx.send(ChangeEvent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let notifier = LocalNotifier::new();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();
        notifier.publish();
        assert!(a.changed().await);
        assert!(b.changed().await);
    }

    #[tokio::test]
    async fn test_unsubscribe_drops_receiver() {
        let notifier = LocalNotifier::new();
        let sub = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 1);
        notifier.unsubscribe(sub);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lag_still_reports_change() {
        let notifier = LocalNotifier::new();
        let mut sub = notifier.subscribe();
        for _ in 0..(CHANNEL_CAPACITY * 2) {
            notifier.publish();
        }
        assert!(sub.changed().await);
        assert!(sub.drain() > 0);
    }

    #[tokio::test]
    async fn test_closed_notifier_ends_subscription() {
        let notifier = LocalNotifier::new();
        let mut sub = notifier.subscribe();
        drop(notifier);
        assert!(!sub.changed().await);
    }

    #[test]
    fn test_drain_empty() {
        let notifier = LocalNotifier::new();
        let mut sub = notifier.subscribe();
        assert_eq!(sub.drain(), 0);
    }
}
