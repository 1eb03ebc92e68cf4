use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};

use super::ImageRecord;

#[derive(Debug, Default)]
struct HubInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, Sender<ImageRecord>)>>,
}

/// Fans pushed image updates out to every live subscription.
#[derive(Debug, Clone, Default)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel();
        self.lock_subscribers().push((id, sender));
        Subscription {
            id,
            receiver,
            hub: Arc::clone(&self.inner),
        }
    }

    pub fn publish(&self, update: ImageRecord) {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|(_, sender)| sender.send(update.clone()).is_ok());
        tracing::trace!(id = %update.id, subscribers = subscribers.len(), "published image update");
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Sender<ImageRecord>)>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receives updates until dropped; dropping unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: Receiver<ImageRecord>,
    hub: Arc<HubInner>,
}

impl Subscription {
    /// Everything published since the last drain.
    pub fn drain(&self) -> Vec<ImageRecord> {
        let mut updates = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(update) => updates.push(update),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        updates
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut subscribers = self
            .hub
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{ImageId, ImageStatus};

    fn update(id: &str) -> ImageRecord {
        ImageRecord::new(ImageId::new(id), ImageStatus::Completed)
    }

    #[test]
    fn every_subscription_sees_published_updates() {
        let hub = NotificationHub::new();
        let first = hub.subscribe();
        let second = hub.subscribe();

        hub.publish(update("a"));
        hub.publish(update("b"));

        assert_eq!(first.drain().len(), 2);
        assert_eq!(second.drain().len(), 2);
        assert!(first.drain().is_empty());
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let hub = NotificationHub::new();
        let subscription = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        drop(subscription);

        assert_eq!(hub.subscriber_count(), 0);
        hub.publish(update("late"));
    }
}
