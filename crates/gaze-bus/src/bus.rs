//! Publish/subscribe bus with one latest-value-wins mailbox per subscriber

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::Notify;
use tracing::{debug, info};

use crate::buffer::LatestRing;
use crate::{BusError, GazeEvent};

struct Mailbox {
    queue: Mutex<LatestRing<GazeEvent>>,
    notify: Notify,
    closed: AtomicBool,
}

impl Mailbox {
    fn queue(&self) -> MutexGuard<'_, LatestRing<GazeEvent>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

struct Registry {
    next_id: u64,
    subscribers: Vec<(u64, Arc<Mailbox>)>,
    closed: bool,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Publisher side of the gaze channel; clone freely
#[derive(Clone)]
pub struct GazeBus {
    registry: Arc<Mutex<Registry>>,
    capacity: usize,
}

impl GazeBus {
    /// Create a bus whose subscribers each buffer up to `capacity` events
    pub fn new(capacity: usize) -> Result<Self, BusError> {
        if capacity == 0 {
            return Err(BusError::ZeroCapacity);
        }
        Ok(Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                subscribers: Vec::new(),
                closed: false,
            })),
            capacity,
        })
    }

    /// Register a new consumer
    pub fn subscribe(&self) -> Result<Subscription, BusError> {
        let mailbox = Arc::new(Mailbox {
            queue: Mutex::new(LatestRing::new(self.capacity)?),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        });

        let mut registry = lock(&self.registry);
        if registry.closed {
            return Err(BusError::Closed);
        }
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.push((id, mailbox.clone()));
        debug!("Subscriber {} attached ({} total)", id, registry.subscribers.len());

        Ok(Subscription {
            id,
            mailbox,
            registry: Arc::downgrade(&self.registry),
        })
    }

    /// Fire-and-forget delivery to every current subscriber.
    ///
    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: GazeEvent) -> usize {
        let registry = lock(&self.registry);
        if registry.closed {
            return 0;
        }
        for (id, mailbox) in &registry.subscribers {
            if mailbox.queue().push(event).is_some() {
                debug!("Subscriber {} lagging, oldest event overwritten", id);
            }
            mailbox.notify.notify_one();
        }
        registry.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }

    /// Close the bus: pending events stay readable, then every subscriber sees end-of-stream
    pub fn close(&self) {
        let mut registry = lock(&self.registry);
        if registry.closed {
            return;
        }
        registry.closed = true;
        for (_, mailbox) in registry.subscribers.drain(..) {
            mailbox.close();
        }
        info!("Gaze bus closed");
    }
}

/// Consumer side of the gaze channel
pub struct Subscription {
    id: u64,
    mailbox: Arc<Mailbox>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event; `None` once the subscription or bus is closed
    pub async fn recv(&mut self) -> Option<GazeEvent> {
        loop {
            let notified = self.mailbox.notify.notified();
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.mailbox.closed.load(Ordering::SeqCst) {
                return None;
            }
            notified.await;
        }
    }

    /// Take the oldest buffered event without waiting
    pub fn try_recv(&self) -> Option<GazeEvent> {
        self.mailbox.queue().pop()
    }

    /// Events that were overwritten before this subscriber read them
    pub fn overwritten(&self) -> usize {
        self.mailbox.queue().overwritten()
    }

    /// Detach from the bus. Once this returns no further event is delivered
    /// and anything still buffered is discarded.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = lock(&registry);
            registry.subscribers.retain(|(id, _)| *id != self.id);
            debug!(
                "Subscriber {} detached, {} buffered events discarded",
                self.id,
                self.mailbox.queue().len()
            );
        }
        self.registry = Weak::new();
        self.mailbox.queue().clear();
        self.mailbox.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GazeSample, PresenceEvent};
    use std::time::Duration;

    fn sample(pupil: f32) -> GazeEvent {
        GazeEvent::Sample(GazeSample::measured(pupil, 100.0, 0))
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = GazeBus::new(4).unwrap();
        let mut a = bus.subscribe().unwrap();
        let mut b = bus.subscribe().unwrap();

        assert_eq!(bus.publish(sample(90.0)), 2);
        assert_eq!(a.recv().await, Some(sample(90.0)));
        assert_eq!(b.recv().await, Some(sample(90.0)));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = GazeBus::new(4).unwrap();
        assert_eq!(bus.publish(sample(1.0)), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_keeps_newest() {
        let bus = GazeBus::new(2).unwrap();
        let mut sub = bus.subscribe().unwrap();
        for pupil in [1.0, 2.0, 3.0] {
            bus.publish(sample(pupil));
        }

        assert_eq!(sub.overwritten(), 1);
        assert_eq!(sub.recv().await, Some(sample(2.0)));
        assert_eq!(sub.recv().await, Some(sample(3.0)));
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let bus = GazeBus::new(4).unwrap();
        let mut sub = bus.subscribe().unwrap();
        let publisher = bus.clone();

        let handle = tokio::spawn(async move { sub.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let presence = GazeEvent::Presence(PresenceEvent {
            detected: true,
            timestamp_ns: 5,
        });
        publisher.publish(presence);

        assert_eq!(handle.await.unwrap(), Some(presence));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_immediate() {
        let bus = GazeBus::new(4).unwrap();
        let sub = bus.subscribe().unwrap();
        bus.publish(sample(1.0));
        sub.unsubscribe();

        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(sample(2.0)), 0);
    }

    #[tokio::test]
    async fn test_drop_detaches() {
        let bus = GazeBus::new(4).unwrap();
        {
            let _sub = bus.subscribe().unwrap();
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let bus = GazeBus::new(4).unwrap();
        let mut sub = bus.subscribe().unwrap();
        bus.publish(sample(7.0));
        bus.close();

        assert_eq!(sub.recv().await, Some(sample(7.0)));
        assert_eq!(sub.recv().await, None);
        assert_eq!(bus.subscribe().err(), Some(BusError::Closed));
    }
}
