//! Per-environment fan-out of store mutations to attached downstream SSE
//! subscribers.
//!
//! The broadcaster never blocks a publisher on a slow consumer: a full
//! subscriber channel is dropped-newest and the subscriber is marked
//! degraded so the `DownstreamStreamHandler` disconnects it at the next
//! opportunity, forcing the SDK to reconnect and receive a fresh `put`.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

const DEFAULT_SUBSCRIBER_CAPACITY: usize = 100;

/// Handle returned by [`Broadcaster::attach`]. Holds the receiving end of
/// this subscriber's outbound queue and the shared degraded flag the
/// broadcaster flips on overflow.
pub struct Subscription {
    pub id: u64,
    receiver: mpsc::Receiver<Bytes>,
    degraded: Arc<AtomicBool>,
    broadcaster: Broadcaster,
}

impl Subscription {
    /// Receive the next outbound frame, or `None` once detached.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }

    /// Whether the broadcaster has marked this subscriber degraded. The
    /// `DownstreamStreamHandler` checks this after every forwarded frame and
    /// closes the connection as soon as it flips.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let broadcaster = self.broadcaster.clone();
        let id = self.id;
        tokio::spawn(async move { broadcaster.detach(id).await });
    }
}

struct Subscriber {
    sender: mpsc::Sender<Bytes>,
    degraded: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct Broadcaster {
    subscribers: Arc<RwLock<HashMap<u64, Subscriber>>>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
    environment: Arc<str>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::for_environment("unknown", capacity)
    }

    /// Build a broadcaster labeled with its owning environment's name, so
    /// the `downstream_subscriber_count` gauge can be broken down per
    /// environment the way `/status` already is.
    pub fn for_environment(environment: impl Into<String>, capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity,
            environment: environment.into().into(),
        }
    }

    /// Attach a new subscriber with a fresh bounded channel. The returned
    /// [`Subscription`] detaches itself automatically when dropped.
    pub async fn attach(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.capacity);
        let degraded = Arc::new(AtomicBool::new(false));
        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(id, Subscriber { sender, degraded: degraded.clone() });
        self.record_subscriber_count(subscribers.len());
        drop(subscribers);
        Subscription { id, receiver, degraded, broadcaster: self.clone() }
    }

    /// Idempotent close; safe to call even if the subscriber already
    /// detached or was never attached.
    pub async fn detach(&self, id: u64) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.remove(&id);
        self.record_subscriber_count(subscribers.len());
    }

    #[cfg(feature = "monitoring")]
    fn record_subscriber_count(&self, count: usize) {
        crate::metrics::DOWNSTREAM_SUBSCRIBER_COUNT
            .with_label_values(&[&self.environment])
            .set(count as i64);
    }

    #[cfg(not(feature = "monitoring"))]
    fn record_subscriber_count(&self, _count: usize) {}

    /// Fan a frame out to every attached subscriber. Never awaits a slow
    /// consumer: `try_send` either succeeds or the subscriber is marked
    /// degraded and the frame is dropped for it.
    pub async fn publish(&self, frame: Bytes) {
        let subscribers = self.subscribers.read().await;
        for subscriber in subscribers.values() {
            if let Err(mpsc::error::TrySendError::Full(_)) = subscriber.sender.try_send(frame.clone()) {
                subscriber.degraded.store(true, Ordering::Relaxed);
            }
        }
    }

    /// Number of currently attached subscribers, used by the `/status`
    /// endpoint.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attached_subscriber_receives_published_frame() {
        let broadcaster = Broadcaster::new();
        let mut sub = broadcaster.attach().await;
        broadcaster.publish(Bytes::from_static(b"frame")).await;
        assert_eq!(sub.recv().await, Some(Bytes::from_static(b"frame")));
    }

    #[tokio::test]
    async fn overflow_marks_subscriber_degraded_without_blocking_publish() {
        let broadcaster = Broadcaster::with_capacity(2);
        let sub = broadcaster.attach().await;
        for _ in 0..5 {
            broadcaster.publish(Bytes::from_static(b"x")).await;
        }
        assert!(sub.is_degraded());
    }

    #[tokio::test]
    async fn detach_is_idempotent() {
        let broadcaster = Broadcaster::new();
        let sub = broadcaster.attach().await;
        let id = sub.id;
        broadcaster.detach(id).await;
        broadcaster.detach(id).await;
        assert_eq!(broadcaster.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn drop_detaches_subscriber() {
        let broadcaster = Broadcaster::new();
        let sub = broadcaster.attach().await;
        assert_eq!(broadcaster.subscriber_count().await, 1);
        drop(sub);
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(broadcaster.subscriber_count().await, 0);
    }
}
