//! Event fanout hub
//!
//! Every subscriber owns a bounded queue. Publishing never waits: a
//! subscriber whose transport has closed, or whose queue is full because it
//! stopped draining, is detached on the spot and its stream ends after the
//! events already queued. It can resubscribe and compare epoch stamps to
//! decide whether to refetch the snapshot.

use crate::error::{RegistryError, RegistryResult};
use crate::metrics::MetricsCollector;
use crate::types::{ChangeEvent, FeedEvent};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::Stream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque handle identifying one attached subscriber
pub type SubscriptionId = Uuid;

/// Publish/subscribe broker between the store and push transports
pub struct EventHub {
    epoch_stamp: DateTime<Utc>,
    buffer: usize,
    subscribers: Mutex<HashMap<SubscriptionId, mpsc::Sender<FeedEvent>>>,
    metrics_collector: Arc<MetricsCollector>,
}

impl EventHub {
    /// Create a hub for a registry instance born at `epoch_stamp`
    pub fn new(epoch_stamp: DateTime<Utc>, buffer: usize) -> Self {
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        Self::with_metrics(epoch_stamp, buffer, metrics_collector)
    }

    pub fn with_metrics(
        epoch_stamp: DateTime<Utc>,
        buffer: usize,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            epoch_stamp,
            buffer: buffer.max(1),
            subscribers: Mutex::new(HashMap::new()),
            metrics_collector,
        }
    }

    pub fn epoch_stamp(&self) -> DateTime<Utc> {
        self.epoch_stamp
    }

    fn open_notice(&self) -> FeedEvent {
        FeedEvent::Open {
            epoch_stamp: self.epoch_stamp,
        }
    }

    // Critical sections below never panic, so a poisoned map is still consistent.
    fn lock_subscribers(&self) -> MutexGuard<'_, HashMap<SubscriptionId, mpsc::Sender<FeedEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach a new subscriber. Its first event is always the open notice.
    pub fn subscribe(self: &Arc<Self>) -> RegistryResult<Subscription> {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.buffer);

        {
            let mut subscribers = self.lock_subscribers();
            sender
                .try_send(self.open_notice())
                .map_err(|_| RegistryError::InternalError {
                    message: "Failed to queue open notice".to_string(),
                })?;
            subscribers.insert(id, sender);

            info!(
                "Subscriber {} attached - active subscribers: {}",
                id,
                subscribers.len()
            );
        }

        self.metrics_collector.record_subscriber_attached();

        Ok(Subscription {
            id,
            receiver,
            hub: Arc::downgrade(self),
        })
    }

    /// Deliver `event` to every subscriber attached right now.
    ///
    /// Returns how many subscribers accepted it. Never blocks and never fails.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let kind = event.kind();
        let lobby_id = event.lobby_id().to_string();
        let feed_event = FeedEvent::Change(event);

        let mut delivered = 0;
        let mut dropped: Vec<(SubscriptionId, &'static str)> = Vec::new();

        {
            let mut subscribers = self.lock_subscribers();
            subscribers.retain(|id, sender| match sender.try_send(feed_event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    dropped.push((*id, "lagged"));
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    dropped.push((*id, "closed"));
                    false
                }
            });
        }

        for (id, reason) in &dropped {
            warn!("Detached subscriber {} ({})", id, reason);
            self.metrics_collector.record_subscriber_detached(reason);
        }
        self.metrics_collector.record_event_published(kind);

        debug!(
            "Published {} event for lobby {} to {} subscribers",
            kind, lobby_id, delivered
        );
        delivered
    }

    /// Resend the open notice to one subscriber only.
    ///
    /// Returns `false` when the subscription is no longer attached.
    pub fn ping(&self, id: &SubscriptionId) -> bool {
        let outcome = {
            let mut subscribers = self.lock_subscribers();
            let outcome = match subscribers.get(id) {
                None => return false,
                Some(sender) => sender.try_send(self.open_notice()),
            };
            if outcome.is_err() {
                subscribers.remove(id);
            }
            outcome
        };

        match outcome {
            Ok(()) => {
                debug!("Re-announced epoch to subscriber {}", id);
                true
            }
            Err(e) => {
                let reason = match e {
                    TrySendError::Full(_) => "lagged",
                    TrySendError::Closed(_) => "closed",
                };
                warn!("Detached subscriber {} ({})", id, reason);
                self.metrics_collector.record_subscriber_detached(reason);
                false
            }
        }
    }

    /// Detach a subscriber. Safe to call repeatedly; returns whether it was attached.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let removed = self.lock_subscribers().remove(id).is_some();
        if removed {
            info!("Subscriber {} detached", id);
            self.metrics_collector
                .record_subscriber_detached("unsubscribed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    pub fn is_subscribed(&self, id: &SubscriptionId) -> bool {
        self.lock_subscribers().contains_key(id)
    }
}

/// One attached listener.
///
/// Dropping it (the transport-close path) detaches it from the hub.
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::Receiver<FeedEvent>,
    hub: Weak<EventHub>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event, or `None` once the hub has detached this subscriber and
    /// its queue is drained
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<FeedEvent> {
        self.receiver.try_recv().ok()
    }

    /// Ask the hub to resend the open notice to this subscriber
    pub fn ping(&self) -> bool {
        self.hub.upgrade().is_some_and(|hub| hub.ping(&self.id))
    }

    /// Detach explicitly; equivalent to dropping the subscription
    pub fn unsubscribe(self) {}
}

impl Stream for Subscription {
    type Item = FeedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<FeedEvent>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LobbyRecord;
    use tokio_stream::StreamExt;

    fn create_test_hub(buffer: usize) -> Arc<EventHub> {
        Arc::new(EventHub::new(Utc::now(), buffer))
    }

    fn removed(id: &str) -> ChangeEvent {
        ChangeEvent::Removed { id: id.to_string() }
    }

    fn added(id: &str) -> ChangeEvent {
        let now = Utc::now();
        ChangeEvent::Added {
            lobby: LobbyRecord {
                id: id.to_string(),
                title: "X".to_string(),
                host: "1.2.3.4".to_string(),
                port: 7000,
                player_count: 1,
                max_player_count: 4,
                created_at: now,
                last_seen_at: now,
            },
        }
    }

    #[tokio::test]
    async fn test_open_notice_comes_first() {
        let hub = create_test_hub(8);
        let mut subscription = hub.subscribe().unwrap();
        hub.publish(added("a"));

        assert_eq!(
            subscription.recv().await,
            Some(FeedEvent::Open {
                epoch_stamp: hub.epoch_stamp()
            })
        );
        assert_eq!(subscription.recv().await, Some(FeedEvent::Change(added("a"))));
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_in_order() {
        let hub = create_test_hub(8);
        let mut first = hub.subscribe().unwrap();
        let mut second = hub.subscribe().unwrap();

        assert_eq!(hub.publish(added("a")), 2);
        assert_eq!(hub.publish(removed("a")), 2);

        for subscription in [&mut first, &mut second] {
            assert!(matches!(subscription.recv().await, Some(FeedEvent::Open { .. })));
            assert_eq!(subscription.recv().await, Some(FeedEvent::Change(added("a"))));
            assert_eq!(subscription.recv().await, Some(FeedEvent::Change(removed("a"))));
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let hub = create_test_hub(8);
        hub.publish(added("a"));

        let mut subscription = hub.subscribe().unwrap();
        assert!(matches!(subscription.try_recv(), Some(FeedEvent::Open { .. })));
        assert_eq!(subscription.try_recv(), None);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let hub = create_test_hub(8);
        let subscription = hub.subscribe().unwrap();
        let id = subscription.id();
        assert!(hub.is_subscribed(&id));

        drop(subscription);
        assert!(!hub.is_subscribed(&id));
        assert_eq!(hub.publish(added("a")), 0);

        // Idempotent
        assert!(!hub.unsubscribe(&id));
    }

    #[tokio::test]
    async fn test_unsubscribe_isolated_from_others() {
        let hub = create_test_hub(8);
        let leaving = hub.subscribe().unwrap();
        let mut staying = hub.subscribe().unwrap();

        leaving.unsubscribe();
        assert_eq!(hub.publish(added("a")), 1);

        assert!(matches!(staying.recv().await, Some(FeedEvent::Open { .. })));
        assert_eq!(staying.recv().await, Some(FeedEvent::Change(added("a"))));
    }

    #[tokio::test]
    async fn test_stalled_subscriber_is_cut_off_without_blocking_others() {
        let hub = create_test_hub(2);
        let mut stalled = hub.subscribe().unwrap();
        let mut healthy = hub.subscribe().unwrap();

        // Open notice plus one event fills a buffer of two
        hub.publish(added("a"));
        // Drain the healthy subscriber so it keeps up
        assert!(matches!(healthy.recv().await, Some(FeedEvent::Open { .. })));
        assert!(healthy.recv().await.is_some());

        assert_eq!(hub.publish(added("b")), 1);
        assert!(!hub.is_subscribed(&stalled.id()));
        assert_eq!(healthy.recv().await, Some(FeedEvent::Change(added("b"))));

        // Stalled subscriber still gets what was queued, then the stream ends
        assert!(matches!(stalled.recv().await, Some(FeedEvent::Open { .. })));
        assert_eq!(stalled.recv().await, Some(FeedEvent::Change(added("a"))));
        assert_eq!(stalled.recv().await, None);
    }

    #[tokio::test]
    async fn test_ping_reannounces_only_to_requester() {
        let hub = create_test_hub(8);
        let mut pinger = hub.subscribe().unwrap();
        let mut other = hub.subscribe().unwrap();

        assert!(pinger.ping());
        assert!(matches!(pinger.try_recv(), Some(FeedEvent::Open { .. })));
        assert!(matches!(pinger.try_recv(), Some(FeedEvent::Open { .. })));
        assert!(matches!(other.try_recv(), Some(FeedEvent::Open { .. })));
        assert_eq!(other.try_recv(), None);

        assert!(!hub.ping(&Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_subscription_as_stream() {
        let hub = create_test_hub(8);
        let subscription = hub.subscribe().unwrap();
        hub.publish(added("a"));
        hub.publish(removed("a"));

        let names: Vec<&'static str> = subscription
            .take(3)
            .map(|event| event.event_name())
            .collect()
            .await;
        assert_eq!(names, vec!["ping-respond", "add-lobby", "remove-lobby"]);
    }
}
