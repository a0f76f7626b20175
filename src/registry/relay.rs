//! Bridge from a hub subscription to a push transport
//!
//! A transport implements [`FeedSink`]. [`relay`] pumps one subscription into
//! it and unsubscribes as soon as the sink reports the transport closed.

use crate::error::{RegistryError, Result};
use crate::registry::hub::Subscription;
use crate::types::{ChangeEvent, FeedEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info};

/// Transport-ready rendering of a feed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedFrame {
    /// Transport event name (`add-lobby`, `ping-respond`, ...)
    pub event: String,
    pub data: serde_json::Value,
}

impl FeedFrame {
    pub fn from_event(event: &FeedEvent) -> Result<Self> {
        let data = match event {
            FeedEvent::Open { epoch_stamp } => json!({ "epochStamp": epoch_stamp }),
            FeedEvent::Change(ChangeEvent::Added { lobby })
            | FeedEvent::Change(ChangeEvent::Updated { lobby }) => serde_json::to_value(lobby)
                .map_err(|e| RegistryError::InternalError {
                    message: format!("Failed to serialize lobby: {}", e),
                })?,
            FeedEvent::Change(ChangeEvent::Removed { id }) => json!({ "id": id }),
        };

        Ok(Self {
            event: event.event_name().to_string(),
            data,
        })
    }

    /// Serialize the frame to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            RegistryError::InternalError {
                message: format!("Failed to serialize frame: {}", e),
            }
            .into()
        })
    }
}

/// Outbound side of one push connection
#[async_trait]
pub trait FeedSink: Send + Sync {
    /// Deliver one frame. An error means the transport is gone.
    async fn deliver(&self, frame: FeedFrame) -> Result<()>;

    /// Completes once the transport has closed. Sinks that cannot observe
    /// closure between frames never complete it.
    async fn closed(&self) {
        std::future::pending::<()>().await
    }
}

/// Why a relay stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The transport closed or rejected a frame
    SinkClosed,
    /// The hub detached the subscription and its queue drained
    FeedEnded,
}

/// Pump `subscription` into `sink` until one side closes.
/// Returns the number of frames delivered.
///
/// A transport closing while the feed is idle ends the relay right away,
/// without waiting for the next event.
pub async fn relay(mut subscription: Subscription, sink: &dyn FeedSink) -> (usize, RelayEnd) {
    let subscription_id = subscription.id();
    let mut delivered = 0;

    loop {
        let event = tokio::select! {
            biased;
            _ = sink.closed() => {
                info!(
                    "Transport for subscriber {} closed after {} frames",
                    subscription_id, delivered
                );
                // Dropping the subscription detaches it from the hub
                return (delivered, RelayEnd::SinkClosed);
            }
            event = subscription.recv() => event,
        };
        let Some(event) = event else { break };

        let frame = match FeedFrame::from_event(&event) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Skipping unencodable event for {}: {}", subscription_id, e);
                continue;
            }
        };

        if let Err(e) = sink.deliver(frame).await {
            info!(
                "Transport for subscriber {} closed after {} frames: {}",
                subscription_id, delivered, e
            );
            return (delivered, RelayEnd::SinkClosed);
        }
        delivered += 1;
    }

    debug!("Feed for subscriber {} ended", subscription_id);
    (delivered, RelayEnd::FeedEnded)
}

/// Mock sink for testing
#[derive(Debug)]
pub struct MockFeedSink {
    frames: std::sync::Mutex<Vec<FeedFrame>>,
    close_after: Option<usize>,
    closed: watch::Sender<bool>,
}

impl MockFeedSink {
    pub fn new() -> Self {
        Self {
            frames: std::sync::Mutex::new(Vec::new()),
            close_after: None,
            closed: watch::Sender::new(false),
        }
    }

    /// A sink whose transport rejects frames once `limit` were accepted
    pub fn closing_after(limit: usize) -> Self {
        Self {
            close_after: Some(limit),
            ..Self::new()
        }
    }

    /// Close the transport now
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Get all delivered frames (for testing)
    pub fn frames(&self) -> Vec<FeedFrame> {
        self.frames
            .lock()
            .map(|frames| frames.clone())
            .unwrap_or_default()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.frames().into_iter().map(|frame| frame.event).collect()
    }
}

impl Default for MockFeedSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedSink for MockFeedSink {
    async fn deliver(&self, frame: FeedFrame) -> Result<()> {
        if self.is_closed() {
            anyhow::bail!("transport closed");
        }

        let mut frames = self
            .frames
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire frames lock"))?;

        if self.close_after.is_some_and(|limit| frames.len() >= limit) {
            anyhow::bail!("transport closed");
        }
        frames.push(frame);
        Ok(())
    }

    async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        // The sender lives as long as the sink, so this only returns once closed
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::hub::EventHub;
    use crate::types::LobbyRecord;
    use chrono::Utc;
    use std::sync::Arc;

    fn sample_record() -> LobbyRecord {
        let now = Utc::now();
        LobbyRecord {
            id: "abc".to_string(),
            title: "X".to_string(),
            host: "1.2.3.4".to_string(),
            port: 7000,
            player_count: 1,
            max_player_count: 4,
            created_at: now,
            last_seen_at: now,
        }
    }

    #[test]
    fn test_frame_shapes() {
        let epoch = Utc::now();
        let open = FeedFrame::from_event(&FeedEvent::Open { epoch_stamp: epoch }).unwrap();
        assert_eq!(open.event, "ping-respond");
        assert_eq!(open.data, json!({ "epochStamp": epoch }));

        let added = FeedFrame::from_event(&FeedEvent::Change(ChangeEvent::Added {
            lobby: sample_record(),
        }))
        .unwrap();
        assert_eq!(added.event, "add-lobby");
        assert_eq!(added.data["maxPlayerCount"], 4);
        assert!(added.data.get("secret").is_none());

        let removed = FeedFrame::from_event(&FeedEvent::from(ChangeEvent::Removed {
            id: "abc".to_string(),
        }))
        .unwrap();
        assert_eq!(removed.event, "remove-lobby");
        assert_eq!(removed.data, json!({ "id": "abc" }));

        let bytes = removed.to_bytes().unwrap();
        let parsed: FeedFrame = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, removed);
    }

    #[tokio::test]
    async fn test_relay_unsubscribes_on_transport_close() {
        let hub = Arc::new(EventHub::new(Utc::now(), 16));
        let subscription = hub.subscribe().unwrap();
        let subscription_id = subscription.id();

        hub.publish(ChangeEvent::Added {
            lobby: sample_record(),
        });
        hub.publish(ChangeEvent::Removed {
            id: "abc".to_string(),
        });

        let sink = MockFeedSink::closing_after(2);
        let (delivered, end) = relay(subscription, &sink).await;

        assert_eq!(delivered, 2);
        assert_eq!(end, RelayEnd::SinkClosed);
        assert_eq!(sink.event_names(), vec!["ping-respond", "add-lobby"]);
        assert!(!hub.is_subscribed(&subscription_id));
    }

    #[tokio::test]
    async fn test_relay_ends_with_feed() {
        let hub = Arc::new(EventHub::new(Utc::now(), 16));
        let subscription = hub.subscribe().unwrap();
        let subscription_id = subscription.id();
        hub.publish(ChangeEvent::Removed {
            id: "abc".to_string(),
        });
        hub.unsubscribe(&subscription_id);

        let sink = MockFeedSink::new();
        let (delivered, end) = relay(subscription, &sink).await;

        assert_eq!(delivered, 2);
        assert_eq!(end, RelayEnd::FeedEnded);
    }

    #[tokio::test]
    async fn test_idle_transport_close_detaches_subscriber() {
        let hub = Arc::new(EventHub::new(Utc::now(), 16));
        let subscription = hub.subscribe().unwrap();
        let subscription_id = subscription.id();
        let sink = Arc::new(MockFeedSink::new());

        let handle = {
            let sink = sink.clone();
            tokio::spawn(async move { relay(subscription, sink.as_ref()).await })
        };

        // Wait for the open notice to go out, then go idle
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while sink.frames().is_empty() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("open notice was not delivered");

        sink.close();
        let (delivered, end) = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("relay did not notice the closed transport")
            .unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(end, RelayEnd::SinkClosed);
        assert!(!hub.is_subscribed(&subscription_id));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_sink_rejects_frames() {
        let sink = MockFeedSink::new();
        sink.close();

        let frame = FeedFrame::from_event(&FeedEvent::from(ChangeEvent::Removed {
            id: "abc".to_string(),
        }))
        .unwrap();
        assert!(sink.deliver(frame).await.is_err());
        // Already closed, so this returns immediately
        sink.closed().await;
    }
}
