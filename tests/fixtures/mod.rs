//! Test fixtures shared by the integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use lobby_registry::metrics::MetricsCollector;
use lobby_registry::registry::{
    EventHub, IdGenerator, LivenessSweeper, LobbyStore, RegistryFacade, Subscription,
};
use lobby_registry::types::{CreatedLobby, FeedEvent, LobbyFields};
use lobby_registry::utils::{Clock, MockClock};
use std::sync::Arc;
use std::time::Duration;

/// Liveness interval used by the test registry
pub const LIVENESS_INTERVAL: Duration = Duration::from_secs(120);

/// A complete registry on a manually advanced clock
pub struct TestRegistry {
    pub facade: RegistryFacade,
    pub store: Arc<LobbyStore>,
    pub hub: Arc<EventHub>,
    pub clock: Arc<MockClock>,
    pub metrics: Arc<MetricsCollector>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::with_buffer(64)
    }

    pub fn with_buffer(subscriber_buffer: usize) -> Self {
        let clock = Arc::new(MockClock::default());
        let metrics = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        let hub = Arc::new(EventHub::with_metrics(
            clock.now(),
            subscriber_buffer,
            metrics.clone(),
        ));
        let store = Arc::new(LobbyStore::with_clock(
            IdGenerator::default(),
            hub.clone(),
            clock.clone(),
            metrics.clone(),
        ));

        Self {
            facade: RegistryFacade::new(store.clone()),
            store,
            hub,
            clock,
            metrics,
        }
    }

    pub fn sweeper(&self) -> LivenessSweeper {
        LivenessSweeper::new(self.store.clone(), LIVENESS_INTERVAL)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance_secs(&self, seconds: i64) {
        self.clock.advance(ChronoDuration::seconds(seconds));
    }

    /// Create a lobby through the facade, panicking on anything but success
    pub fn create(&self, fields: LobbyFields) -> CreatedLobby {
        self.facade
            .create_lobby(fields)
            .expect("create failed fatally")
            .ok()
            .expect("create was rejected")
    }
}

pub fn sample_fields() -> LobbyFields {
    LobbyFields::new("X", "1.2.3.4", 7000, 1, 4)
}

pub fn numbered_fields(n: u32) -> LobbyFields {
    LobbyFields::new(format!("Lobby {}", n), "10.0.0.1", 7000 + n as u16, 0, 4)
}

/// Every event already queued on `subscription`
pub fn drain(subscription: &mut Subscription) -> Vec<FeedEvent> {
    std::iter::from_fn(|| subscription.try_recv()).collect()
}

/// Transport event names of every queued event
pub fn drain_names(subscription: &mut Subscription) -> Vec<&'static str> {
    drain(subscription)
        .iter()
        .map(|event| event.event_name())
        .collect()
}
