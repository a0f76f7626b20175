//! Liveness sweeper
//!
//! Periodically evicts lobbies that have gone a full liveness interval
//! without a create, touch or update.

use crate::error::RegistryResult;
use crate::registry::store::LobbyStore;
use crate::utils::to_chrono_duration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Background evictor of silent lobbies
pub struct LivenessSweeper {
    store: Arc<LobbyStore>,
    interval: Duration,
}

impl LivenessSweeper {
    /// `interval` is both the sweep period and the staleness threshold
    pub fn new(store: Arc<LobbyStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep and return how many lobbies were evicted.
    ///
    /// `now` is read once at sweep start. Each candidate is re-checked
    /// against it under the store's write lock, so a lobby touched after
    /// the scan survives.
    pub fn sweep_once(&self) -> RegistryResult<usize> {
        let now = self.store.now();
        let threshold = to_chrono_duration(self.interval);

        let mut evicted = 0;
        for lobby_id in self.store.stale_lobby_ids(now, threshold)? {
            if self.store.evict_if_stale(&lobby_id, now, threshold)? {
                evicted += 1;
            } else {
                debug!("Lobby {} refreshed before eviction, keeping it", lobby_id);
            }
        }

        Ok(evicted)
    }

    /// Sweep every interval until `shutdown` fires or its sender goes away
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately; nothing can be stale yet
        ticker.tick().await;
        info!(
            "Liveness sweeper started ({}s interval)",
            self.interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once() {
                        Ok(0) => debug!("Liveness sweep completed - no stale lobbies found"),
                        Ok(evicted) => info!("Evicted {} stale lobbies", evicted),
                        Err(e) => warn!("Liveness sweep failed: {}", e),
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        info!("Liveness sweeper stopped");
    }

    /// Spawn [`run`](Self::run) onto the current runtime
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCollector;
    use crate::registry::hub::EventHub;
    use crate::registry::ids::IdGenerator;
    use crate::types::{ChangeEvent, FeedEvent, LobbyFields};
    use crate::utils::{Clock, MockClock};
    use chrono::Duration as ChronoDuration;

    const INTERVAL: Duration = Duration::from_secs(120);

    fn create_test_sweeper() -> (LivenessSweeper, Arc<LobbyStore>, Arc<MockClock>) {
        let clock = Arc::new(MockClock::default());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let hub = Arc::new(EventHub::with_metrics(clock.now(), 64, metrics.clone()));
        let store = Arc::new(LobbyStore::with_clock(
            IdGenerator::default(),
            hub,
            clock.clone(),
            metrics,
        ));
        (LivenessSweeper::new(store.clone(), INTERVAL), store, clock)
    }

    fn fields() -> LobbyFields {
        LobbyFields::new("X", "1.2.3.4", 7000, 1, 4)
    }

    #[test]
    fn test_fresh_lobbies_survive() {
        let (sweeper, store, clock) = create_test_sweeper();
        store.create(fields()).unwrap();

        clock.advance(ChronoDuration::seconds(119));
        assert_eq!(sweeper.sweep_once().unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_silent_lobby_is_evicted_with_one_event() {
        let (sweeper, store, clock) = create_test_sweeper();
        let created = store.create(fields()).unwrap();
        let mut subscription = store.hub().subscribe().unwrap();
        let _ = subscription.try_recv(); // open

        clock.advance(ChronoDuration::seconds(121));
        assert_eq!(sweeper.sweep_once().unwrap(), 1);
        assert!(store.get(&created.id).is_err());
        assert_eq!(
            subscription.try_recv(),
            Some(FeedEvent::Change(ChangeEvent::Removed {
                id: created.id.clone()
            }))
        );

        // A second sweep finds nothing left to evict
        assert_eq!(sweeper.sweep_once().unwrap(), 0);
        assert_eq!(subscription.try_recv(), None);
    }

    #[test]
    fn test_touch_keeps_lobby_alive() {
        let (sweeper, store, clock) = create_test_sweeper();
        let kept = store.create(fields()).unwrap();
        let dropped = store.create(fields()).unwrap();

        clock.advance(ChronoDuration::seconds(100));
        store.touch(&kept.id).unwrap();
        clock.advance(ChronoDuration::seconds(100));

        assert_eq!(sweeper.sweep_once().unwrap(), 1);
        assert!(store.get(&kept.id).is_ok());
        assert!(store.get(&dropped.id).is_err());
    }

    #[test]
    fn test_update_counts_as_liveness() {
        let (sweeper, store, clock) = create_test_sweeper();
        let created = store.create(fields()).unwrap();

        clock.advance(ChronoDuration::seconds(90));
        store
            .update_player_count(&created.id, created.secret.expose(), 2, 4)
            .unwrap();
        clock.advance(ChronoDuration::seconds(90));

        assert_eq!(sweeper.sweep_once().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (sweeper, _store, _clock) = create_test_sweeper();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = sweeper.spawn(shutdown_rx);
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
