//! Lobby store
//!
//! The authoritative map from lobby id to record. Every mutation runs under
//! one write lock and publishes its change event before the lock is
//! released, so events reach subscribers in commit order and a notified
//! subscriber can immediately read what it was told about.

use crate::error::{RegistryError, RegistryResult};
use crate::metrics::MetricsCollector;
use crate::registry::hub::EventHub;
use crate::registry::ids::IdGenerator;
use crate::types::{
    ChangeEvent, CreatedLobby, LobbyFields, LobbyId, LobbyPatch, LobbyRecord, LobbySecret,
    RegistrySnapshot, RemovalReason,
};
use crate::utils::{Clock, SystemClock};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Statistics about store operations
#[derive(Debug, Clone, Default)]
pub struct LobbyStoreStats {
    /// Total number of lobbies created
    pub lobbies_created: u64,
    /// Total number of lobbies deleted by their owner
    pub lobbies_deleted: u64,
    /// Total number of lobbies evicted for missing liveness pings
    pub lobbies_expired: u64,
    /// Total number of applied updates
    pub updates_applied: u64,
    /// Total number of accepted liveness pings
    pub liveness_pings: u64,
    /// Current number of lobbies
    pub active_lobbies: usize,
}

#[derive(Default)]
struct StoreState {
    lobbies: HashMap<LobbyId, LobbyRecord>,
    // Kept apart from the records so a serialized record can never carry it
    secrets: HashMap<LobbyId, LobbySecret>,
}

impl StoreState {
    /// Ownership check: absence first, then credential
    fn authorize(&self, lobby_id: &str, secret: &str) -> RegistryResult<()> {
        match self.secrets.get(lobby_id) {
            None => Err(RegistryError::not_found(lobby_id)),
            Some(stored) if stored.matches(secret) => Ok(()),
            Some(_) => Err(RegistryError::Forbidden {
                lobby_id: lobby_id.to_string(),
            }),
        }
    }
}

/// In-memory lobby store
pub struct LobbyStore {
    state: RwLock<StoreState>,
    id_generator: IdGenerator,
    hub: Arc<EventHub>,
    clock: Arc<dyn Clock>,
    stats: RwLock<LobbyStoreStats>,
    metrics_collector: Arc<MetricsCollector>,
}

impl LobbyStore {
    /// Create a store on the wall clock
    pub fn new(id_generator: IdGenerator, hub: Arc<EventHub>) -> Self {
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        Self::with_clock(id_generator, hub, Arc::new(SystemClock), metrics_collector)
    }

    /// Create a store with an explicit time source and metrics collector
    pub fn with_clock(
        id_generator: IdGenerator,
        hub: Arc<EventHub>,
        clock: Arc<dyn Clock>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            id_generator,
            hub,
            clock,
            stats: RwLock::new(LobbyStoreStats::default()),
            metrics_collector,
        }
    }

    pub fn hub(&self) -> Arc<EventHub> {
        self.hub.clone()
    }

    pub fn epoch_stamp(&self) -> DateTime<Utc> {
        self.hub.epoch_stamp()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn write_state(&self) -> RegistryResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| RegistryError::poisoned("lobbies"))
    }

    fn update_stats(&self, apply: impl FnOnce(&mut LobbyStoreStats)) {
        match self.stats.write() {
            Ok(mut stats) => apply(&mut stats),
            Err(_) => warn!("Failed to acquire stats lock"),
        }
    }

    /// Register a new lobby and issue its id and secret
    pub fn create(&self, fields: LobbyFields) -> RegistryResult<CreatedLobby> {
        let timer = self.metrics_collector.start_timer();

        // Reject before an id is ever allocated
        fields.validate()?;

        let created = {
            let mut state = self.write_state()?;

            let id = self
                .id_generator
                .lobby_id(|candidate| state.lobbies.contains_key(candidate))?;
            let secret = self.id_generator.secret();
            let record = fields.into_record(id.clone(), self.clock.now())?;

            info!(
                "Created lobby {} - title: '{}', host: {}:{}, players: {}/{}",
                id,
                record.title,
                record.host,
                record.port,
                record.player_count,
                record.max_player_count
            );

            state.secrets.insert(id.clone(), secret.clone());
            state.lobbies.insert(id.clone(), record.clone());
            self.hub.publish(ChangeEvent::Added { lobby: record });

            let total = state.lobbies.len();
            self.update_stats(|stats| {
                stats.lobbies_created += 1;
                stats.active_lobbies = total;
            });

            CreatedLobby { id, secret }
        };

        self.metrics_collector.record_lobby_created();
        self.metrics_collector.record_operation("create", timer.stop());

        Ok(created)
    }

    /// Fetch one record
    pub fn get(&self, lobby_id: &str) -> RegistryResult<LobbyRecord> {
        let state = self
            .state
            .read()
            .map_err(|_| RegistryError::poisoned("lobbies"))?;

        state
            .lobbies
            .get(lobby_id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(lobby_id))
    }

    /// Snapshot of every registered lobby
    pub fn list(&self) -> RegistryResult<RegistrySnapshot> {
        let state = self
            .state
            .read()
            .map_err(|_| RegistryError::poisoned("lobbies"))?;

        let records: BTreeMap<LobbyId, LobbyRecord> = state
            .lobbies
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();

        Ok(self.snapshot_of(records))
    }

    /// Snapshot restricted to a single lobby
    pub fn list_one(&self, lobby_id: &str) -> RegistryResult<RegistrySnapshot> {
        let record = self.get(lobby_id)?;
        Ok(self.single_snapshot(record))
    }

    fn single_snapshot(&self, record: LobbyRecord) -> RegistrySnapshot {
        let mut records = BTreeMap::new();
        records.insert(record.id.clone(), record);
        self.snapshot_of(records)
    }

    fn snapshot_of(&self, records: BTreeMap<LobbyId, LobbyRecord>) -> RegistrySnapshot {
        RegistrySnapshot {
            epoch_stamp: self.epoch_stamp(),
            total_count: records.len(),
            records,
        }
    }

    /// Refresh a lobby's liveness clock. Emits no change event.
    pub fn touch(&self, lobby_id: &str) -> RegistryResult<()> {
        {
            let mut state = self.write_state()?;
            let record = state
                .lobbies
                .get_mut(lobby_id)
                .ok_or_else(|| RegistryError::not_found(lobby_id))?;
            record.last_seen_at = record.last_seen_at.max(self.clock.now());
        }

        debug!("Liveness ping for lobby {}", lobby_id);
        self.update_stats(|stats| stats.liveness_pings += 1);
        self.metrics_collector.record_liveness_ping();
        Ok(())
    }

    /// Apply an owner's partial update and return the updated lobby as a snapshot
    pub fn update(
        &self,
        lobby_id: &str,
        secret: &str,
        patch: LobbyPatch,
    ) -> RegistryResult<RegistrySnapshot> {
        let timer = self.metrics_collector.start_timer();

        let record = {
            let mut state = self.write_state()?;
            if let Err(e) = state.authorize(lobby_id, secret) {
                self.note_rejection("update", &e);
                return Err(e);
            }

            if patch.is_empty() {
                debug!("Empty patch for lobby {}, refreshing liveness only", lobby_id);
            }

            let now = self.clock.now();
            let record = state
                .lobbies
                .get_mut(lobby_id)
                .ok_or_else(|| RegistryError::not_found(lobby_id))?;
            patch.apply_to(record);
            record.last_seen_at = record.last_seen_at.max(now);
            let record = record.clone();

            debug!(
                "Updated lobby {} - players: {}/{}",
                lobby_id, record.player_count, record.max_player_count
            );
            self.hub.publish(ChangeEvent::Updated {
                lobby: record.clone(),
            });
            record
        };

        self.update_stats(|stats| stats.updates_applied += 1);
        self.metrics_collector.record_lobby_updated();
        self.metrics_collector.record_operation("update", timer.stop());

        Ok(self.single_snapshot(record))
    }

    /// Owner update restricted to the player counters
    pub fn update_player_count(
        &self,
        lobby_id: &str,
        secret: &str,
        player_count: u32,
        max_player_count: u32,
    ) -> RegistryResult<()> {
        self.update(
            lobby_id,
            secret,
            LobbyPatch::player_counts(player_count, max_player_count),
        )
        .map(|_| ())
    }

    /// Delete a lobby on behalf of its owner
    pub fn remove(&self, lobby_id: &str, secret: &str) -> RegistryResult<()> {
        let mut state = self.write_state()?;
        if let Err(e) = state.authorize(lobby_id, secret) {
            self.note_rejection("remove", &e);
            return Err(e);
        }

        self.remove_locked(&mut state, lobby_id, RemovalReason::Deleted)
            .map(|_| ())
            .ok_or_else(|| RegistryError::not_found(lobby_id))
    }

    /// Privileged removal without an ownership check
    pub fn remove_unchecked(&self, lobby_id: &str, reason: RemovalReason) -> RegistryResult<()> {
        let mut state = self.write_state()?;
        self.remove_locked(&mut state, lobby_id, reason)
            .map(|_| ())
            .ok_or_else(|| RegistryError::not_found(lobby_id))
    }

    /// Evict `lobby_id` if, at `now`, it has gone `threshold` without a
    /// liveness signal. The staleness check and the removal are one atomic
    /// step, so a touch that lands first always saves the lobby.
    pub fn evict_if_stale(
        &self,
        lobby_id: &str,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> RegistryResult<bool> {
        let mut state = self.write_state()?;
        let stale = state
            .lobbies
            .get(lobby_id)
            .is_some_and(|record| now - record.last_seen_at >= threshold);

        if stale {
            self.remove_locked(&mut state, lobby_id, RemovalReason::Expired);
        }
        Ok(stale)
    }

    /// Ids whose last liveness signal is at least `threshold` before `now`
    pub fn stale_lobby_ids(
        &self,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> RegistryResult<Vec<LobbyId>> {
        let state = self
            .state
            .read()
            .map_err(|_| RegistryError::poisoned("lobbies"))?;

        Ok(state
            .lobbies
            .values()
            .filter(|record| now - record.last_seen_at >= threshold)
            .map(|record| record.id.clone())
            .collect())
    }

    // The single removal path: record and secret go together, one Removed event.
    fn remove_locked(
        &self,
        state: &mut StoreState,
        lobby_id: &str,
        reason: RemovalReason,
    ) -> Option<LobbyRecord> {
        let record = state.lobbies.remove(lobby_id)?;
        state.secrets.remove(lobby_id);
        let remaining = state.lobbies.len();

        info!(
            "Removed lobby {} ({}) - remaining lobbies: {}",
            lobby_id, reason, remaining
        );
        self.hub.publish(ChangeEvent::Removed {
            id: lobby_id.to_string(),
        });

        self.update_stats(|stats| {
            match reason {
                RemovalReason::Deleted => stats.lobbies_deleted += 1,
                RemovalReason::Expired => stats.lobbies_expired += 1,
            }
            stats.active_lobbies = remaining;
        });
        self.metrics_collector.record_lobby_removed(reason);

        Some(record)
    }

    fn note_rejection(&self, operation: &str, error: &RegistryError) {
        if let RegistryError::Forbidden { lobby_id } = error {
            warn!("Rejected {} on lobby {}: secret mismatch", operation, lobby_id);
            self.metrics_collector.record_forbidden(operation);
        } else {
            debug!("Rejected {}: {}", operation, error);
        }
    }

    /// Number of registered lobbies
    pub fn len(&self) -> usize {
        self.state
            .read()
            .map(|state| state.lobbies.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get current store statistics
    pub fn get_stats(&self) -> RegistryResult<LobbyStoreStats> {
        let stats = self
            .stats
            .read()
            .map_err(|_| RegistryError::poisoned("stats"))?;

        Ok(stats.clone())
    }
}
