//! Registry facade
//!
//! The surface a request-handling layer calls into. Each operation forwards
//! to exactly one store or hub call and folds the recoverable errors into
//! [`Outcome`] codes. Fatal errors stay `Err`.

use crate::error::{RegistryError, RegistryResult};
use crate::registry::hub::{EventHub, Subscription, SubscriptionId};
use crate::registry::store::LobbyStore;
use crate::types::{CreatedLobby, LobbyFields, LobbyPatch, LobbyRecord, RegistrySnapshot};
use std::sync::Arc;

/// Result code of a facade call, ready to be mapped onto a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Ok(T),
    NotFound,
    Forbidden,
    InvalidInput(String),
}

impl<T> Outcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    /// The payload, if the call succeeded
    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ok(value) => Outcome::Ok(f(value)),
            Outcome::NotFound => Outcome::NotFound,
            Outcome::Forbidden => Outcome::Forbidden,
            Outcome::InvalidInput(reason) => Outcome::InvalidInput(reason),
        }
    }

    /// Short label for logs and status mapping
    pub fn code(&self) -> &'static str {
        match self {
            Outcome::Ok(_) => "ok",
            Outcome::NotFound => "not_found",
            Outcome::Forbidden => "forbidden",
            Outcome::InvalidInput(_) => "invalid_input",
        }
    }
}

fn settle<T>(result: RegistryResult<T>) -> RegistryResult<Outcome<T>> {
    match result {
        Ok(value) => Ok(Outcome::Ok(value)),
        Err(RegistryError::LobbyNotFound { .. }) => Ok(Outcome::NotFound),
        Err(RegistryError::Forbidden { .. }) => Ok(Outcome::Forbidden),
        Err(RegistryError::InvalidInput { reason }) => Ok(Outcome::InvalidInput(reason)),
        Err(fatal) => Err(fatal),
    }
}

/// Entry point for lobby operations
#[derive(Clone)]
pub struct RegistryFacade {
    store: Arc<LobbyStore>,
    hub: Arc<EventHub>,
}

impl RegistryFacade {
    pub fn new(store: Arc<LobbyStore>) -> Self {
        let hub = store.hub();
        Self { store, hub }
    }

    pub fn store(&self) -> Arc<LobbyStore> {
        self.store.clone()
    }

    pub fn create_lobby(&self, fields: LobbyFields) -> RegistryResult<Outcome<CreatedLobby>> {
        settle(self.store.create(fields))
    }

    pub fn get_lobby(&self, lobby_id: &str) -> RegistryResult<Outcome<LobbyRecord>> {
        settle(self.store.get(lobby_id))
    }

    /// All lobbies, or only `lobby_id` when given
    pub fn list_lobbies(&self, lobby_id: Option<&str>) -> RegistryResult<Outcome<RegistrySnapshot>> {
        match lobby_id {
            Some(lobby_id) => settle(self.store.list_one(lobby_id)),
            None => settle(self.store.list()),
        }
    }

    pub fn touch(&self, lobby_id: &str) -> RegistryResult<Outcome<()>> {
        settle(self.store.touch(lobby_id))
    }

    pub fn update_lobby(
        &self,
        lobby_id: &str,
        secret: &str,
        patch: LobbyPatch,
    ) -> RegistryResult<Outcome<RegistrySnapshot>> {
        settle(self.store.update(lobby_id, secret, patch))
    }

    pub fn update_player_count(
        &self,
        lobby_id: &str,
        secret: &str,
        player_count: u32,
        max_player_count: u32,
    ) -> RegistryResult<Outcome<()>> {
        settle(
            self.store
                .update_player_count(lobby_id, secret, player_count, max_player_count),
        )
    }

    pub fn delete_lobby(&self, lobby_id: &str, secret: &str) -> RegistryResult<Outcome<()>> {
        settle(self.store.remove(lobby_id, secret))
    }

    /// Attach a change feed. The first event is the open notice.
    pub fn subscribe_to_changes(&self) -> RegistryResult<Subscription> {
        self.hub.subscribe()
    }

    /// Resend the open notice to one subscriber
    pub fn ping_subscriber(&self, subscription_id: &SubscriptionId) -> Outcome<()> {
        if self.hub.ping(subscription_id) {
            Outcome::Ok(())
        } else {
            Outcome::NotFound
        }
    }
}
