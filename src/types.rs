//! Common types used throughout the lobby registry

use crate::error::{RegistryError, RegistryResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier for lobbies
pub type LobbyId = String;

/// Ownership credential issued once per lobby
///
/// Not `Serialize`: the only place the value leaves the registry
/// is [`CreatedLobby`], which opts in explicitly.
#[derive(Clone, PartialEq, Eq)]
pub struct LobbySecret(String);

impl LobbySecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw credential value, for the creation response only
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Compare against a caller-supplied credential without short-circuiting
    /// on the first differing byte.
    pub fn matches(&self, candidate: &str) -> bool {
        let expected = self.0.as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for LobbySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LobbySecret(<redacted>)")
    }
}

/// One advertised game session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyRecord {
    pub id: LobbyId,
    pub title: String,
    pub host: String,
    pub port: u16,
    pub player_count: u32,
    pub max_player_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Client-supplied fields for creating a lobby
///
/// Every field is optional at the type level so a missing one surfaces as
/// `InvalidInput` instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyFields {
    pub title: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub player_count: Option<u32>,
    pub max_player_count: Option<u32>,
}

impl LobbyFields {
    /// Convenience constructor with every field present
    pub fn new(
        title: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        player_count: u32,
        max_player_count: u32,
    ) -> Self {
        Self {
            title: Some(title.into()),
            host: Some(host.into()),
            port: Some(port),
            player_count: Some(player_count),
            max_player_count: Some(max_player_count),
        }
    }

    /// Check that every required field is present
    pub fn validate(&self) -> RegistryResult<()> {
        let missing: Vec<&str> = [
            ("title", self.title.is_none()),
            ("host", self.host.is_none()),
            ("port", self.port.is_none()),
            ("playerCount", self.player_count.is_none()),
            ("maxPlayerCount", self.max_player_count.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::InvalidInput {
                reason: format!("missing required fields: {}", missing.join(", ")),
            })
        }
    }

    /// Build the record for a freshly allocated id
    pub(crate) fn into_record(self, id: LobbyId, now: DateTime<Utc>) -> RegistryResult<LobbyRecord> {
        let LobbyFields {
            title: Some(title),
            host: Some(host),
            port: Some(port),
            player_count: Some(player_count),
            max_player_count: Some(max_player_count),
        } = self
        else {
            return Err(RegistryError::InvalidInput {
                reason: "missing required fields".to_string(),
            });
        };

        Ok(LobbyRecord {
            id,
            title,
            host,
            port,
            player_count,
            max_player_count,
            created_at: now,
            last_seen_at: now,
        })
    }
}

/// Partial update of a lobby's mutable fields
///
/// There is no slot for `id`, `createdAt` or the secret, and unknown keys are
/// ignored on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPatch {
    pub title: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub player_count: Option<u32>,
    pub max_player_count: Option<u32>,
}

impl LobbyPatch {
    /// Patch touching only the player counters
    pub fn player_counts(player_count: u32, max_player_count: u32) -> Self {
        Self {
            player_count: Some(player_count),
            max_player_count: Some(max_player_count),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.host.is_none()
            && self.port.is_none()
            && self.player_count.is_none()
            && self.max_player_count.is_none()
    }

    /// Apply present fields onto `record`
    pub fn apply_to(&self, record: &mut LobbyRecord) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(host) = &self.host {
            record.host = host.clone();
        }
        if let Some(port) = self.port {
            record.port = port;
        }
        if let Some(player_count) = self.player_count {
            record.player_count = player_count;
        }
        if let Some(max_player_count) = self.max_player_count {
            record.max_player_count = max_player_count;
        }
    }
}

/// Point-in-time view of the registry handed to readers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    /// Creation time of the registry instance
    pub epoch_stamp: DateTime<Utc>,
    pub total_count: usize,
    pub records: BTreeMap<LobbyId, LobbyRecord>,
}

/// Response to a successful creation; the only carrier of the secret
#[derive(Debug, Clone, Serialize)]
pub struct CreatedLobby {
    pub id: LobbyId,
    #[serde(serialize_with = "serialize_secret")]
    pub secret: LobbySecret,
}

fn serialize_secret<S: Serializer>(secret: &LobbySecret, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose())
}

/// Mutation notification produced once per successful store change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChangeEvent {
    Added { lobby: LobbyRecord },
    Updated { lobby: LobbyRecord },
    Removed { id: LobbyId },
}

impl ChangeEvent {
    pub fn lobby_id(&self) -> &str {
        match self {
            ChangeEvent::Added { lobby } | ChangeEvent::Updated { lobby } => &lobby.id,
            ChangeEvent::Removed { id } => id,
        }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Added { .. } => "added",
            ChangeEvent::Updated { .. } => "updated",
            ChangeEvent::Removed { .. } => "removed",
        }
    }

    /// Event name push transports emit this change under
    pub fn event_name(&self) -> &'static str {
        match self {
            ChangeEvent::Added { .. } => "add-lobby",
            ChangeEvent::Updated { .. } => "update-lobby",
            ChangeEvent::Removed { .. } => "remove-lobby",
        }
    }
}

/// Everything a subscriber can receive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum FeedEvent {
    /// Sent first on every subscription, and again on request
    #[serde(rename_all = "camelCase")]
    Open { epoch_stamp: DateTime<Utc> },
    Change(ChangeEvent),
}

impl FeedEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            FeedEvent::Open { .. } => "ping-respond",
            FeedEvent::Change(change) => change.event_name(),
        }
    }

    /// For an `Open` notice, whether a snapshot cached under `cached_epoch`
    /// belongs to a different registry instance and must be refetched.
    /// Returns `None` for change events.
    pub fn is_cache_miss(&self, cached_epoch: Option<DateTime<Utc>>) -> Option<bool> {
        match self {
            FeedEvent::Open { epoch_stamp } => Some(cached_epoch != Some(*epoch_stamp)),
            FeedEvent::Change(_) => None,
        }
    }
}

impl From<ChangeEvent> for FeedEvent {
    fn from(change: ChangeEvent) -> Self {
        FeedEvent::Change(change)
    }
}

/// Why a lobby left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemovalReason {
    /// Owner deleted it
    Deleted,
    /// Sweeper evicted it after missing liveness pings
    Expired,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalReason::Deleted => "deleted",
            RemovalReason::Expired => "expired",
        }
    }
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
