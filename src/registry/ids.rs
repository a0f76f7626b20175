//! Identifier generation for lobby ids and ownership secrets

use crate::config::RegistrySettings;
use crate::error::{RegistryError, RegistryResult};
use crate::types::{LobbyId, LobbySecret};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use tracing::warn;

/// What an identifier is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// Public lobby id, unique among live lobbies
    LobbyId,
    /// Bearer credential, must be unguessable
    Secret,
}

/// Generates collision-checked lobby ids and opaque secrets
#[derive(Debug, Clone)]
pub struct IdGenerator {
    id_length: usize,
    secret_length: usize,
    max_attempts: u32,
}

impl IdGenerator {
    pub fn new(id_length: usize, secret_length: usize, max_attempts: u32) -> Self {
        Self {
            id_length,
            secret_length,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_settings(settings: &RegistrySettings) -> Self {
        Self::new(
            settings.id_length,
            settings.secret_length,
            settings.max_id_attempts,
        )
    }

    /// Produce a new identifier of `kind`.
    ///
    /// For [`IdKind::LobbyId`] candidates are redrawn while `is_taken` reports
    /// them in use; `IdentifierExhausted` after `max_attempts` draws. Secrets
    /// are drawn from the operating system RNG and never checked.
    pub fn new_id(&self, kind: IdKind, is_taken: impl Fn(&str) -> bool) -> RegistryResult<String> {
        match kind {
            IdKind::Secret => Ok(random_token(&mut OsRng, self.secret_length)),
            IdKind::LobbyId => {
                let mut rng = rand::thread_rng();
                for attempt in 1..=self.max_attempts {
                    let candidate = random_token(&mut rng, self.id_length);
                    if !is_taken(&candidate) {
                        return Ok(candidate);
                    }
                    warn!("Lobby id collision on attempt {}, retrying", attempt);
                }
                Err(RegistryError::IdentifierExhausted {
                    attempts: self.max_attempts,
                })
            }
        }
    }

    /// Allocate a lobby id not rejected by `is_taken`
    pub fn lobby_id(&self, is_taken: impl Fn(&str) -> bool) -> RegistryResult<LobbyId> {
        self.new_id(IdKind::LobbyId, is_taken)
    }

    /// Draw a fresh ownership secret
    pub fn secret(&self) -> LobbySecret {
        LobbySecret::new(random_token(&mut OsRng, self.secret_length))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::from_settings(&RegistrySettings::default())
    }
}

fn random_token<R: Rng>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}
