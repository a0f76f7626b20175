//! Error types for the lobby registry
//!
//! Domain failures are a `thiserror` enum returned as plain values from the
//! store and hub; wiring and start-up code uses the `anyhow` alias.

/// Result type alias for service and configuration code
pub type Result<T> = anyhow::Result<T>;

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Failures produced by the registry core
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Lobby not found: {lobby_id}")]
    LobbyNotFound { lobby_id: String },

    #[error("Secret does not match lobby: {lobby_id}")]
    Forbidden { lobby_id: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Identifier space exhausted after {attempts} attempts")]
    IdentifierExhausted { attempts: u32 },

    #[error("Internal registry error: {message}")]
    InternalError { message: String },
}

impl RegistryError {
    /// Whether the caller can recover from this error (as opposed to a fatal fault)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RegistryError::LobbyNotFound { .. }
                | RegistryError::Forbidden { .. }
                | RegistryError::InvalidInput { .. }
        )
    }

    pub(crate) fn not_found(lobby_id: &str) -> Self {
        RegistryError::LobbyNotFound {
            lobby_id: lobby_id.to_string(),
        }
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        RegistryError::InternalError {
            message: format!("Failed to acquire {} lock", what),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_taxonomy() {
        assert!(RegistryError::not_found("abc").is_recoverable());
        assert!(RegistryError::Forbidden {
            lobby_id: "abc".to_string()
        }
        .is_recoverable());
        assert!(!RegistryError::IdentifierExhausted { attempts: 3 }.is_recoverable());
        assert!(!RegistryError::poisoned("lobbies").is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RegistryError::not_found("abc").to_string(),
            "Lobby not found: abc"
        );
        assert_eq!(
            RegistryError::poisoned("lobbies").to_string(),
            "Internal registry error: Failed to acquire lobbies lock"
        );
    }
}
