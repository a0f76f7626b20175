//! Lobby Registry - directory service for self-registered game lobbies
//!
//! Game hosts register short-lived lobbies, keep them alive with liveness
//! pings and own them through a secret issued at creation. Every change is
//! fanned out to subscribers as it commits, and lobbies that stop pinging
//! are evicted by a periodic sweep.

pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{RegistryError, RegistryResult, Result};
pub use types::*;

// Re-export key components
pub use registry::{
    EventHub, IdGenerator, LivenessSweeper, LobbyStore, Outcome, RegistryFacade, Subscription,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
