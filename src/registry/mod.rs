//! The lobby registry core
//!
//! [`LobbyStore`] owns the records, [`EventHub`] fans their changes out,
//! [`LivenessSweeper`] evicts silent lobbies and [`RegistryFacade`] is the
//! surface request handlers call into.

pub mod facade;
pub mod hub;
pub mod ids;
pub mod relay;
pub mod store;
pub mod sweeper;

pub use facade::{Outcome, RegistryFacade};
pub use hub::{EventHub, Subscription, SubscriptionId};
pub use ids::{IdGenerator, IdKind};
pub use relay::{relay, FeedFrame, FeedSink, MockFeedSink, RelayEnd};
pub use store::{LobbyStore, LobbyStoreStats};
pub use sweeper::LivenessSweeper;
