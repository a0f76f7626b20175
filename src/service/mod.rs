//! Service layer for the lobby registry
//!
//! Application state, health checks and background task management for the
//! standalone service binary.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthStatus, ServiceContext, ServiceStats};
