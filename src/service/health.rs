//! Health checks and service statistics
//!
//! Readiness and liveness probes for the lobby registry, built on a
//! [`ServiceContext`] that the monitoring server and the periodic health
//! task share with [`AppState`](crate::service::AppState).

use crate::registry::{EventHub, LobbyStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Numeric form exported as a gauge: 0 unhealthy, 1 degraded, 2 healthy
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn combine(self, other: &HealthStatus) -> HealthStatus {
        match (self, other) {
            (_, HealthStatus::Unhealthy) | (HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
            (_, HealthStatus::Degraded) | (HealthStatus::Degraded, _) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// What the probes need to see of a running service
#[derive(Clone)]
pub struct ServiceContext {
    pub service_name: String,
    pub store: Arc<LobbyStore>,
    pub hub: Arc<EventHub>,
    pub is_running: Arc<RwLock<bool>>,
    pub started_at: DateTime<Utc>,
}

impl ServiceContext {
    pub fn new(service_name: impl Into<String>, store: Arc<LobbyStore>) -> Self {
        let hub = store.hub();
        Self {
            service_name: service_name.into(),
            store,
            hub,
            is_running: Arc::new(RwLock::new(false)),
            started_at: Utc::now(),
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Number of registered lobbies
    pub active_lobbies: usize,
    /// Number of attached change-feed subscribers
    pub active_subscribers: usize,
    /// Total lobbies created since service start
    pub lobbies_created: u64,
    /// Total lobbies evicted by the liveness sweeper
    pub lobbies_expired: u64,
    /// Creation time of this registry instance
    pub epoch_stamp: Option<DateTime<Utc>>,
    pub uptime_seconds: i64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(context: &ServiceContext) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(context).await,
            Self::check_store(context),
            Self::check_hub(context),
        ];

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |overall, check| {
                overall.combine(&check.status)
            });

        Ok(HealthCheck {
            status,
            service: context.service_name.clone(),
            version: crate::VERSION.to_string(),
            timestamp: Utc::now(),
            checks,
            stats: Self::gather_service_stats(context),
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(context: &ServiceContext) -> Result<HealthStatus> {
        if context.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify the store can serve requests
    pub async fn readiness_check(context: &ServiceContext) -> Result<HealthStatus> {
        if !context.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        Ok(Self::check_store(context).status)
    }

    async fn check_service_running(context: &ServiceContext) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if context.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// A poisoned store lock makes every operation fail
    fn check_store(context: &ServiceContext) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match context.store.list() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Lobby store check failed: {}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Store unavailable: {}", e)),
                )
            }
        };

        ComponentCheck {
            name: "lobby_store".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_hub(context: &ServiceContext) -> ComponentCheck {
        let start = std::time::Instant::now();
        let subscribers = context.hub.subscriber_count();
        debug!("Event hub has {} subscribers", subscribers);

        ComponentCheck {
            name: "event_hub".to_string(),
            status: HealthStatus::Healthy,
            message: None,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Gather current service statistics
    pub fn gather_service_stats(context: &ServiceContext) -> ServiceStats {
        let mut stats = ServiceStats {
            active_lobbies: context.store.len(),
            active_subscribers: context.hub.subscriber_count(),
            epoch_stamp: Some(context.hub.epoch_stamp()),
            uptime_seconds: (Utc::now() - context.started_at).num_seconds(),
            ..ServiceStats::default()
        };

        match context.store.get_stats() {
            Ok(store_stats) => {
                stats.lobbies_created = store_stats.lobbies_created;
                stats.lobbies_expired = store_stats.lobbies_expired;
            }
            Err(e) => debug!("Failed to get store stats for health check: {}", e),
        }

        stats
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::IdGenerator;
    use crate::types::LobbyFields;

    fn create_test_context() -> ServiceContext {
        let hub = Arc::new(EventHub::new(Utc::now(), 8));
        let store = Arc::new(LobbyStore::new(IdGenerator::default(), hub));
        ServiceContext::new("lobby-registry-test", store)
    }

    #[test]
    fn test_status_combination() {
        assert_eq!(
            HealthStatus::Healthy.combine(&HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Degraded.combine(&HealthStatus::Unhealthy),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthStatus::Healthy.combine(&HealthStatus::Healthy),
            HealthStatus::Healthy
        );
        assert_eq!(HealthStatus::Degraded.as_gauge(), 1);
    }

    #[tokio::test]
    async fn test_not_running_is_unhealthy() {
        let context = create_test_context();

        let health = HealthCheck::check(&context).await.unwrap();
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(
            HealthCheck::readiness_check(&context).await.unwrap(),
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_running_service_reports_stats() {
        let context = create_test_context();
        *context.is_running.write().await = true;
        context
            .store
            .create(LobbyFields::new("X", "1.2.3.4", 7000, 1, 4))
            .unwrap();
        let _subscription = context.hub.subscribe().unwrap();

        let health = HealthCheck::check(&context).await.unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.stats.active_lobbies, 1);
        assert_eq!(health.stats.active_subscribers, 1);
        assert_eq!(health.stats.lobbies_created, 1);
        assert_eq!(health.stats.epoch_stamp, Some(context.hub.epoch_stamp()));
        assert_eq!(health.checks.len(), 3);
        assert!(health.to_json().unwrap().contains("lobby_store"));

        assert_eq!(
            HealthCheck::liveness_check(&context).await.unwrap(),
            HealthStatus::Healthy
        );
    }
}
