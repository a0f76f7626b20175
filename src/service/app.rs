//! Main application state and service coordination
//!
//! `AppState` wires the registry core together with metrics, the monitoring
//! server and the background tasks, and owns their lifecycle.

use crate::config::AppConfig;
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::registry::{EventHub, IdGenerator, LivenessSweeper, LobbyStore, RegistryFacade};
use crate::service::health::{HealthCheck, ServiceContext};
use crate::utils::{Clock, SystemClock};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    /// Entry point for lobby operations
    facade: RegistryFacade,

    /// Shared view used by health probes
    context: ServiceContext,

    metrics_service: Arc<MetricsService>,

    background_tasks: Vec<JoinHandle<()>>,

    /// Stops the sweeper loop
    shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Initialize the application on the wall clock
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Initialize the application with an explicit time source
    pub async fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self, ServiceError> {
        info!("Initializing lobby registry service");
        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let hub = Arc::new(EventHub::with_metrics(
            clock.now(),
            config.registry.subscriber_buffer,
            metrics_collector.clone(),
        ));
        let store = Arc::new(LobbyStore::with_clock(
            IdGenerator::from_settings(&config.registry),
            hub.clone(),
            clock,
            metrics_collector.clone(),
        ));
        info!("Registry epoch stamp: {}", hub.epoch_stamp().to_rfc3339());

        let context = ServiceContext::new(config.service.name.clone(), store.clone());
        let metrics_service = Self::initialize_metrics(&config, metrics_collector, &context);
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            facade: RegistryFacade::new(store),
            config,
            context,
            metrics_service,
            background_tasks: Vec::new(),
            shutdown_tx,
        })
    }

    fn initialize_metrics(
        config: &AppConfig,
        metrics_collector: Arc<MetricsCollector>,
        context: &ServiceContext,
    ) -> Arc<MetricsService> {
        info!(
            "Initializing metrics service on port {}",
            config.service.metrics_port
        );

        let health_config = HealthServerConfig {
            port: config.service.metrics_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone())
                .with_context(context.clone()),
        );

        Arc::new(MetricsService::new(metrics_collector, health_server))
    }

    /// Start the monitoring server and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting lobby registry service");

        *self.context.is_running.write().await = true;

        self.start_metrics_service().await;
        self.start_background_tasks();

        info!("✅ Lobby registry service started successfully");
        Ok(())
    }

    /// Start only the liveness sweeper, without the monitoring server
    pub async fn start_registry(&mut self) -> Result<(), ServiceError> {
        *self.context.is_running.write().await = true;
        self.start_sweeper();
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of lobby registry");

        *self.context.is_running.write().await = false;

        // Sweeper exits on its own; the rest is aborted below
        let _ = self.shutdown_tx.send(());

        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        self.stop_background_tasks().await;

        let final_stats = self
            .context
            .store
            .get_stats()
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Failed to get final stats: {}", e),
            })?;

        info!("Final registry statistics: {:?}", final_stats);
        info!("✅ Lobby registry shutdown completed");

        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        self.context.is_running().await
    }

    pub fn facade(&self) -> RegistryFacade {
        self.facade.clone()
    }

    pub fn store(&self) -> Arc<LobbyStore> {
        self.context.store.clone()
    }

    pub fn hub(&self) -> Arc<EventHub> {
        self.context.hub.clone()
    }

    /// Health probe context
    pub fn context(&self) -> &ServiceContext {
        &self.context
    }

    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    async fn start_metrics_service(&mut self) {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.metrics_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });
        self.background_tasks.push(metrics_handle);

        // Give the server a moment to bind
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
    }

    fn start_sweeper(&mut self) {
        let sweeper = LivenessSweeper::new(
            self.context.store.clone(),
            self.config.liveness_interval(),
        );
        let handle = sweeper.spawn(self.shutdown_tx.subscribe());
        self.background_tasks.push(handle);
    }

    /// Start background maintenance tasks
    fn start_background_tasks(&mut self) {
        info!(
            "Starting liveness sweeper ({}s interval)...",
            self.config.liveness_interval().as_secs()
        );
        self.start_sweeper();

        info!(
            "Starting health metrics task ({}s interval)...",
            self.config.health_check_interval().as_secs()
        );
        let health_metrics_task = {
            let metrics_collector = self.metrics_service.collector();
            let context = self.context.clone();
            let check_interval = self.config.health_check_interval();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(check_interval);
                let start_time = tokio::time::Instant::now();
                info!("Health metrics task started");

                while context.is_running().await {
                    interval.tick().await;

                    let uptime_seconds = start_time.elapsed().as_secs() as i64;
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(uptime_seconds);

                    match HealthCheck::check(&context).await {
                        Ok(health) => {
                            metrics_collector.update_health_status(health.status.as_gauge());
                            for check in &health.checks {
                                metrics_collector.update_component_health(
                                    &check.name,
                                    check.status != crate::service::HealthStatus::Unhealthy,
                                );
                            }
                            info!(
                                "Health check: {} - {} active lobbies, {} subscribers",
                                health.status,
                                health.stats.active_lobbies,
                                health.stats.active_subscribers
                            );
                        }
                        Err(e) => warn!("Health check failed: {}", e),
                    }
                    debug!("Updated service health metrics - uptime: {}s", uptime_seconds);
                }

                info!("Health metrics task stopped");
            })
        };
        self.background_tasks.push(health_metrics_task);

        info!(
            "{} background tasks running",
            self.background_tasks.len()
        );
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LobbyFields;
    use crate::utils::MockClock;

    #[tokio::test]
    async fn test_app_state_lifecycle() {
        let mut app_state = AppState::new(AppConfig::default()).await.unwrap();
        assert!(!app_state.is_running().await);

        app_state.start_registry().await.unwrap();
        assert!(app_state.is_running().await);

        let created = app_state
            .facade()
            .create_lobby(LobbyFields::new("X", "1.2.3.4", 7000, 1, 4))
            .unwrap()
            .ok()
            .unwrap();
        assert!(app_state.store().get(&created.id).is_ok());

        app_state.shutdown().await.unwrap();
        assert!(!app_state.is_running().await);
    }

    #[tokio::test]
    async fn test_epoch_stamp_comes_from_clock() {
        let clock = Arc::new(MockClock::default());
        let app_state = AppState::with_clock(AppConfig::default(), clock.clone())
            .await
            .unwrap();

        assert_eq!(app_state.hub().epoch_stamp(), clock.now());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.registry.secret_length = 4;

        assert!(matches!(
            AppState::new(config).await,
            Err(ServiceError::Configuration { .. })
        ));
    }
}
