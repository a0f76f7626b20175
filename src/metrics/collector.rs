//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the lobby registry using
//! Prometheus metrics.

use crate::types::RemovalReason;
use anyhow::Result;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the lobby registry
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Lobby store metrics
    registry_metrics: RegistryMetrics,

    /// Subscriber fanout metrics
    fanout_metrics: FanoutMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Lobby store metrics
#[derive(Clone)]
pub struct RegistryMetrics {
    /// Number of lobbies currently registered
    pub active_lobbies: IntGauge,

    /// Total lobbies created
    pub lobbies_created_total: IntCounter,

    /// Total lobbies removed, by reason
    pub lobbies_removed_total: IntCounterVec,

    /// Total successful updates
    pub lobby_updates_total: IntCounter,

    /// Total liveness pings accepted
    pub liveness_pings_total: IntCounter,

    /// Rejected ownership checks, by operation
    pub forbidden_total: IntCounterVec,

    /// Store operation durations
    pub operation_duration: HistogramVec,
}

/// Subscriber fanout metrics
#[derive(Clone)]
pub struct FanoutMetrics {
    /// Currently attached subscribers
    pub active_subscribers: IntGauge,

    /// Events published, by kind
    pub events_published_total: IntCounterVec,

    /// Subscribers detached by the hub, by reason
    pub subscribers_dropped_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let registry_metrics = RegistryMetrics::new(&registry)?;
        let fanout_metrics = FanoutMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            registry_metrics,
            fanout_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn lobbies(&self) -> &RegistryMetrics {
        &self.registry_metrics
    }

    pub fn fanout(&self) -> &FanoutMetrics {
        &self.fanout_metrics
    }

    /// Record a lobby being created
    pub fn record_lobby_created(&self) {
        self.registry_metrics.lobbies_created_total.inc();
        self.registry_metrics.active_lobbies.inc();
    }

    /// Record a lobby leaving the registry
    pub fn record_lobby_removed(&self, reason: RemovalReason) {
        self.registry_metrics
            .lobbies_removed_total
            .with_label_values(&[reason.as_str()])
            .inc();
        self.registry_metrics.active_lobbies.dec();
    }

    pub fn record_lobby_updated(&self) {
        self.registry_metrics.lobby_updates_total.inc();
    }

    pub fn record_liveness_ping(&self) {
        self.registry_metrics.liveness_pings_total.inc();
    }

    /// Record an ownership check that failed on an existing lobby
    pub fn record_forbidden(&self, operation: &str) {
        self.registry_metrics
            .forbidden_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Record store operation duration
    pub fn record_operation(&self, operation: &str, duration: Duration) {
        self.registry_metrics
            .operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    pub fn record_event_published(&self, kind: &str) {
        self.fanout_metrics
            .events_published_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn record_subscriber_attached(&self) {
        self.fanout_metrics.active_subscribers.inc();
    }

    /// Record a subscriber going away; `reason` is "unsubscribed", "closed" or "lagged"
    pub fn record_subscriber_detached(&self, reason: &str) {
        self.fanout_metrics.active_subscribers.dec();
        if reason != "unsubscribed" {
            self.fanout_metrics
                .subscribers_dropped_total
                .with_label_values(&[reason])
                .inc();
        }
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("lobby_registry_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "lobby_registry_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("lobby_registry_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
        })
    }
}

impl RegistryMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_lobbies = IntGauge::new(
            "lobby_registry_active_lobbies",
            "Number of registered lobbies",
        )?;
        registry.register(Box::new(active_lobbies.clone()))?;

        let lobbies_created_total = IntCounter::new(
            "lobby_registry_lobbies_created_total",
            "Total lobbies created",
        )?;
        registry.register(Box::new(lobbies_created_total.clone()))?;

        let lobbies_removed_total = IntCounterVec::new(
            Opts::new(
                "lobby_registry_lobbies_removed_total",
                "Total lobbies removed",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(lobbies_removed_total.clone()))?;

        let lobby_updates_total = IntCounter::new(
            "lobby_registry_lobby_updates_total",
            "Total lobby updates applied",
        )?;
        registry.register(Box::new(lobby_updates_total.clone()))?;

        let liveness_pings_total = IntCounter::new(
            "lobby_registry_liveness_pings_total",
            "Total liveness pings accepted",
        )?;
        registry.register(Box::new(liveness_pings_total.clone()))?;

        let forbidden_total = IntCounterVec::new(
            Opts::new(
                "lobby_registry_forbidden_total",
                "Rejected ownership checks",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(forbidden_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "lobby_registry_operation_duration_seconds",
                "Store operation duration",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            active_lobbies,
            lobbies_created_total,
            lobbies_removed_total,
            lobby_updates_total,
            liveness_pings_total,
            forbidden_total,
            operation_duration,
        })
    }
}

impl FanoutMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_subscribers = IntGauge::new(
            "lobby_registry_active_subscribers",
            "Currently attached subscribers",
        )?;
        registry.register(Box::new(active_subscribers.clone()))?;

        let events_published_total = IntCounterVec::new(
            Opts::new(
                "lobby_registry_events_published_total",
                "Change events published",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(events_published_total.clone()))?;

        let subscribers_dropped_total = IntCounterVec::new(
            Opts::new(
                "lobby_registry_subscribers_dropped_total",
                "Subscribers detached by the hub",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(subscribers_dropped_total.clone()))?;

        Ok(Self {
            active_subscribers,
            events_published_total,
            subscribers_dropped_total,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
