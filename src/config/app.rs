//! Main application configuration
//!
//! This module defines the configuration structures for the lobby registry,
//! including environment variable and TOML file loading plus validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub registry: RegistrySettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for the health and metrics endpoints
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Interval of the periodic health log
    pub health_check_interval_seconds: u64,
}

/// Registry core settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Liveness interval: sweep cadence and eviction threshold
    pub liveness_interval_seconds: u64,
    /// Length of generated lobby ids
    pub id_length: usize,
    /// Length of generated ownership secrets
    pub secret_length: usize,
    /// Collision retries before id generation gives up
    pub max_id_attempts: u32,
    /// Per-subscriber queue depth before the subscriber is cut off
    pub subscriber_buffer: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "lobby-registry".to_string(),
            log_level: "info".to_string(),
            metrics_port: 9090,
            shutdown_timeout_seconds: 30,
            health_check_interval_seconds: 30,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            liveness_interval_seconds: 120, // 2 minutes
            id_length: 32,
            secret_length: 32,
            max_id_attempts: 16,
            subscriber_buffer: 256,
        }
    }
}

/// Parse an environment variable into `target` if it is set
fn override_from_env<T: FromStr>(name: &str, target: &mut T) -> Result<()> {
    if let Ok(raw) = env::var(name) {
        *target = raw
            .parse()
            .map_err(|_| anyhow!("Invalid {} value: {}", name, raw))?;
    }
    Ok(())
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still override
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        override_from_env("METRICS_PORT", &mut self.service.metrics_port)?;
        override_from_env(
            "SHUTDOWN_TIMEOUT_SECONDS",
            &mut self.service.shutdown_timeout_seconds,
        )?;
        override_from_env(
            "HEALTH_CHECK_INTERVAL_SECONDS",
            &mut self.service.health_check_interval_seconds,
        )?;

        // Registry settings
        override_from_env(
            "LIVENESS_INTERVAL_SECONDS",
            &mut self.registry.liveness_interval_seconds,
        )?;
        override_from_env("LOBBY_ID_LENGTH", &mut self.registry.id_length)?;
        override_from_env("LOBBY_SECRET_LENGTH", &mut self.registry.secret_length)?;
        override_from_env("MAX_ID_ATTEMPTS", &mut self.registry.max_id_attempts)?;
        override_from_env("SUBSCRIBER_BUFFER", &mut self.registry.subscriber_buffer)?;

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get health check interval as Duration
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.service.health_check_interval_seconds)
    }

    /// Get liveness interval as Duration
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.registry.liveness_interval_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.metrics_port == 0 {
        return Err(anyhow!("Metrics port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.service.health_check_interval_seconds == 0 {
        return Err(anyhow!("Health check interval must be greater than 0"));
    }

    // Validate registry settings
    if config.registry.liveness_interval_seconds == 0 {
        return Err(anyhow!("Liveness interval must be greater than 0"));
    }
    if config.registry.id_length < 8 {
        return Err(anyhow!(
            "Lobby id length must be at least 8, got {}",
            config.registry.id_length
        ));
    }
    if config.registry.secret_length < 16 {
        return Err(anyhow!(
            "Lobby secret length must be at least 16, got {}",
            config.registry.secret_length
        ));
    }
    if config.registry.max_id_attempts == 0 {
        return Err(anyhow!("Max id attempts must be greater than 0"));
    }
    if config.registry.subscriber_buffer == 0 {
        return Err(anyhow!("Subscriber buffer must be greater than 0"));
    }

    Ok(())
}
