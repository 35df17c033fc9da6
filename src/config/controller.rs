//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Requeue interval after a successful reconciliation (seconds)
    pub reconcile_poll_interval_secs: u64,
    /// Requeue interval right after an external resource was created (seconds)
    pub create_requeue_secs: u64,
    /// Fibonacci backoff minimum for failed reconciliations (seconds)
    pub backoff_min_secs: u64,
    /// Fibonacci backoff maximum for failed reconciliations (seconds)
    pub backoff_max_secs: u64,
    /// Maximum concurrent reconciliations per controller
    pub max_concurrent_reconciliations: u16,
    /// Port for the metrics and probe server
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// GCP client settings shared by every provider adapter
    pub gcp: GcpClientConfig,
}

/// Endpoints and auth mode for the GCP REST adapters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpClientConfig {
    /// Base URL for the Compute API
    pub compute_endpoint: String,
    /// Base URL for the Service Networking API
    pub servicenetworking_endpoint: String,
    /// Emulator mode: skip token acquisition and use a dummy token
    pub emulator_mode: bool,
}

impl Default for GcpClientConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            compute_endpoint: GCP_COMPUTE_ENDPOINT.to_string(),
            servicenetworking_endpoint: GCP_SERVICENETWORKING_ENDPOINT.to_string(),
            emulator_mode: false,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            reconcile_poll_interval_secs: DEFAULT_RECONCILE_POLL_INTERVAL_SECS,
            create_requeue_secs: DEFAULT_CREATE_REQUEUE_SECS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            gcp: GcpClientConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            reconcile_poll_interval_secs: env_var_or_default(
                "RECONCILE_POLL_INTERVAL_SECS",
                DEFAULT_RECONCILE_POLL_INTERVAL_SECS,
            ),
            create_requeue_secs: env_var_or_default(
                "CREATE_REQUEUE_SECS",
                DEFAULT_CREATE_REQUEUE_SECS,
            ),
            backoff_min_secs: env_var_or_default("BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            gcp: GcpClientConfig {
                compute_endpoint: env_var_or_default_str(
                    "GCP_COMPUTE_ENDPOINT",
                    GCP_COMPUTE_ENDPOINT,
                ),
                servicenetworking_endpoint: env_var_or_default_str(
                    "GCP_SERVICENETWORKING_ENDPOINT",
                    GCP_SERVICENETWORKING_ENDPOINT,
                ),
                emulator_mode: env_var_or_default_bool("GCP_EMULATOR_MODE", false),
            },
        }
    }

    /// Get the requeue duration after a successful reconciliation
    pub fn reconcile_poll_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_poll_interval_secs)
    }

    /// Get the requeue duration after an external create
    pub fn create_requeue_interval(&self) -> Duration {
        Duration::from_secs(self.create_requeue_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
