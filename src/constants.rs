//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Field manager name used for server-side patches
pub const FIELD_MANAGER: &str = "composition-controller";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default requeue interval after a successful reconciliation (seconds)
/// External resources are re-observed on this cadence to detect drift
pub const DEFAULT_RECONCILE_POLL_INTERVAL_SECS: u64 = 60;

/// Default requeue interval right after an external resource was created (seconds)
/// Newly created resources usually become observable quickly
pub const DEFAULT_CREATE_REQUEUE_SECS: u64 = 10;

/// Default maximum number of concurrent reconciliations per controller
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default Fibonacci backoff minimum (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default Fibonacci backoff maximum (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Finalizer placed on managed resources before any external mutation
pub const MANAGED_FINALIZER: &str = "finalizer.managedresource.octopilot.io";

/// Finalizer placed on composite resources
pub const COMPOSITE_FINALIZER: &str = "finalizer.composite.octopilot.io";

/// GCP Compute API endpoint
pub const GCP_COMPUTE_ENDPOINT: &str = "https://compute.googleapis.com";

/// GCP Service Networking API endpoint
pub const GCP_SERVICENETWORKING_ENDPOINT: &str = "https://servicenetworking.googleapis.com";

/// OAuth2 token endpoint used when a service account key names none
pub const GCP_OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// OAuth2 scope requested for service account tokens
pub const GCP_CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Lifetime of a service account JWT assertion (seconds)
pub const GCP_ASSERTION_LIFETIME_SECS: i64 = 3600;

/// GCP metadata server token endpoint (Workload Identity)
pub const GCP_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
