//! # Observability
//!
//! Prometheus metrics and the HTTP endpoints that expose them.
//!
//! - `metrics`: Prometheus metrics collection
//! - `server`: `/metrics`, `/healthz` and `/readyz` endpoints

pub mod metrics;
pub mod server;

pub use metrics::*;
