//! Composition Controller Library
//!
//! Reconciles managed cloud resources against GCP and composes them from
//! templates declared on `Composite` resources.
//!
//! - `managed`: external lifecycle of one managed resource (Connect, Observe,
//!   then Create, Update or Delete)
//! - `composition`: templates, patches and the composed resource reconciler
//! - `connection`: connection detail publishing to Secrets
//! - `store`: object store abstraction over the Kubernetes API, plus an
//!   in-memory implementation used by tests
//! - `provider`: provider adapters (GCP Compute and Service Networking)
//! - `controller`: kube-runtime wiring and the composite tick

pub mod composition;
pub mod config;
pub mod connection;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
pub mod managed;
pub mod observability;
pub mod provider;
pub mod resource;
pub mod store;

pub use error::{Error, Result};
