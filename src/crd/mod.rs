//! # Custom Resource Definitions
//!
//! CRD types reconciled by the controller.
//!
//! ## Module Structure
//!
//! - `provider.rs` - GCP project scope and credentials
//! - `network.rs` - Compute VPC network (managed resource)
//! - `connection.rs` - Service Networking connection (managed resource)
//! - `composite.rs` - Composite resource and its composed references
//! - `condition.rs` - Ready/Synced status conditions
//! - `common.rs` - References shared by every kind

mod common;
mod composite;
mod condition;
mod connection;
mod network;
mod provider;

pub use common::{preserve_unknown_fields, ProviderReference, SecretKeySelector, SecretReference};
pub use composite::{ComposedReference, Composite, CompositeSpec, CompositeStatus};
pub use condition::{get_condition, set_conditions, Condition, TYPE_READY, TYPE_SYNCED};
pub use connection::{
    Connection, ConnectionObservation, ConnectionParameters, ConnectionSpec, ConnectionStatus,
    SERVICE_NETWORKING_PARENT,
};
pub use network::{
    Network, NetworkObservation, NetworkParameters, NetworkPeering, NetworkSpec, NetworkStatus,
    RoutingConfig,
};
pub use provider::{Provider, ProviderSpec};
