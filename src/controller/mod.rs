//! # Controller
//!
//! Wiring between kube-runtime and the reconcilers.
//!
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `composite`: the composite reconciliation tick
//! - `runtime`: watch loops and error policy

pub mod backoff;
pub mod composite;
pub mod runtime;

pub use composite::CompositeReconciler;
