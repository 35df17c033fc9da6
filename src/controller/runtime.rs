//! # Controller Runtime
//!
//! kube-runtime `Controller`s for every reconciled kind. Each controller
//! watches its kind across all namespaces, hands objects to the matching
//! reconciler and requeues failures with a per-resource Fibonacci backoff that
//! resets on the next success.

use super::backoff::FibonacciBackoff;
use super::composite::CompositeReconciler;
use crate::config::ControllerConfig;
use crate::crd::Composite;
use crate::error::{Error, Result};
use crate::managed::{ExternalKind, ManagedReconciler};
use crate::observability::metrics;
use futures::{Future, StreamExt};
use kube::api::Api;
use kube::Resource;
use kube_runtime::controller::{Action, Config};
use kube_runtime::{watcher, Controller};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Backoff state of one resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

/// Per-resource backoff states, keyed by `namespace/name`
#[derive(Debug)]
pub struct Backoffs {
    states: Mutex<HashMap<String, BackoffState>>,
    min_secs: u64,
    max_secs: u64,
}

impl Backoffs {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            min_secs,
            max_secs,
        }
    }

    /// Record a failure and return the delay before the next attempt
    pub fn next(&self, key: &str) -> (Duration, u32) {
        match self.states.lock() {
            Ok(mut states) => {
                let state = states.entry(key.to_string()).or_insert_with(|| BackoffState {
                    backoff: FibonacciBackoff::new(self.min_secs, self.max_secs),
                    error_count: 0,
                });
                state.error_count += 1;
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using maximum backoff", e);
                (Duration::from_secs(self.max_secs), 0)
            }
        }
    }

    pub fn reset(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(key);
        }
    }
}

/// Shared context of one controller
pub struct Context<R> {
    pub reconciler: R,
    pub backoffs: Backoffs,
}

impl<R: fmt::Debug> fmt::Debug for Context<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

impl<R> Context<R> {
    pub fn new(reconciler: R, config: &ControllerConfig) -> Self {
        Self {
            reconciler,
            backoffs: Backoffs::new(config.backoff_min_secs, config.backoff_max_secs),
        }
    }
}

fn resource_key<K: Resource>(obj: &K) -> String {
    format!(
        "{}/{}",
        obj.meta().namespace.as_deref().unwrap_or_default(),
        obj.meta().name.as_deref().unwrap_or("unknown")
    )
}

/// Requeue a failed reconciliation with this resource's next backoff
fn error_policy<K: Resource, R>(obj: Arc<K>, error: &Error, ctx: Arc<Context<R>>) -> Action
where
    K::DynamicType: Default,
{
    let key = resource_key(obj.as_ref());
    let (delay, error_count) = ctx.backoffs.next(&key);
    error!(
        "Reconciliation error for {} {}: {}",
        K::kind(&K::DynamicType::default()),
        key,
        error
    );
    info!(
        "🔄 Retrying {} in {}s (error count: {})",
        key,
        delay.as_secs(),
        error_count
    );
    metrics::increment_requeues("error-backoff");
    Action::requeue(delay)
}

fn reset_on_success<K: Resource, R>(
    obj: &K,
    ctx: &Context<R>,
    result: Result<Action>,
) -> Result<Action> {
    if result.is_ok() {
        ctx.backoffs.reset(&resource_key(obj));
    }
    result
}

/// Run the controller for managed kind `K` until shutdown
pub async fn run_managed<K>(
    api: Api<K>,
    ctx: Arc<Context<ManagedReconciler<K>>>,
    concurrency: u16,
) where
    K: ExternalKind,
{
    info!("Starting {} controller", K::kind(&()));
    Controller::new(api, watcher::Config::default().any_semantic())
        .with_config(Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(
            |obj: Arc<K>, ctx: Arc<Context<ManagedReconciler<K>>>| async move {
                let result = ctx.reconciler.reconcile(obj.as_ref().clone()).await;
                reset_on_success(obj.as_ref(), &ctx, result)
            },
            error_policy,
            ctx,
        )
        .for_each(log_outcome)
        .await;
    info!("{} controller stopped", K::kind(&()));
}

/// Run the composite controller until shutdown
pub async fn run_composite(
    api: Api<Composite>,
    ctx: Arc<Context<CompositeReconciler>>,
    concurrency: u16,
) {
    info!("Starting Composite controller");
    Controller::new(api, watcher::Config::default().any_semantic())
        .with_config(Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(
            |obj: Arc<Composite>, ctx: Arc<Context<CompositeReconciler>>| async move {
                let result = ctx.reconciler.reconcile(obj.as_ref().clone()).await;
                reset_on_success(obj.as_ref(), &ctx, result)
            },
            error_policy,
            ctx,
        )
        .for_each(log_outcome)
        .await;
    info!("Composite controller stopped");
}

fn log_outcome<T: fmt::Debug, E: fmt::Display>(
    outcome: std::result::Result<T, E>,
) -> impl Future<Output = ()> {
    match outcome {
        Ok(obj) => debug!("Reconciled {:?}", obj),
        Err(e) => debug!("Controller event error: {}", e),
    }
    futures::future::ready(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_per_resource_and_resets() {
        let backoffs = Backoffs::new(5, 60);

        assert_eq!(backoffs.next("ns/a"), (Duration::from_secs(5), 1));
        assert_eq!(backoffs.next("ns/a"), (Duration::from_secs(5), 2));
        assert_eq!(backoffs.next("ns/a"), (Duration::from_secs(10), 3));
        assert_eq!(backoffs.next("ns/b"), (Duration::from_secs(5), 1));

        backoffs.reset("ns/a");
        assert_eq!(backoffs.next("ns/a"), (Duration::from_secs(5), 1));
    }
}
