//! # Composition Controller
//!
//! A Kubernetes controller that converges GCP infrastructure declared as
//! custom resources.
//!
//! ## Overview
//!
//! 1. **Managed resources** - `Network` and `Connection` resources are bound to
//!    a GCP VPC network and a Service Networking connection. Each tick observes
//!    the external resource and creates, updates or deletes it.
//! 2. **Composites** - a `Composite` instantiates templates as managed
//!    resources it owns, patching values from its own fields into them.
//! 3. **Connection secrets** - connection details of ready resources are
//!    published to Secrets owned by the resource.
//!
//! ## Usage
//!
//! See the [README.md](../README.md) for usage instructions and examples.

use anyhow::{Context, Result};
use composition_controller::config::ControllerConfig;
use composition_controller::connection::{ConnectionPublisher, PublisherChain, SecretPublisher};
use composition_controller::controller::runtime::{self, Context as ControllerContext};
use composition_controller::controller::CompositeReconciler;
use composition_controller::crd::{Composite, Connection, Network};
use composition_controller::managed::{ManagedReconciler, ReconcileTiming};
use composition_controller::observability::{self, server::ServerState};
use composition_controller::provider::gcp::GcpConnecter;
use composition_controller::store::{KubeStore, ObjectStore};
use kube::api::Api;
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &ControllerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_lowercase()));

    if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Required for rustls 0.23+ before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow::anyhow!("Failed to install rustls crypto provider"));
    }

    let config = ControllerConfig::from_env();
    init_tracing(&config);

    info!("Starting Composition Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    if config.gcp.emulator_mode {
        info!(
            "GCP emulator mode: compute={}, servicenetworking={}",
            config.gcp.compute_endpoint, config.gcp.servicenetworking_endpoint
        );
    }

    observability::register_metrics().context("Failed to register metrics")?;

    let server_state = Arc::new(ServerState::default());
    let server_port = config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = observability::server::start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let http = reqwest::Client::builder()
        .build()
        .context("Failed to create HTTP client")?;

    let store: Arc<dyn ObjectStore> = Arc::new(KubeStore::new(client.clone()));
    let secrets: Arc<dyn ConnectionPublisher> = Arc::new(SecretPublisher::new(Arc::clone(&store)));
    let publisher: Arc<dyn ConnectionPublisher> = Arc::new(PublisherChain::new(vec![secrets]));
    let timing = ReconcileTiming::from(&config);
    let concurrency = config.max_concurrent_reconciliations;

    let networks = Arc::new(ControllerContext::new(
        ManagedReconciler::<Network>::new(
            Arc::clone(&store),
            Arc::new(GcpConnecter::<Network>::new(
                Arc::clone(&store),
                http.clone(),
                config.gcp.clone(),
            )),
            Arc::clone(&publisher),
            timing,
        ),
        &config,
    ));
    let connections = Arc::new(ControllerContext::new(
        ManagedReconciler::<Connection>::new(
            Arc::clone(&store),
            Arc::new(GcpConnecter::<Connection>::new(
                Arc::clone(&store),
                http,
                config.gcp.clone(),
            )),
            Arc::clone(&publisher),
            timing,
        ),
        &config,
    ));
    let composites = Arc::new(ControllerContext::new(
        CompositeReconciler::new(Arc::clone(&store), publisher, timing),
        &config,
    ));

    server_state.set_ready(true);
    info!("Controller initialized, starting watch loops...");

    tokio::join!(
        runtime::run_managed(Api::<Network>::all(client.clone()), networks, concurrency),
        runtime::run_managed(Api::<Connection>::all(client.clone()), connections, concurrency),
        runtime::run_composite(Api::<Composite>::all(client), composites, concurrency),
    );

    server_state.set_ready(false);
    info!("Controller stopped gracefully");
    Ok(())
}
