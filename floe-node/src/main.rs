use std::future::ready;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use common_metrics::{serve, setup_metrics_routes};
use envconfig::Envconfig;
use floe_graph::GraphRegistry;
use floe_registry::Client as RegistryClient;
use floe_rpc::InMemoryTransport;
use floe_runtime::{Leader, Worker};
use floe_state::{Driver, FileDriver, MemoryDriver};
use health::HealthRegistry;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod config;
mod graphs;

use config::{Config, Role};

common_alloc::used!();

fn setup_tracing(log_format: &str) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    if log_format == "json" {
        let layer = tracing_subscriber::fmt::layer().json().with_filter(filter);
        tracing_subscriber::registry().with(layer).init();
    } else {
        let layer = tracing_subscriber::fmt::layer().with_filter(filter);
        tracing_subscriber::registry().with(layer).init();
    }
}

async fn index() -> &'static str {
    "floe"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init_from_env()?;
    setup_tracing(&config.log_format);
    config.validate_storage()?;

    info!(
        peer = %config.cluster.peer_name,
        role = ?config.cluster.role,
        "starting floe-node"
    );

    let liveness = HealthRegistry::new("liveness");

    let driver: Arc<dyn Driver> = match config.storage_driver.as_str() {
        "file" => Arc::new(FileDriver::new(config.storage_path.clone())),
        _ => Arc::new(MemoryDriver::new()),
    };

    let transport = Arc::new(InMemoryTransport::new());
    let store = Arc::new(floe_registry::InMemoryStore::new());
    let registry_client = Arc::new(RegistryClient::new(store, config.registry_cfg()?));

    let graph_registry = Arc::new(GraphRegistry::new());
    graph_registry
        .register(graphs::word_count_definition())
        .expect("built-in graph types do not collide");

    // Reference single-process deployment: this peer discovers itself
    // through the same in-memory directory the leader and worker watch.
    transport.register_peer(&config.cluster.peer_name);

    let mut tasks = Vec::new();

    if matches!(config.cluster.role, Role::Leader | Role::Both) {
        let leader_health = liveness
            .register("leader".to_string(), Duration::from_secs(30))
            .await;
        let leader = Arc::new(Leader::with_liveness(
            transport.clone(),
            transport.clone(),
            Some(leader_health),
        ));
        tasks.push(tokio::spawn(async move {
            if let Err(e) = leader.run().await {
                error!(error = %e, "leader exited");
            }
        }));
    }

    if matches!(config.cluster.role, Role::Worker | Role::Both) {
        let worker_health = liveness
            .register("worker".to_string(), Duration::from_secs(30))
            .await;
        let worker = Arc::new(Worker::with_liveness(
            config.cluster.peer_name.clone(),
            transport.clone(),
            registry_client.clone(),
            graph_registry.clone(),
            driver.clone(),
            config.cluster.ring_size,
            Some(worker_health),
        ));
        tasks.push(tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                error!(error = %e, "worker exited");
            }
        }));
    }

    let readiness_probe = liveness.clone();
    let health_router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(move || ready(readiness_probe.get_status())))
        .route("/_liveness", get(move || ready(liveness.get_status())));
    let health_router = setup_metrics_routes(health_router);

    let bind = config.bind_addr();
    let http_server = tokio::spawn(async move {
        if let Err(e) = serve(health_router, &bind).await {
            error!(error = %e, "health/metrics server failed");
        }
    });
    tasks.push(http_server);

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    for task in tasks {
        task.abort();
    }

    Ok(())
}
