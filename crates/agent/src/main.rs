//! JVM Agent - per-node JVM configuration monitor
//!
//! Runs as a DaemonSet (or host service), discovers JVM processes, resolves
//! their heap and GC configuration and serves it over HTTP and Prometheus.

use agent_lib::{
    collector::{
        create_memory_reader, CollectionConfig, CollectionLoopBuilder, JvmRegistry,
        ProcfsDiscovery, SharedPressure,
    },
    health::HealthRegistry,
    jvm::{AttachTransport, DisabledTransport, HotSpotAttachTransport, JvmParamResolver},
    observability::{AgentMetrics, StructuredLogger},
    oom::OomContextCollector,
    process::ProcEnvironment,
};
use anyhow::Result;
use jvm_agent::{api, config::AgentConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting jvm-agent");

    let config = AgentConfig::load()?;
    info!(
        node_name = %config.node_name,
        proc_root = %config.proc_root.display(),
        cgroup_root = %config.cgroup_root.display(),
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(AGENT_VERSION, config.attach_enabled);

    let transport: Arc<dyn AttachTransport> = if config.attach_enabled {
        Arc::new(HotSpotAttachTransport::new(&config.proc_root, config.attach_timeout()))
    } else {
        Arc::new(DisabledTransport)
    };
    let resolver = JvmParamResolver::new(
        transport,
        Arc::new(ProcEnvironment::new(&config.proc_root)),
    );

    let registry = Arc::new(JvmRegistry::new(&config.node_name));
    let oom = Arc::new(OomContextCollector::new(&config.proc_root));
    let pressure = SharedPressure::default();
    let memory_reader = create_memory_reader(&config.cgroup_root, &config.proc_root).await;

    let collection = CollectionLoopBuilder::new()
        .discovery(Arc::new(ProcfsDiscovery::new(&config.proc_root)))
        .memory_reader(memory_reader)
        .resolver(resolver)
        .registry(registry.clone())
        .oom_collector(oom.clone())
        .pressure(pressure.clone())
        .health(health_registry.clone())
        .config(CollectionConfig {
            interval: config.collection_interval(),
            jitter: Duration::from_secs(1),
            proc_root: config.proc_root.clone(),
            perfmap_enabled: config.perfmap_enabled,
            attach_max_retries: config.attach_max_retries,
            ..CollectionConfig::default()
        })
        .build()?;

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        registry,
        pressure,
        oom,
    ));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let collection_handle = tokio::spawn(collection.run(shutdown_rx));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Err(e)) => warn!(error = %e, "API server failed"),
                Err(e) => warn!(error = %e, "API server task panicked"),
                Ok(Ok(())) => {}
            }
            logger.log_shutdown("API server stopped");
        }
    }

    health_registry.set_ready(false).await;
    // No receiver left only if the loop already exited
    let _ = shutdown_tx.send(());
    if let Err(e) = collection_handle.await {
        warn!(error = %e, "Collection loop task panicked");
    }

    info!("Shutting down");
    Ok(())
}
