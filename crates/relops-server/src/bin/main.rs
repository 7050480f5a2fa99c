//! relops server executable

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use relops_adapters::{KubeAdapter, LogAdapter, LokiAdapter, MetricsAdapter, PrometheusAdapter};
use relops_common::Config;
use relops_correlation::CorrelationEngine;
use relops_detection::IncidentDetector;
use relops_investigation::AraOrchestrator;
use relops_realtime::RealtimeHub;
use relops_recovery::RecoveryActionService;
use relops_server::probes::{ClusterProbe, DatabaseProbe, LogsProbe, MetricsProbe};
use relops_server::{AppState, AvailabilitySweep, CorrelationKickoff, Scheduler, Server};
use relops_stability::{BreakerRegistry, HealthAggregator};
use relops_store::PgStore;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("relops-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Incident detection and correlation core for reliability operations")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (TOML); environment variables override it"),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("Bind address (default: 0.0.0.0:<PORT>)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    init_tracing(matches.get_flag("verbose"));

    let config = load_config(matches.get_one::<String>("config"))?;
    if let Some(endpoint) = &config.telemetry.trace_endpoint {
        info!("Trace collector endpoint configured: {endpoint}");
    }

    info!("Starting relops server v{}", env!("CARGO_PKG_VERSION"));

    // Persistence
    let pool = relops_store::connect(&config.database)
        .await
        .context("failed to connect to database")?;
    let store = Arc::new(PgStore::new(pool.clone()));

    // Stability + adapters
    let breakers = Arc::new(BreakerRegistry::new());
    let metrics: Arc<dyn MetricsAdapter> = Arc::new(
        PrometheusAdapter::new(
            config.telemetry.prometheus_url.clone(),
            breakers.get_or_create("prometheus"),
        )
        .context("failed to build metrics adapter")?,
    );
    let logs: Arc<dyn LogAdapter> = Arc::new(
        LokiAdapter::new(
            config.telemetry.loki_url.clone(),
            breakers.get_or_create("loki"),
        )
        .context("failed to build log adapter")?,
    );
    let cluster = KubeAdapter::detect(breakers.get_or_create("kubernetes")).await;
    if !cluster.is_enabled() {
        info!("Running with cluster features disabled");
    }

    // Realtime hub
    let hub = RealtimeHub::new();

    // Correlation, investigation and the detection bridge
    let engine = Arc::new(CorrelationEngine::new(
        store.clone(),
        metrics.clone(),
        logs.clone(),
        cluster.clone(),
    ));
    let investigator = Arc::new(AraOrchestrator::new(
        metrics.clone(),
        logs.clone(),
        cluster.clone(),
        store.clone(),
        hub.clone(),
    ));
    let trigger = Arc::new(CorrelationKickoff::new(
        store.clone(),
        engine.clone(),
        investigator,
        hub.clone(),
    ));

    // Recovery action workflow
    let recovery = Arc::new(RecoveryActionService::new(store.clone(), cluster.clone()));

    // Detector
    let detector = Arc::new(IncidentDetector::new(
        store.clone(),
        metrics.clone(),
        cluster.clone(),
        trigger.clone(),
    ));

    // Composite health
    let mut health = HealthAggregator::new();
    health.register(Arc::new(DatabaseProbe::new(pool.clone())));
    health.register(Arc::new(MetricsProbe::new(metrics.clone())));
    health.register(Arc::new(LogsProbe::new(logs.clone())));
    if let Some(adapter) = cluster.adapter() {
        health.register(Arc::new(ClusterProbe::new(adapter.clone())));
    }
    let health = Arc::new(health);

    // Background jobs
    let scheduler = Arc::new(Scheduler::new());
    let detection_interval = config.detection.interval();
    let run_detector = detector.clone();
    scheduler.spawn_supervised("incident_detection", move |shutdown| {
        let detector = run_detector.clone();
        async move {
            detector.run(detection_interval, shutdown).await;
        }
    });
    scheduler.spawn_slo_job(
        config.detection.slo_interval(),
        Arc::new(AvailabilitySweep::new(store.clone(), metrics.clone())),
    );

    // HTTP surface
    let state = AppState {
        store,
        engine,
        detector,
        metrics,
        cluster,
        recovery,
        trigger,
        hub: hub.clone(),
        health,
        breakers,
    };
    let server = Server::new(state, config.server.allowed_origins.clone());

    let bind_addr = matches
        .get_one::<String>("bind")
        .cloned()
        .unwrap_or_else(|| format!("0.0.0.0:{}", config.server.port));

    let shutdown_scheduler = scheduler.clone();
    let shutdown_hub = hub.clone();
    let shutdown = async move {
        if tokio::signal::ctrl_c().await.is_err() {
            error!("Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        shutdown_scheduler.begin_shutdown();
        shutdown_hub.shutdown().await;
    };

    server.run(&bind_addr, shutdown).await?;

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .init();
}

fn load_config(config_path: Option<&String>) -> anyhow::Result<Config> {
    let base = match config_path {
        Some(path) => {
            info!("Loading configuration from {path}");
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {path}"))?;
            toml::from_str(&raw).with_context(|| format!("failed to parse config file {path}"))?
        }
        None => Config::default(),
    };
    Ok(Config::from_env_with(base)?)
}
