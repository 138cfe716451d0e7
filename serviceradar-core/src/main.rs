//! Process entry point for the ServiceRadar ingest core.
//!
//! Bootstraps configuration and tracing, wires the registry/emitter/
//! liveness/stats components around an [`serviceradar_core::mock::InMemoryDatabase`]
//! (the RPC server transport that would feed `CoreHandler::report_status`
//! is out of scope for this crate), spawns the periodic flush/liveness/
//! stats tasks, and runs until `Ctrl+C` in a compose-spawn-await-abort-
//! cleanup shape.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use serviceradar_common::{init_tracing, now_millis, CoreConfig, TracingStatsSink};
use serviceradar_core::args::CoreArgs;
use serviceradar_core::mock::{InMemoryDatabase, RecordingAlertSink};
use serviceradar_core::CoreHandler;
use serviceradar_emit::{BufferedEmitter, LivenessTracker, StatsAggregator, SysmonStallTracker};
use serviceradar_registry::{AliasCache, DeviceRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CoreArgs::parse();

    let mut config = match CoreConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("falling back to default configuration: {e}");
            CoreConfig::default()
        }
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    init_tracing(&config.logging).map_err(|e| anyhow::anyhow!("{e}"))?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting ServiceRadar ingest core");

    let db = InMemoryDatabase::new();
    let registry = Arc::new(DeviceRegistry::new(db.clone()));
    let emitter = Arc::new(BufferedEmitter::new());
    let hydrator = AliasCache::new(db.clone(), config.cache.capacity, config.cache.ttl);
    let liveness = Arc::new(LivenessTracker::new(
        config.liveness.alert_threshold,
        config.liveness.alert_cooldown,
        config.known_pollers.clone(),
    ));
    let sysmon_stall = Arc::new(SysmonStallTracker::new(config.stats.sysmon_stall_threshold));
    let alerts = RecordingAlertSink::new();
    let stats = Arc::new(StatsAggregator::new(
        registry.clone(),
        Box::new(TracingStatsSink),
        config.stats.anomaly_cooldown,
    ));

    let _handler = Arc::new(CoreHandler::new(
        db.clone(),
        registry.clone(),
        emitter.clone(),
        hydrator,
        liveness.clone(),
        sysmon_stall,
        alerts.clone(),
    ));

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    tasks.push(tokio::spawn(flush_loop(emitter.clone(), db.clone(), registry.clone(), config.emitter.flush_interval)));
    tasks.push(tokio::spawn(liveness_loop(liveness.clone(), emitter.clone(), alerts.clone(), config.liveness.evaluator_interval)));
    tasks.push(tokio::spawn(stats_loop(stats.clone(), alerts.clone(), config.stats.refresh_interval)));

    tracing::info!(tasks = tasks.len(), "Ingest core running. Press Ctrl+C to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
    }

    tracing::info!("received shutdown signal");

    for task in &tasks {
        task.abort();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let report = emitter.flush_all(&db, &registry).await;
    if !report.errors.is_empty() {
        tracing::warn!(errors = report.errors.len(), "final flush completed with errors");
    }

    tracing::info!("Goodbye!");
    Ok(())
}

async fn flush_loop(emitter: Arc<BufferedEmitter>, db: InMemoryDatabase, registry: Arc<DeviceRegistry<InMemoryDatabase>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let report = emitter.flush_all(&db, &registry).await;
        if !report.errors.is_empty() {
            tracing::warn!(errors = report.errors.len(), "periodic flush completed with errors");
        }
    }
}

async fn liveness_loop(liveness: Arc<LivenessTracker>, emitter: Arc<BufferedEmitter>, alerts: RecordingAlertSink, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        liveness.evaluate(now_millis(), &emitter, &alerts).await;
    }
}

async fn stats_loop(stats: Arc<StatsAggregator<InMemoryDatabase>>, alerts: RecordingAlertSink, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        stats.refresh(now_millis(), Some(&alerts)).await;
    }
}
