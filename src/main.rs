//! Server binary: wiring, background sweeps and the HTTP/WS surface.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::info;
use tracing_subscriber::EnvFilter;

use enermon::abtest::manager::ABTestManager;
use enermon::alerts::manager::AlertManager;
use enermon::api::{router, AppState};
use enermon::common::config::Config;
use enermon::drift::detector::DriftDetector;
use enermon::drift::domain::ErrorRatioStrategy;
use enermon::events::bus::{EventBus, MemBroker};
use enermon::events::gateway::{spawn_forwarders, ConnectionGateway, ConnectionRegistry};
use enermon::metrics::recorder::MetricsRecorder;
use enermon::store::mem::MemStore;
use enermon::training::domain::StubTrainer;
use enermon::training::retrain::RetrainTrigger;
use enermon::training::service::JobLifecycleManager;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::load();
    let store = MemStore::shared();
    let bus = EventBus::new(Arc::new(MemBroker::new(cfg.broker_capacity)));

    let recorder = Arc::new(MetricsRecorder::new(Arc::clone(&store)));
    let alerts = Arc::new(AlertManager::new(Arc::clone(&store), bus.clone()));
    let detector = Arc::new(DriftDetector::new(
        Arc::clone(&recorder),
        Arc::new(ErrorRatioStrategy::default()),
    ));
    let lifecycle = Arc::new(JobLifecycleManager::new(
        Arc::clone(&store),
        Arc::new(StubTrainer),
        Arc::clone(&recorder),
        Arc::clone(&alerts),
        bus.clone(),
        cfg.job_timeout_secs,
        cfg.estimated_training_secs,
    ));
    let abtests = Arc::new(ABTestManager::new(
        Arc::clone(&store),
        Arc::clone(&recorder),
        Arc::clone(&alerts),
        cfg.ab_min_samples,
        cfg.ab_confidence_margin,
    ));
    let retrain = Arc::new(RetrainTrigger::new(
        Arc::clone(&lifecycle),
        Arc::clone(&detector),
        Arc::clone(&recorder),
        cfg.retrain_cooldown_secs,
        cfg.degradation_threshold,
        cfg.retrain_baseline_days,
    ));
    let gateway = Arc::new(ConnectionGateway::new(
        Arc::new(ConnectionRegistry::new()),
        cfg.heartbeat_interval_secs,
        cfg.missed_heartbeat_limit,
    ));

    spawn_forwarders(Arc::clone(&gateway), &bus);

    // Crash recovery before accepting traffic.
    let reclaimed = lifecycle.reconcile();
    if reclaimed > 0 {
        info!(reclaimed, "reclaimed stuck jobs at startup");
    }

    spawn_sweep(cfg.reconcile_interval_secs, {
        let lifecycle = Arc::clone(&lifecycle);
        move || {
            lifecycle.reconcile();
        }
    });
    spawn_sweep(cfg.retrain_sweep_secs, {
        let retrain = Arc::clone(&retrain);
        move || {
            retrain.sweep();
        }
    });
    spawn_sweep(cfg.ab_sweep_secs, {
        let abtests = Arc::clone(&abtests);
        move || {
            abtests.finalize_due();
        }
    });
    spawn_sweep(cfg.heartbeat_interval_secs, {
        let gateway = Arc::clone(&gateway);
        move || {
            gateway.sweep();
        }
    });

    let app = router(Arc::new(AppState {
        lifecycle,
        recorder,
        detector,
        abtests,
        alerts,
        gateway,
        cfg: cfg.clone(),
    }));

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    info!(addr = %cfg.bind_addr, "enermon listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_sweep<F>(every_secs: u64, mut tick: F)
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut timer = interval(Duration::from_secs(every_secs.max(1)));
        timer.tick().await; // skip the immediate first tick
        loop {
            timer.tick().await;
            tick();
        }
    });
}
