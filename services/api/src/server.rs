use crate::cli::ServeArgs;
use crate::infra::{build_engine, AppState, InMemoryRecordStore};
use crate::routes::with_reconciliation_routes;
use crate::scheduler::Scheduler;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use hps_reconcile::config::AppConfig;
use hps_reconcile::error::AppError;
use hps_reconcile::telemetry;
use hps_reconcile::workflows::clearance::{ReconciliationState, RunLock};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryRecordStore::load(&config)?);
    let engine = Arc::new(
        build_engine(&config, store)?.only_unread(config.reconciliation.only_unread),
    );
    let lock = RunLock::default();

    if args.with_scheduler {
        let scheduler = Scheduler::new(
            Arc::clone(&engine),
            lock.clone(),
            config.schedule,
            config.reconciliation.since_days,
        );
        tokio::spawn(scheduler.run());
    }

    let state = ReconciliationState {
        engine,
        lock,
        default_since_days: config.reconciliation.since_days,
    };
    let app = with_reconciliation_routes(state)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, scheduler = args.with_scheduler, "hps reconciliation service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
