use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::repository::{NotificationSender, RecordStore};
use super::service::{ReconciliationEngine, ReconciliationReport, RunKind, RunLock};
use crate::mailbox::MailboxGateway;

/// Shared state behind the on-demand reconciliation endpoints.
pub struct ReconciliationState<M, S, N> {
    pub engine: Arc<ReconciliationEngine<M, S, N>>,
    pub lock: RunLock,
    pub default_since_days: u32,
}

impl<M, S, N> Clone for ReconciliationState<M, S, N> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            lock: self.lock.clone(),
            default_since_days: self.default_since_days,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RunParams {
    pub since_days: Option<u32>,
}

/// Router builder exposing the administrative reconciliation triggers.
pub fn reconciliation_router<M, S, N>(state: ReconciliationState<M, S, N>) -> Router
where
    M: MailboxGateway + 'static,
    S: RecordStore + 'static,
    N: NotificationSender + 'static,
{
    Router::new()
        .route("/api/v1/hps/reconciliation", post(reconcile_handler::<M, S, N>))
        .route(
            "/api/v1/hps/reconciliation/attachments",
            post(attachments_handler::<M, S, N>),
        )
        .with_state(state)
}

pub(crate) async fn reconcile_handler<M, S, N>(
    State(state): State<ReconciliationState<M, S, N>>,
    Query(params): Query<RunParams>,
) -> Response
where
    M: MailboxGateway + 'static,
    S: RecordStore + 'static,
    N: NotificationSender + 'static,
{
    run(state, params, RunKind::Messages).await
}

pub(crate) async fn attachments_handler<M, S, N>(
    State(state): State<ReconciliationState<M, S, N>>,
    Query(params): Query<RunParams>,
) -> Response
where
    M: MailboxGateway + 'static,
    S: RecordStore + 'static,
    N: NotificationSender + 'static,
{
    run(state, params, RunKind::Attachments).await
}

async fn run<M, S, N>(
    state: ReconciliationState<M, S, N>,
    params: RunParams,
    kind: RunKind,
) -> Response
where
    M: MailboxGateway + 'static,
    S: RecordStore + 'static,
    N: NotificationSender + 'static,
{
    let Some(permit) = state.lock.try_acquire() else {
        let payload = json!({
            "error": "a reconciliation run is already in progress",
        });
        return (StatusCode::CONFLICT, axum::Json(payload)).into_response();
    };

    let since_days = params.since_days.unwrap_or(state.default_since_days);
    let engine = Arc::clone(&state.engine);
    // The mailbox client blocks on its own runtime.
    let outcome = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        engine.run(kind, since_days)
    })
    .await;

    match outcome {
        Ok(report) => report_response(report),
        Err(err) => {
            error!(error = %err, "reconciliation task did not complete");
            let payload = json!({
                "error": "reconciliation task did not complete",
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

fn report_response(report: ReconciliationReport) -> Response {
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, axum::Json(report)).into_response()
}
