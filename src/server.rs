//! HTTP trigger for batch runs

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::orchestrator::{Orchestrator, RunReport};

/// Something that can execute one batch run under a given ID
#[async_trait]
pub trait BatchRunner: Send + Sync + 'static {
    async fn run_batch(&self, run_id: Uuid) -> Result<RunReport>;
}

#[async_trait]
impl BatchRunner for Orchestrator {
    async fn run_batch(&self, run_id: Uuid) -> Result<RunReport> {
        self.run_as(run_id, None).await
    }
}

#[derive(Clone)]
pub struct AppState {
    runner: Arc<dyn BatchRunner>,
    running: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(runner: Arc<dyn BatchRunner>) -> Self {
        Self {
            runner,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Clears the in-progress flag when the run task ends, even by panic
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/start-gmail", get(start_gmail))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Trigger server listening");
    axum::serve(listener, routes(state)).await?;
    Ok(())
}

async fn start_gmail(State(state): State<AppState>) -> impl IntoResponse {
    if state
        .running
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        warn!("Trigger rejected: a run is already in progress");
        return (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"message": "Gmail processing already in progress"})),
        );
    }

    let run_id = Uuid::new_v4();
    let guard = RunningGuard(Arc::clone(&state.running));
    let runner = Arc::clone(&state.runner);

    tokio::spawn(async move {
        let _guard = guard;
        match runner.run_batch(run_id).await {
            Ok(report) => info!(
                %run_id,
                fetched = report.fetched(),
                replied = report.replied(),
                "Triggered run finished"
            ),
            Err(e) => error!(%run_id, "Triggered run failed: {}", e),
        }
    });

    info!(%run_id, "Gmail processing started");
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Gmail processing started",
            "run_id": run_id.to_string(),
        })),
    )
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "running": state.is_running(),
    }))
}
