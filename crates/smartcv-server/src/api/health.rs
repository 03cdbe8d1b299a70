use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use smartcv_core::MemoryGovernor;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub kv: &'static str,
    pub memory: &'static str,
}

/// `GET /health` (C11). Composes the database, KV, and process-memory checks
/// the worker fabric also consults before accepting new jobs.
pub async fn handle(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match state.db.health_check().await {
        Ok(()) => "ok",
        Err(_) => "unreachable",
    };

    let kv = match state.session_kv.ping().await {
        Ok(()) => "ok",
        Err(_) => "unreachable",
    };

    let memory_healthy = MemoryGovernor::sample_rss_bytes()
        .map(|rss| rss < 3 * 1024 * 1024 * 1024)
        .unwrap_or(true);
    let memory = if memory_healthy { "ok" } else { "elevated" };

    let healthy = database == "ok" && kv == "ok" && memory == "ok";
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "degraded" },
            version: env!("CARGO_PKG_VERSION"),
            database,
            kv,
            memory,
        }),
    )
}
