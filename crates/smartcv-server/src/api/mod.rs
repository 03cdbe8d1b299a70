//! HTTP API handlers for operational visibility.
//!
//! - `/health` — liveness/readiness composed from the DB, KV, and memory probes.
//! - `/api/metrics` — process-level figures for an operator dashboard.
//! - `/api/queue/stats` — per-queue depth and an active-job snapshot.

pub mod health;
pub mod metrics;

use axum::Router;
use axum::routing::get;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::handle))
        .route("/api/health", get(health::handle))
        .route("/api/metrics", get(metrics::handle))
        .route("/api/queue/stats", get(metrics::queue_stats))
}
