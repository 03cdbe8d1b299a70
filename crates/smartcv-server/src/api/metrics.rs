use axum::Json;
use axum::extract::State;
use serde::Serialize;
use smartcv_core::{MemoryGovernor, QueueName, mask_identifier};

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    version: &'static str,
    uptime_hint: &'static str,
    rss_bytes: Option<u64>,
    db_pool: PoolSnapshot,
    queues: Vec<QueueCounters>,
}

#[derive(Debug, Serialize)]
struct PoolSnapshot {
    max_connections: u32,
    active: u32,
    idle: u32,
    waiting: u32,
}

#[derive(Debug, Serialize)]
struct QueueCounters {
    queue: &'static str,
    queued: i64,
    running: i64,
    completed: i64,
    failed: i64,
}

/// `GET /api/metrics` (C11). Process-level figures: memory, DB pool saturation,
/// and queue depths, the way `ThroughputCounter::log_summary` reports per-worker
/// numbers but aggregated across the whole fleet for an operator dashboard.
pub async fn handle(State(state): State<AppState>) -> Json<MetricsResponse> {
    let pool = state.db.pool_status();
    let mut queues = Vec::with_capacity(QueueName::ALL.len());
    for queue in QueueName::ALL {
        if let Ok(depth) = state.queue.depth(queue).await {
            queues.push(QueueCounters {
                queue: queue.as_str(),
                queued: depth.queued,
                running: depth.running,
                completed: depth.completed,
                failed: depth.failed,
            });
        }
    }

    Json(MetricsResponse {
        version: env!("CARGO_PKG_VERSION"),
        uptime_hint: "see process start time in orchestration metadata",
        rss_bytes: MemoryGovernor::sample_rss_bytes(),
        db_pool: PoolSnapshot {
            max_connections: pool.max_connections,
            active: pool.active,
            idle: pool.idle,
            waiting: pool.waiting,
        },
        queues,
    })
}

#[derive(Debug, Serialize)]
pub struct QueueStatsResponse {
    queues: Vec<QueueStatsEntry>,
}

#[derive(Debug, Serialize)]
struct QueueStatsEntry {
    queue: &'static str,
    queued: i64,
    running: i64,
    completed: i64,
    failed: i64,
    active_sample: Vec<ActiveJobSnapshot>,
}

#[derive(Debug, Serialize)]
struct ActiveJobSnapshot {
    job_id: String,
    job_type: String,
    masked_identifier: String,
}

const ACTIVE_SAMPLE_SIZE: u32 = 5;

/// `GET /api/queue/stats` (C11). Per-queue waiting/active/completed/failed counts
/// plus a snapshot of the first five active jobs, with any phone-number-shaped
/// payload field hashed the same way `AdminNotifier` masks applicant identifiers.
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStatsResponse> {
    let mut queues = Vec::with_capacity(QueueName::ALL.len());
    for queue in QueueName::ALL {
        let depth = state.queue.depth(queue).await.unwrap_or(smartcv_core::QueueDepth {
            queue,
            queued: 0,
            running: 0,
            completed: 0,
            failed: 0,
        });
        let running = state.queue.sample_running(queue, ACTIVE_SAMPLE_SIZE).await.unwrap_or_default();
        let active_sample = running
            .into_iter()
            .map(|job| {
                let identifier = job
                    .payload
                    .get("phone_number")
                    .and_then(|value| value.as_str())
                    .unwrap_or(&job.id);
                ActiveJobSnapshot {
                    job_id: job.id.clone(),
                    job_type: job.job_type.clone(),
                    masked_identifier: mask_identifier(identifier, &state.ip_salt),
                }
            })
            .collect();

        queues.push(QueueStatsEntry {
            queue: queue.as_str(),
            queued: depth.queued,
            running: depth.running,
            completed: depth.completed,
            failed: depth.failed,
            active_sample,
        });
    }

    Json(QueueStatsResponse { queues })
}
