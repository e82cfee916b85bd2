use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sysinfo::System;

use crate::state::AppState;

#[derive(Serialize)]
pub struct StatusResponse {
    uptime_seconds: u64,
    process_rss_mb: f64,
    total_mem_mb: f64,
    cpu_usage_percent: f32,
}

/// `GET /api/v1/status` — uptime, memory, CPU.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let mut sys = System::new_all();
    sys.refresh_all();
    let pid = sysinfo::get_current_pid().ok();
    let (rss_bytes, cpu) = pid
        .and_then(|pid| sys.process(pid))
        .map(|p| (p.memory(), p.cpu_usage()))
        .unwrap_or((0, 0.0));

    Json(StatusResponse {
        uptime_seconds: state.metrics.uptime_seconds(),
        process_rss_mb: (rss_bytes as f64) / (1024.0 * 1024.0),
        total_mem_mb: (sys.total_memory() as f64) / (1024.0 * 1024.0),
        cpu_usage_percent: cpu,
    })
}
