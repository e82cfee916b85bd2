use axum::extract::State;

use crate::state::AppState;

/// `GET /api/v1/metrics` — Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render_prometheus()
}
