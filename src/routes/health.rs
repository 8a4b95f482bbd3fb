use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::services::scoring_client::ScoringError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .route("/scoring", get(scoring_health))
}

pub async fn health_check(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    let session = state.monitor().snapshot().await;
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSecs": state.uptime_secs(),
        "session": {
            "phase": session.session.phase,
        },
        "scoring": {
            "enabled": session.scoring_enabled,
        },
        "alertSubscribers": state.alerts().subscriber_count(),
    }))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// 评分服务连通性；关闭评分时不发请求
pub async fn scoring_health(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    match state.scoring().probe().await {
        Ok(probe) => Json(serde_json::json!({
            "enabled": true,
            "url": state.config().scoring.api_url,
            "reachable": probe.reachable,
            "status": probe.status,
            "latencyMs": probe.latency_ms,
            "error": probe.error,
        })),
        Err(ScoringError::Disabled) => Json(serde_json::json!({
            "enabled": false,
            "reachable": null,
        })),
        Err(e) => Json(serde_json::json!({
            "enabled": true,
            "reachable": false,
            "error": e.to_string(),
        })),
    }
}
