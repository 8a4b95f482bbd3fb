use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use fatigue_core::{InitFailure, Point, SessionToken, TickOutcome};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::extractors::JsonBody;
use crate::monitor::MonitorSnapshot;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(snapshot))
        .route("/start", post(start))
        .route("/ready", post(ready))
        .route("/fail", post(fail))
        .route("/stop", post(stop))
        .route("/frames", post(frames))
        .route("/events", get(events))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    token: SessionToken,
    session: MonitorSnapshot,
}

pub async fn start(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let token = state.monitor().start().await?;
    let session = state.monitor().snapshot().await;
    Ok(ok(StartResponse { token, session }))
}

pub async fn ready(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.monitor().capture_ready().await?;
    Ok(ok(state.monitor().snapshot().await))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    PermissionDenied,
    Initialization,
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub reason: FailReason,
    #[serde(default)]
    pub message: Option<String>,
}

pub async fn fail(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<FailRequest>,
) -> Result<impl IntoResponse, AppError> {
    let failure = match req.reason {
        FailReason::PermissionDenied => InitFailure::PermissionDenied,
        FailReason::Initialization => InitFailure::Initialization(
            req.message.unwrap_or_else(|| "capture initialization failed".to_string()),
        ),
    };
    state.monitor().fail(failure).await?;
    Ok(ok(state.monitor().snapshot().await))
}

pub async fn stop(State(state): State<AppState>) -> impl IntoResponse {
    state.monitor().stop().await;
    ok(state.monitor().snapshot().await)
}

pub async fn snapshot(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.monitor().snapshot().await)
}

/// 一帧关键点；`landmarks` 为检测模型输出的归一化 `[x, y]`，`null` 表示无人脸
#[derive(Debug, Deserialize)]
pub struct FrameRequest {
    #[serde(default)]
    pub landmarks: Option<Vec<[f64; 2]>>,
    pub width: f64,
    pub height: f64,
}

pub async fn frames(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<FrameRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !(req.width.is_finite() && req.width > 0.0 && req.height.is_finite() && req.height > 0.0) {
        return Err(AppError::bad_request("INVALID_FRAME", "帧宽高必须为正数"));
    }
    let landmarks = req
        .landmarks
        .map(|points| points.into_iter().map(|[x, y]| Point::new(x, y)).collect());
    let outcome: TickOutcome = state.monitor().process_frame(landmarks, req.width, req.height).await;
    Ok(ok(outcome))
}

/// 告警事件流；停机时结束
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut alerts = state.alerts().subscribe();
    let mut shutdown_rx = state.shutdown_rx();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                received = alerts.recv() => match received {
                    Ok(alert) => {
                        if let Ok(json) = serde_json::to_string(&alert) {
                            yield Ok(Event::default().event("alert").data(json));
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "alert subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown_rx.recv() => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}
