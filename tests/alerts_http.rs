mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use fatigue_core::{SessionToken, TelemetryReport};
use fatigue_monitor::monitor::alerts::{AlertEvent, AlertSink};
use http_body_util::BodyExt;
use serde_json::{json, Value};

use common::app::{serve_stub, spawn_with_config, test_config};
use common::fixtures::{calibrate, send_frame};
use common::http::{get_json, post_empty, request};

fn scoring_stub(status: &'static str, delay: Duration, hits: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/predict",
        post(move |Json(_report): Json<Value>| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Json(json!({ "status": status }))
            }
        }),
    )
}

#[tokio::test]
async fn it_alert_response_reaches_subscribers() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = serve_stub(scoring_stub("alert", Duration::ZERO, hits.clone())).await;
    let app = spawn_with_config(test_config(Some(format!("http://{addr}/predict"))));
    let mut alerts = app.state.alerts().subscribe();

    calibrate(&app.app).await;
    let tick = send_frame(&app.app, 0.30).await;
    let token = tick["dispatch"]["token"].as_u64().expect("dispatch token");

    let event = tokio::time::timeout(Duration::from_secs(5), alerts.recv())
        .await
        .expect("alert within timeout")
        .expect("alert received");
    assert_eq!(event.session.0, token);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let (_, body) = get_json(&app.app, "/api/session").await;
    assert!(body["data"]["lastSentAt"].is_string());
    assert_eq!(body["data"]["scoringEnabled"], true);
}

#[tokio::test]
async fn it_normal_response_raises_nothing() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = serve_stub(scoring_stub("normal", Duration::ZERO, hits.clone())).await;
    let app = spawn_with_config(test_config(Some(format!("http://{addr}/predict"))));
    let mut alerts = app.state.alerts().subscribe();

    calibrate(&app.app).await;
    send_frame(&app.app, 0.30).await;

    let waited = tokio::time::timeout(Duration::from_millis(500), alerts.recv()).await;
    assert!(waited.is_err(), "normal status must not alert");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn it_response_after_stop_is_discarded() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = serve_stub(scoring_stub("alert", Duration::from_millis(300), hits.clone())).await;
    let app = spawn_with_config(test_config(Some(format!("http://{addr}/predict"))));
    let mut alerts = app.state.alerts().subscribe();

    calibrate(&app.app).await;
    send_frame(&app.app, 0.30).await;
    post_empty(&app.app, "/api/session/stop").await;

    let waited = tokio::time::timeout(Duration::from_millis(1200), alerts.recv()).await;
    assert!(waited.is_err(), "late response for a stopped session must not alert");

    let (_, body) = get_json(&app.app, "/api/session").await;
    assert_eq!(body["data"]["phase"], "idle");
    assert_eq!(body["data"]["lastSentAt"], Value::Null);
}

#[tokio::test]
async fn it_scoring_outage_does_not_break_frames() {
    // 绑定后释放端口，评分请求会被拒绝连接
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let mut config = test_config(Some(format!("http://{addr}/predict")));
    config.pipeline.dispatch_interval_ms = 0.0;
    let app = spawn_with_config(config);

    calibrate(&app.app).await;
    for _ in 0..5 {
        let tick = send_frame(&app.app, 0.30).await;
        assert!(tick["dispatch"].is_object());
    }
    let (_, body) = get_json(&app.app, "/api/session").await;
    assert_eq!(body["data"]["phase"], "running");
}

#[tokio::test]
async fn it_sse_endpoint_streams_events() {
    let app = spawn_with_config(test_config(None));
    let response = request(&app.app, Method::GET, "/api/session/events", None, &[]).await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert!(content_type.contains("text/event-stream"));

    // 处理器返回时已完成订阅，此时发出的告警必须出现在流中
    app.state.alerts().alert(AlertEvent {
        session: SessionToken(7),
        raised_at: Utc::now(),
        report: TelemetryReport {
            eye_ratio: 0.18,
            blink_count: 9,
            head_tilt: 4.0,
            yawn_ratio: 0.6,
        },
    });

    let mut body = response.into_body();
    let mut received = String::new();
    while !received.contains("\n\n") {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("sse frame within timeout")
            .expect("stream still open")
            .expect("frame ok");
        if let Ok(data) = frame.into_data() {
            received.push_str(&String::from_utf8_lossy(&data));
        }
    }
    assert!(received.contains("event: alert"), "got: {received}");
    assert!(received.contains("\"blink_count\":9"), "got: {received}");
}

#[tokio::test]
async fn it_scoring_health_reports_reachability() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = serve_stub(scoring_stub("normal", Duration::ZERO, hits.clone())).await;
    let app = spawn_with_config(test_config(Some(format!("http://{addr}/predict"))));

    let (status, body) = get_json(&app.app, "/health/scoring").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], true);
    assert_eq!(body["reachable"], true);
    assert_eq!(body["status"], 405);
    // 探测用 GET，不会触发评分
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn it_scoring_health_flags_outage_and_disabled() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let app = spawn_with_config(test_config(Some(format!("http://{addr}/predict"))));
    let (_, body) = get_json(&app.app, "/health/scoring").await;
    assert_eq!(body["reachable"], false);
    assert!(body["error"].is_string());

    let app = spawn_with_config(test_config(None));
    let (status, body) = get_json(&app.app, "/health/scoring").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], false);
    assert_eq!(body["reachable"], Value::Null);
}

#[tokio::test]
async fn it_health_reports_session_and_scoring() {
    let app = spawn_with_config(test_config(None));

    let live = request(&app.app, Method::GET, "/health/live", None, &[]).await;
    assert_eq!(live.status(), StatusCode::OK);
    let ready = request(&app.app, Method::GET, "/health/ready", None, &[]).await;
    assert_eq!(ready.status(), StatusCode::OK);

    let (status, body) = get_json(&app.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["session"]["phase"], "idle");
    assert_eq!(body["scoring"]["enabled"], false);
}
