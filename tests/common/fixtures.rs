use axum::Router;
use serde_json::{json, Value};

use fatigue_core::geometry::{
    LEFT_EYE, MOUTH_BOTTOM, MOUTH_LEFT, MOUTH_RIGHT, MOUTH_TOP, RIGHT_EYE,
};

use super::http::post_json;

pub const FRAME_WIDTH: f64 = 640.0;
pub const FRAME_HEIGHT: f64 = 480.0;

/// FaceMesh 含虹膜时输出 478 个点
const MESH_POINTS: usize = 478;

/// 生成一帧归一化关键点：双眼 EAR 相同，张嘴比为 0.3，头部水平
pub fn face_landmarks(ear: f64) -> Vec<[f64; 2]> {
    let mut px = vec![[320.0, 240.0]; MESH_POINTS];
    place_eye(&mut px, &LEFT_EYE, 250.0, 200.0, ear);
    place_eye(&mut px, &RIGHT_EYE, 350.0, 200.0, ear);
    px[MOUTH_LEFT] = [300.0, 320.0];
    px[MOUTH_RIGHT] = [340.0, 320.0];
    px[MOUTH_TOP] = [320.0, 314.0];
    px[MOUTH_BOTTOM] = [320.0, 326.0];
    px.into_iter()
        .map(|[x, y]| [x / FRAME_WIDTH, y / FRAME_HEIGHT])
        .collect()
}

fn place_eye(px: &mut [[f64; 2]], idx: &[usize; 6], x0: f64, y0: f64, ear: f64) {
    let width = 40.0;
    let half = ear * width / 2.0;
    px[idx[0]] = [x0, y0];
    px[idx[3]] = [x0 + width, y0];
    px[idx[1]] = [x0 + 13.0, y0 - half];
    px[idx[5]] = [x0 + 13.0, y0 + half];
    px[idx[2]] = [x0 + 27.0, y0 - half];
    px[idx[4]] = [x0 + 27.0, y0 + half];
}

pub fn face_frame(ear: f64) -> Value {
    json!({
        "landmarks": face_landmarks(ear),
        "width": FRAME_WIDTH,
        "height": FRAME_HEIGHT,
    })
}

pub fn empty_frame() -> Value {
    json!({ "landmarks": null, "width": FRAME_WIDTH, "height": FRAME_HEIGHT })
}

pub async fn send_frame(app: &Router, ear: f64) -> Value {
    let (status, body) = post_json(app, "/api/session/frames", face_frame(ear)).await;
    assert!(status.is_success(), "frame rejected: {body}");
    body["data"].clone()
}

/// start → ready → 睁眼 / 闭眼各 3 帧，进入 running
pub async fn calibrate(app: &Router) {
    let (status, body) = super::http::post_empty(app, "/api/session/start").await;
    assert!(status.is_success(), "start failed: {body}");
    let (status, body) = super::http::post_empty(app, "/api/session/ready").await;
    assert!(status.is_success(), "ready failed: {body}");
    for _ in 0..3 {
        send_frame(app, 0.30).await;
    }
    for _ in 0..3 {
        send_frame(app, 0.08).await;
    }
}
