//! 浏览器端绑定
//!
//! 在页面内直接运行同一条处理管线：JS 侧负责采集、关键点检测与 `fetch`，
//! 每帧调用 `tick`，若返回结果中含 `dispatch` 则由 JS 发送，
//! 响应的 `status` 连同 token 回传 `handleResponse`，返回 true 时播放告警。

use wasm_bindgen::prelude::*;

use crate::geometry::{FrameInput, LandmarkFrame, Point};
use crate::reporting::ScoreStatus;
use crate::session::{AlertDecision, InitFailure, PipelineConfig, SessionMachine, SessionToken};

/// 扁平坐标数组 `[x0, y0, x1, y1, ...]` 转为点序列；奇数长度时忽略末尾
fn points_from_flat(flat: &[f64]) -> Vec<Point> {
    flat.chunks_exact(2).map(|xy| Point::new(xy[0], xy[1])).collect()
}

#[wasm_bindgen]
pub struct WasmSession {
    machine: SessionMachine,
}

#[wasm_bindgen]
impl WasmSession {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            machine: SessionMachine::new(PipelineConfig::default()),
        }
    }

    /// 开始新会话，返回 token；当前会话仍在进行时抛出错误
    pub fn start(&mut self) -> Result<f64, JsError> {
        let token = self.machine.start()?;
        Ok(token.0 as f64)
    }

    #[wasm_bindgen(js_name = "captureReady")]
    pub fn capture_ready(&mut self, now: f64) -> Result<(), JsError> {
        self.machine.capture_ready(now)?;
        Ok(())
    }

    /// `permission_denied` 为 true 时进入 Denied，否则进入 Error
    pub fn fail(&mut self, permission_denied: bool, message: String) -> Result<(), JsError> {
        let failure = if permission_denied {
            InitFailure::PermissionDenied
        } else {
            InitFailure::Initialization(message)
        };
        self.machine.fail(failure)?;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.machine.stop();
    }

    /// 处理一帧
    ///
    /// `landmarks` 为归一化坐标的扁平数组，空数组表示本帧未检测到人脸。
    pub fn tick(&mut self, landmarks: &[f64], width: f64, height: f64, now: f64) -> Result<JsValue, JsError> {
        let input = if landmarks.is_empty() {
            FrameInput::NoFace { timestamp: now }
        } else {
            FrameInput::Face(LandmarkFrame::from_normalized(
                points_from_flat(landmarks),
                width,
                height,
                now,
            ))
        };
        let outcome = self.machine.tick(input);
        Ok(serde_wasm_bindgen::to_value(&outcome)?)
    }

    /// 回传评分响应，返回 true 表示应播放告警
    #[wasm_bindgen(js_name = "handleResponse")]
    pub fn handle_response(&mut self, token: f64, status: &str, now: f64) -> bool {
        let token = SessionToken(token as u64);
        let decision = self
            .machine
            .handle_response(token, ScoreStatus::from_wire(status), now);
        decision == AlertDecision::Fire
    }

    pub fn phase(&self) -> String {
        self.machine.phase().as_str().to_string()
    }

    pub fn snapshot(&self) -> Result<JsValue, JsError> {
        Ok(serde_wasm_bindgen::to_value(&self.machine.snapshot())?)
    }
}

impl Default for WasmSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_coordinates_pair_up() {
        let points = points_from_flat(&[0.1, 0.2, 0.3, 0.4, 0.9]);
        assert_eq!(points, vec![Point::new(0.1, 0.2), Point::new(0.3, 0.4)]);
    }

    #[test]
    fn lifecycle_without_js_values() {
        let mut session = WasmSession::new();
        assert_eq!(session.phase(), "idle");
        assert!(session.start().is_ok());
        assert!(session.capture_ready(0.0).is_ok());
        assert_eq!(session.phase(), "calibrating_open");
        assert!(!session.handle_response(99.0, "alert", 0.0));
        session.stop();
        assert_eq!(session.phase(), "idle");
    }
}
