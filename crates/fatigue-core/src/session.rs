//! 会话阶段状态机
//!
//! ```text
//! Idle -> Requesting -> CalibratingOpen -> CalibratingClosed -> Running
//!            |
//!            +-> Denied / Error   （新的 start 回到 Requesting）
//! 任意阶段 --stop--> Idle
//! ```
//!
//! 每个会话的全部可变状态（滤波器、校准缓冲、阈值、眨眼状态、区间聚合、告警去抖）
//! 都归属于一个 [`Session`] 值，由状态机独占；`stop` 时整体丢弃。
//!
//! `tick` 由外部驱动（采集回调、定时器或测试脚本）逐帧同步调用。
//! 上报以 [`Dispatch`] 形式交还宿主异步执行，响应携带 [`SessionToken`] 回传，
//! 会话已结束时的迟到响应会被识别为 [`AlertDecision::Stale`] 并忽略。

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blink::{BlinkDetector, BlinkEvent};
use crate::calibration::{CalibrationBuffer, CalibrationConfig, CalibrationWindow, EyeTarget, Thresholds};
use crate::geometry::{self, FrameInput, GeometrySample};
use crate::reporting::{
    AlertDebounce, DispatchCadence, IntervalAggregate, ScoreStatus, TelemetryReport,
    DEFAULT_ALERT_GAP_MS, DEFAULT_DISPATCH_INTERVAL_MS,
};
use crate::smoothing::{EmaFilter, DEFAULT_EMA_ALPHA};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub calibration: CalibrationConfig,
    pub ema_alpha: f64,
    pub dispatch_interval_ms: f64,
    pub alert_gap_ms: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationConfig::default(),
            ema_alpha: DEFAULT_EMA_ALPHA,
            dispatch_interval_ms: DEFAULT_DISPATCH_INTERVAL_MS,
            alert_gap_ms: DEFAULT_ALERT_GAP_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Requesting,
    CalibratingOpen,
    CalibratingClosed,
    Running,
    Denied,
    Error,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::CalibratingOpen => "calibrating_open",
            Self::CalibratingClosed => "calibrating_closed",
            Self::Running => "running",
            Self::Denied => "denied",
            Self::Error => "error",
        }
    }

    /// 可以接受新的 start 指令
    pub fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Denied | Self::Error)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 会话存活令牌，每次 start 递增
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub u64);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 采集/模型初始化失败的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitFailure {
    PermissionDenied,
    Initialization(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session already active (phase: {0})")]
    AlreadyActive(SessionPhase),
    #[error("cannot {action} in phase {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: SessionPhase,
    },
}

/// 一次待发送的上报
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispatch {
    pub token: SessionToken,
    pub report: TelemetryReport,
    pub issued_at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertDecision {
    /// 应触发告警
    Fire,
    /// 距上次告警过近，被抑制
    Debounced,
    /// 非告警状态
    NoAlert,
    /// 令牌不属于当前会话，响应作废
    Stale,
}

/// 单帧处理结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickOutcome {
    pub phase: SessionPhase,
    pub sample: Option<GeometrySample>,
    pub smoothed_ear: Option<f64>,
    pub blink: Option<BlinkEvent>,
    pub dispatch: Option<Dispatch>,
    pub advanced_to: Option<SessionPhase>,
}

impl TickOutcome {
    fn empty(phase: SessionPhase) -> Self {
        Self {
            phase,
            sample: None,
            smoothed_ear: None,
            blink: None,
            dispatch: None,
            advanced_to: None,
        }
    }
}

/// 供 UI 展示的会话快照
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub token: Option<SessionToken>,
    pub open_samples: usize,
    pub closed_samples: usize,
    pub face_detected: bool,
    pub current_ear: Option<f64>,
    pub thresholds: Option<Thresholds>,
    pub interval_blinks: u32,
    pub total_blinks: u64,
    pub last_dispatch_at: Option<f64>,
    pub failure: Option<String>,
}

/// 单个监测会话的全部状态
#[derive(Debug)]
struct Session {
    token: SessionToken,
    filter: EmaFilter,
    /// 阈值算出后置为 None
    calibration: Option<CalibrationBuffer>,
    window: CalibrationWindow,
    thresholds: Option<Thresholds>,
    blink: BlinkDetector,
    aggregate: IntervalAggregate,
    cadence: DispatchCadence,
    debounce: AlertDebounce,
    face_detected: bool,
}

impl Session {
    fn new(token: SessionToken, config: &PipelineConfig, now: f64) -> Self {
        Self {
            token,
            filter: EmaFilter::new(config.ema_alpha),
            calibration: Some(CalibrationBuffer::new()),
            window: CalibrationWindow::start(now),
            thresholds: None,
            blink: BlinkDetector::new(),
            aggregate: IntervalAggregate::new(),
            cadence: DispatchCadence::new(config.dispatch_interval_ms),
            debounce: AlertDebounce::new(config.alert_gap_ms),
            face_detected: false,
        }
    }

    fn collected(&self, target: EyeTarget) -> usize {
        self.calibration.as_ref().map_or(0, |buffer| buffer.len(target))
    }

    fn process(&mut self, phase: SessionPhase, sample: GeometrySample, now: f64, outcome: &mut TickOutcome) {
        let ear = self.filter.update(sample.ear_avg);
        outcome.sample = Some(sample);
        outcome.smoothed_ear = Some(ear);

        match phase {
            SessionPhase::CalibratingOpen | SessionPhase::CalibratingClosed => {
                let target = if phase == SessionPhase::CalibratingOpen {
                    EyeTarget::Open
                } else {
                    EyeTarget::Closed
                };
                if let Some(buffer) = self.calibration.as_mut() {
                    buffer.push(target, ear);
                }
            }
            SessionPhase::Running => {
                let Some(thresholds) = self.thresholds else {
                    return;
                };
                self.aggregate.record_sample(ear, &sample, now);
                if let Some(event) = self.blink.update(ear, &thresholds, now) {
                    self.aggregate.record_blink();
                    tracing::debug!(
                        session = %self.token,
                        duration_ms = event.duration_ms,
                        total = self.aggregate.total_blinks,
                        "blink detected"
                    );
                    outcome.blink = Some(event);
                }
                if self.cadence.is_due(now) {
                    self.cadence.mark(now);
                    let report = self.aggregate.take_report(now);
                    outcome.dispatch = Some(Dispatch {
                        token: self.token,
                        report,
                        issued_at: now,
                    });
                }
            }
            _ => {}
        }
    }
}

pub struct SessionMachine {
    config: PipelineConfig,
    phase: SessionPhase,
    /// Requesting 及之后的阶段持有；Denied/Error/Idle 时为 None
    token: Option<SessionToken>,
    /// 仅在校准与运行阶段存在
    session: Option<Session>,
    next_token: u64,
    failure: Option<String>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl SessionMachine {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            phase: SessionPhase::Idle,
            token: None,
            session: None,
            next_token: 1,
            failure: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn token(&self) -> Option<SessionToken> {
        self.token
    }

    pub fn thresholds(&self) -> Option<Thresholds> {
        self.session.as_ref().and_then(|s| s.thresholds)
    }

    /// 开始新会话：Idle / Denied / Error -> Requesting
    pub fn start(&mut self) -> Result<SessionToken, SessionError> {
        if !self.phase.can_start() {
            return Err(SessionError::AlreadyActive(self.phase));
        }
        let token = SessionToken(self.next_token);
        self.next_token += 1;
        self.token = Some(token);
        self.session = None;
        self.failure = None;
        self.phase = SessionPhase::Requesting;
        tracing::info!(session = %token, "session requesting capture");
        Ok(token)
    }

    /// 采集与模型就绪：Requesting -> CalibratingOpen，分配全新的会话状态
    pub fn capture_ready(&mut self, now: f64) -> Result<(), SessionError> {
        let Some(token) = self.token.filter(|_| self.phase == SessionPhase::Requesting) else {
            return Err(SessionError::InvalidTransition {
                action: "mark capture ready",
                phase: self.phase,
            });
        };
        self.session = Some(Session::new(token, &self.config, now));
        self.phase = SessionPhase::CalibratingOpen;
        tracing::info!(session = %token, "calibration started: keep eyes open");
        Ok(())
    }

    /// 初始化失败：Requesting -> Denied / Error
    pub fn fail(&mut self, failure: InitFailure) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Requesting {
            return Err(SessionError::InvalidTransition {
                action: "report initialization failure",
                phase: self.phase,
            });
        }
        let (phase, message) = match failure {
            InitFailure::PermissionDenied => (SessionPhase::Denied, "capture permission denied".to_string()),
            InitFailure::Initialization(message) => (SessionPhase::Error, message),
        };
        tracing::warn!(session = ?self.token, phase = %phase, reason = %message, "session initialization failed");
        self.token = None;
        self.session = None;
        self.failure = Some(message);
        self.phase = phase;
        Ok(())
    }

    /// 结束会话并释放全部会话状态；在 Idle 中调用为空操作
    pub fn stop(&mut self) {
        if self.phase == SessionPhase::Idle {
            return;
        }
        tracing::info!(session = ?self.token, phase = %self.phase, "session stopped");
        self.token = None;
        self.session = None;
        self.failure = None;
        self.phase = SessionPhase::Idle;
    }

    /// 处理一帧
    ///
    /// 无人脸的帧不产生样本、不改变会话状态，但仍参与阶段计时判断。
    pub fn tick(&mut self, input: FrameInput) -> TickOutcome {
        let now = input.timestamp();
        let phase = self.phase;
        let mut outcome = TickOutcome::empty(phase);
        let Some(session) = self.session.as_mut() else {
            return outcome;
        };

        match input {
            FrameInput::NoFace { .. } => session.face_detected = false,
            FrameInput::Face(frame) => {
                session.face_detected = true;
                match geometry::extract(&frame) {
                    Ok(sample) => session.process(phase, sample, now, &mut outcome),
                    Err(err) => tracing::debug!(session = %session.token, error = %err, "frame dropped"),
                }
            }
        }

        outcome.advanced_to = self.advance(now);
        outcome.phase = self.phase;
        outcome
    }

    fn advance(&mut self, now: f64) -> Option<SessionPhase> {
        let session = self.session.as_mut()?;
        let calibration = &self.config.calibration;
        match self.phase {
            SessionPhase::CalibratingOpen => {
                let collected = session.collected(EyeTarget::Open);
                if !session.window.is_complete(now, collected, calibration) {
                    return None;
                }
                session.window = CalibrationWindow::start(now);
                self.phase = SessionPhase::CalibratingClosed;
                tracing::info!(session = %session.token, samples = collected, "calibration: close eyes");
            }
            SessionPhase::CalibratingClosed => {
                let collected = session.collected(EyeTarget::Closed);
                if !session.window.is_complete(now, collected, calibration) {
                    return None;
                }
                let buffer = session.calibration.take().unwrap_or_default();
                let thresholds = buffer.into_thresholds(calibration);
                if thresholds.is_inverted() {
                    tracing::warn!(
                        session = %session.token,
                        low = thresholds.low,
                        high = thresholds.high,
                        "calibrated thresholds are inverted"
                    );
                }
                session.thresholds = Some(thresholds);
                self.phase = SessionPhase::Running;
                tracing::info!(
                    session = %session.token,
                    low = thresholds.low,
                    high = thresholds.high,
                    "calibration complete, monitoring"
                );
            }
            _ => return None,
        }
        Some(self.phase)
    }

    /// 处理评分服务响应（可能晚到或乱序）
    pub fn handle_response(&mut self, token: SessionToken, status: ScoreStatus, now: f64) -> AlertDecision {
        let session = match self.session.as_mut() {
            Some(session) if self.token == Some(token) => session,
            _ => {
                tracing::debug!(session = %token, "ignoring response for finished session");
                return AlertDecision::Stale;
            }
        };
        match status {
            ScoreStatus::Normal => AlertDecision::NoAlert,
            ScoreStatus::Alert if session.debounce.try_fire(now) => AlertDecision::Fire,
            ScoreStatus::Alert => AlertDecision::Debounced,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.session.as_ref();
        SessionSnapshot {
            phase: self.phase,
            token: self.token,
            open_samples: session.map_or(0, |s| s.collected(EyeTarget::Open)),
            closed_samples: session.map_or(0, |s| s.collected(EyeTarget::Closed)),
            face_detected: session.is_some_and(|s| s.face_detected),
            current_ear: session.and_then(|s| s.filter.value()),
            thresholds: session.and_then(|s| s.thresholds),
            interval_blinks: session.map_or(0, |s| s.aggregate.interval_blinks),
            total_blinks: session.map_or(0, |s| s.aggregate.total_blinks),
            last_dispatch_at: session.and_then(|s| s.cadence.last_dispatch()),
            failure: self.failure.clone(),
        }
    }
}
