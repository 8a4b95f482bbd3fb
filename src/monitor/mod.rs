pub mod alerts;
pub mod clock;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fatigue_core::{
    AlertDecision, Dispatch, FrameInput, InitFailure, LandmarkFrame, PipelineConfig, Point,
    SessionError, SessionMachine, SessionSnapshot, SessionToken, TickOutcome,
};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::services::scoring_client::{ScoringClient, ScoringError};
use alerts::{AlertEvent, AlertSink};
use clock::MonotonicClock;

struct MonitorState {
    machine: SessionMachine,
    /// 最近一次成功收到评分响应的墙钟时间
    last_sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    #[serde(flatten)]
    pub session: SessionSnapshot,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub scoring_enabled: bool,
}

/// 单会话监测驱动
///
/// 持有会话状态机，逐帧同步调用 `tick`（互斥锁保证帧处理不会重叠）；
/// 上报交给独立的 tokio 任务发送，不阻塞帧处理。响应回来时凭 token
/// 检查会话是否仍存活，再决定是否触发告警。
pub struct Monitor {
    state: Arc<Mutex<MonitorState>>,
    clock: MonotonicClock,
    scoring: ScoringClient,
    alerts: Arc<dyn AlertSink>,
}

impl Monitor {
    pub fn new(pipeline: PipelineConfig, scoring: ScoringClient, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MonitorState {
                machine: SessionMachine::new(pipeline),
                last_sent_at: None,
            })),
            clock: MonotonicClock::new(),
            scoring,
            alerts,
        }
    }

    pub async fn start(&self) -> Result<SessionToken, SessionError> {
        let mut state = self.state.lock().await;
        let token = state.machine.start()?;
        state.last_sent_at = None;
        Ok(token)
    }

    pub async fn capture_ready(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now_ms();
        state.machine.capture_ready(now)
    }

    pub async fn fail(&self, failure: InitFailure) -> Result<(), SessionError> {
        self.state.lock().await.machine.fail(failure)
    }

    /// 结束会话；进行中的上报不会被取消，但其响应会因 token 失效而被忽略
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.machine.stop();
        state.last_sent_at = None;
    }

    pub async fn snapshot(&self) -> MonitorSnapshot {
        let state = self.state.lock().await;
        MonitorSnapshot {
            session: state.machine.snapshot(),
            last_sent_at: state.last_sent_at,
            scoring_enabled: self.scoring.is_enabled(),
        }
    }

    /// 处理一帧归一化关键点；`None` 或空列表表示本帧未检测到人脸
    pub async fn process_frame(&self, landmarks: Option<Vec<Point>>, width: f64, height: f64) -> TickOutcome {
        let mut state = self.state.lock().await;
        let now = self.clock.now_ms();
        let input = match landmarks {
            Some(points) if !points.is_empty() => {
                FrameInput::Face(LandmarkFrame::from_normalized(points, width, height, now))
            }
            _ => FrameInput::NoFace { timestamp: now },
        };
        let outcome = state.machine.tick(input);
        drop(state);

        if let Some(advanced) = outcome.advanced_to {
            tracing::info!(phase = %advanced, "session phase advanced");
        }
        if let Some(dispatch) = outcome.dispatch {
            self.dispatch(dispatch);
        }
        outcome
    }

    /// 异步发送一次上报，不阻塞帧处理
    fn dispatch(&self, dispatch: Dispatch) {
        let state = self.state.clone();
        let scoring = self.scoring.clone();
        let alerts = self.alerts.clone();
        let clock = self.clock;

        tokio::spawn(async move {
            let token = dispatch.token;
            let response = match scoring.submit(&dispatch.report).await {
                Ok(response) => response,
                Err(ScoringError::Disabled) => return,
                Err(e) => {
                    // 尽力而为：不重试、不排队，下一个上报周期照常进行
                    tracing::warn!(session = %token, error = %e, "telemetry dispatch failed");
                    return;
                }
            };

            let status = response.score_status();
            let decision = {
                let mut state = state.lock().await;
                let decision = state.machine.handle_response(token, status, clock.now_ms());
                if decision != AlertDecision::Stale {
                    state.last_sent_at = Some(Utc::now());
                }
                decision
            };
            tracing::debug!(session = %token, ?status, ?decision, "scoring response handled");

            if decision == AlertDecision::Fire {
                alerts.alert(AlertEvent {
                    session: token,
                    raised_at: Utc::now(),
                    report: dispatch.report,
                });
            }
        });
    }
}
