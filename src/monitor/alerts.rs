use chrono::{DateTime, Utc};
use fatigue_core::{SessionToken, TelemetryReport};
use serde::Serialize;
use tokio::sync::broadcast;

/// 一次已通过去抖的疲劳告警
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub session: SessionToken,
    pub raised_at: DateTime<Utc>,
    /// 触发该告警的那次上报
    pub report: TelemetryReport,
}

/// 告警副作用（声音/界面提示）的出口；只决定“何时”，不关心如何呈现
pub trait AlertSink: Send + Sync {
    fn alert(&self, event: AlertEvent);
}

/// 通过广播通道把告警推送给所有 SSE 订阅者
#[derive(Debug, Clone)]
pub struct BroadcastAlertSink {
    tx: broadcast::Sender<AlertEvent>,
}

impl BroadcastAlertSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl AlertSink for BroadcastAlertSink {
    fn alert(&self, event: AlertEvent) {
        tracing::warn!(
            session = %event.session,
            eye_ratio = event.report.eye_ratio,
            blink_count = event.report.blink_count,
            "fatigue alert raised"
        );
        // 没有订阅者时发送失败，告警只记录日志
        if self.tx.send(event).is_err() {
            tracing::debug!("no alert subscribers connected");
        }
    }
}
