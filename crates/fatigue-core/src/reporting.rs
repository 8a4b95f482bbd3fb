//! 区间聚合与上报节奏
//!
//! - `IntervalAggregate`: 每个上报区间的眨眼计数与最近一帧信号
//! - `DispatchCadence`: 固定间隔（默认 3 秒）的上报节奏
//! - `AlertDebounce`: 评分服务返回告警时的去抖（默认 2 秒内只响一次）

use serde::{Deserialize, Serialize};

use crate::geometry::GeometrySample;

pub const DEFAULT_DISPATCH_INTERVAL_MS: f64 = 3000.0;
pub const DEFAULT_ALERT_GAP_MS: f64 = 2000.0;

/// 上报给评分服务的请求体
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    pub eye_ratio: f64,
    pub blink_count: u32,
    pub head_tilt: f64,
    pub yawn_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalAggregate {
    /// 本区间眨眼次数，每次上报后归零
    pub interval_blinks: u32,
    /// 会话累计眨眼次数，只增不减
    pub total_blinks: u64,
    pub last_ear: f64,
    pub last_head_tilt: f64,
    pub last_yawn_ratio: f64,
    pub window_start: Option<f64>,
}

impl IntervalAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录最近一帧（覆盖，不做平均）
    pub fn record_sample(&mut self, smoothed_ear: f64, sample: &GeometrySample, now: f64) {
        self.last_ear = smoothed_ear;
        self.last_head_tilt = sample.head_tilt_deg;
        self.last_yawn_ratio = sample.mouth_ratio;
        self.window_start.get_or_insert(now);
    }

    pub fn record_blink(&mut self) {
        self.interval_blinks = self.interval_blinks.saturating_add(1);
        self.total_blinks = self.total_blinks.saturating_add(1);
    }

    /// 打包当前区间并重置区间计数（累计计数不变）
    pub fn take_report(&mut self, now: f64) -> TelemetryReport {
        let report = TelemetryReport {
            eye_ratio: self.last_ear,
            blink_count: self.interval_blinks,
            head_tilt: self.last_head_tilt,
            yawn_ratio: self.last_yawn_ratio,
        };
        self.interval_blinks = 0;
        self.window_start = Some(now);
        report
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchCadence {
    interval_ms: f64,
    last_dispatch: Option<f64>,
}

impl Default for DispatchCadence {
    fn default() -> Self {
        Self::new(DEFAULT_DISPATCH_INTERVAL_MS)
    }
}

impl DispatchCadence {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms,
            last_dispatch: None,
        }
    }

    /// 首次调用必然到期，此后距上次上报满 `interval_ms` 才到期
    pub fn is_due(&self, now: f64) -> bool {
        match self.last_dispatch {
            None => true,
            Some(last) => now - last >= self.interval_ms,
        }
    }

    pub fn mark(&mut self, now: f64) {
        self.last_dispatch = Some(now);
    }

    pub fn last_dispatch(&self) -> Option<f64> {
        self.last_dispatch
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStatus {
    Alert,
    Normal,
}

/// 评分服务响应；只关心 `status` 字段，其余字段忽略
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScoreResponse {
    #[serde(default)]
    pub status: String,
}

impl ScoreResponse {
    pub fn score_status(&self) -> ScoreStatus {
        ScoreStatus::from_wire(&self.status)
    }
}

impl ScoreStatus {
    /// 仅字面量 `"alert"` 视为告警
    pub fn from_wire(status: &str) -> Self {
        if status == "alert" {
            Self::Alert
        } else {
            Self::Normal
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertDebounce {
    min_gap_ms: f64,
    last_alert: Option<f64>,
}

impl Default for AlertDebounce {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_GAP_MS)
    }
}

impl AlertDebounce {
    pub fn new(min_gap_ms: f64) -> Self {
        Self {
            min_gap_ms,
            last_alert: None,
        }
    }

    /// 返回 true 表示应当触发告警，并记录本次时间
    ///
    /// 乱序到达、时间早于上次告警的响应视为仍在窗口内，被抑制。
    pub fn try_fire(&mut self, now: f64) -> bool {
        let fire = match self.last_alert {
            None => true,
            Some(last) => now - last >= self.min_gap_ms,
        };
        if fire {
            self.last_alert = Some(now);
        }
        fire
    }

    pub fn last_alert(&self) -> Option<f64> {
        self.last_alert
    }
}
