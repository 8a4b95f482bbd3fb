//! 眨眼检测模块
//!
//! 基于双阈值滞回的两状态机：
//! Open --(EAR < low)--> Closed --(EAR >= high)--> Open（计一次眨眼）
//!
//! 介于 low 与 high 之间的值不触发任何转换，避免在单一阈值附近抖动。
//! 不设最短/最长闭眼时长门限：单帧跌破 low 再回到 high 之上也计为一次完整眨眼。

use serde::Serialize;

use crate::calibration::Thresholds;

/// 眼睛开闭状态；闭眼起始时间仅在 `Closed` 中存在
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BlinkState {
    #[default]
    Open,
    Closed { since: f64 },
}

impl BlinkState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    pub fn closed_since(&self) -> Option<f64> {
        match self {
            Self::Open => None,
            Self::Closed { since } => Some(*since),
        }
    }
}

/// 一次完成的眨眼（睁眼沿触发）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlinkEvent {
    pub closed_at: f64,
    pub opened_at: f64,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Default)]
pub struct BlinkDetector {
    state: BlinkState,
}

impl BlinkDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BlinkState {
        self.state
    }

    pub fn update(&mut self, ear: f64, thresholds: &Thresholds, timestamp: f64) -> Option<BlinkEvent> {
        match self.state {
            BlinkState::Open if ear < thresholds.low => {
                self.state = BlinkState::Closed { since: timestamp };
                None
            }
            BlinkState::Closed { since } if ear >= thresholds.high => {
                self.state = BlinkState::Open;
                Some(BlinkEvent {
                    closed_at: since,
                    opened_at: timestamp,
                    duration_ms: timestamp - since,
                })
            }
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.state = BlinkState::Open;
    }
}
