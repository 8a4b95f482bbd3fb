//! 自校准阈值模块
//!
//! 引导用户先睁眼、再闭眼，分别采集平滑后的 EAR 样本，
//! 由两组均值推导眨眼检测的滞回阈值：
//!
//! ```text
//! low  = closedAvg + inset * (openAvg - closedAvg)
//! high = openAvg   - inset * (openAvg - closedAvg)
//! ```
//!
//! 每个校准阶段需同时满足时长与样本数两个条件才会推进，
//! 人脸间歇性丢失时阶段会一直保持，直到样本足够。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationConfig {
    /// 每个校准阶段的最短时长（毫秒）
    pub window_ms: f64,
    /// 每个校准阶段的最少有效样本数
    pub min_samples: usize,
    /// 睁眼样本为空时使用的均值
    pub open_fallback: f64,
    /// 闭眼样本为空时使用的均值
    pub closed_fallback: f64,
    /// 阈值向区间内收缩的比例
    pub inset: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window_ms: 3000.0,
            min_samples: 60,
            open_fallback: 0.3,
            closed_fallback: 0.2,
            inset: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyeTarget {
    Open,
    Closed,
}

/// 滞回阈值对
///
/// 公式本身不保证 `low < high`：校准失误（睁眼阶段实际闭眼）时可能倒置，
/// 此处按原值保留，只提供 [`Thresholds::is_inverted`] 供调用方记录。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

impl Thresholds {
    pub fn from_averages(open_avg: f64, closed_avg: f64, inset: f64) -> Self {
        let span = open_avg - closed_avg;
        Self {
            low: closed_avg + inset * span,
            high: open_avg - inset * span,
        }
    }

    pub fn is_inverted(&self) -> bool {
        self.low >= self.high
    }
}

/// 校准采样缓冲，阈值计算后即丢弃
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationBuffer {
    open: Vec<f64>,
    closed: Vec<f64>,
}

impl CalibrationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, target: EyeTarget, ear: f64) {
        match target {
            EyeTarget::Open => self.open.push(ear),
            EyeTarget::Closed => self.closed.push(ear),
        }
    }

    pub fn len(&self, target: EyeTarget) -> usize {
        match target {
            EyeTarget::Open => self.open.len(),
            EyeTarget::Closed => self.closed.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty() && self.closed.is_empty()
    }

    /// 计算阈值并消耗缓冲
    pub fn into_thresholds(self, config: &CalibrationConfig) -> Thresholds {
        let open_avg = mean(&self.open).unwrap_or(config.open_fallback);
        let closed_avg = mean(&self.closed).unwrap_or(config.closed_fallback);
        Thresholds::from_averages(open_avg, closed_avg, config.inset)
    }
}

fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// 单个校准阶段的计时窗口
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationWindow {
    started_at: f64,
}

impl CalibrationWindow {
    pub fn start(now: f64) -> Self {
        Self { started_at: now }
    }

    pub fn is_complete(&self, now: f64, collected: usize, config: &CalibrationConfig) -> bool {
        now - self.started_at >= config.window_ms && collected >= config.min_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(open: f64, closed: f64, n: usize) -> CalibrationBuffer {
        let mut buffer = CalibrationBuffer::new();
        for _ in 0..n {
            buffer.push(EyeTarget::Open, open);
            buffer.push(EyeTarget::Closed, closed);
        }
        buffer
    }

    #[test]
    fn thresholds_sit_ten_percent_inside_the_band() {
        let thresholds = filled(0.30, 0.10, 60).into_thresholds(&CalibrationConfig::default());
        assert!((thresholds.low - 0.12).abs() < 1e-12);
        assert!((thresholds.high - 0.28).abs() < 1e-12);
        assert!(!thresholds.is_inverted());
    }

    #[test]
    fn empty_buffers_use_fallback_averages() {
        let thresholds = CalibrationBuffer::new().into_thresholds(&CalibrationConfig::default());
        // open=0.3, closed=0.2
        assert!((thresholds.low - 0.21).abs() < 1e-12);
        assert!((thresholds.high - 0.29).abs() < 1e-12);
    }

    #[test]
    fn miscalibration_inverts_without_clamping() {
        let thresholds = Thresholds::from_averages(0.10, 0.30, 0.1);
        assert!((thresholds.low - 0.28).abs() < 1e-12);
        assert!((thresholds.high - 0.12).abs() < 1e-12);
        assert!(thresholds.is_inverted());
    }

    #[test]
    fn window_needs_both_time_and_samples() {
        let config = CalibrationConfig::default();
        let window = CalibrationWindow::start(1000.0);
        assert!(!window.is_complete(3999.0, 200, &config));
        assert!(!window.is_complete(9000.0, 59, &config));
        assert!(window.is_complete(4000.0, 60, &config));
    }

    #[test]
    fn lengths_are_tracked_per_target() {
        let mut buffer = CalibrationBuffer::new();
        assert!(buffer.is_empty());
        buffer.push(EyeTarget::Open, 0.3);
        buffer.push(EyeTarget::Open, 0.3);
        buffer.push(EyeTarget::Closed, 0.1);
        assert_eq!(buffer.len(EyeTarget::Open), 2);
        assert_eq!(buffer.len(EyeTarget::Closed), 1);
    }
}
