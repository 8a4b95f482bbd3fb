//! EAR 指数平滑
//!
//! smoothed = α·raw + (1-α)·smoothed_prev，首个样本直接作为初值。
//! 只对合成 EAR 平滑；张嘴比与头部倾斜角按原值上报。

pub const DEFAULT_EMA_ALPHA: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct EmaFilter {
    alpha: f64,
    /// `None` 表示尚未收到样本
    value: Option<f64>,
}

impl Default for EmaFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EMA_ALPHA)
    }
}

impl EmaFilter {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    pub fn update(&mut self, raw: f64) -> f64 {
        let next = match self.value {
            None => raw,
            Some(prev) => self.alpha * raw + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}
