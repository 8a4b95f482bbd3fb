use std::time::Instant;

/// 进程内单调时钟，以毫秒 `f64` 表示，与核心库的时间戳约定一致
///
/// 帧处理、阶段计时、上报节奏与告警去抖共用同一个时钟。
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}
