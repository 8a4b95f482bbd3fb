//! 疲劳信号核心库
//!
//! 将逐帧的面部关键点几何转换为低频率的疲劳遥测数据：
//! 自校准阈值、滞回眨眼检测、指数平滑，以及带告警去抖的周期上报。
//!
//! 本库不读取时钟、不做任何 IO：所有时间戳由调用方以毫秒 (`f64`) 传入，
//! 上报请求以 [`session::Dispatch`] 的形式交还给宿主执行。
//!
//! ## 模块
//! - `geometry`: 关键点 → EAR / 张嘴比 / 头部倾斜角
//! - `smoothing`: EAR 指数移动平均
//! - `calibration`: 睁眼/闭眼采样与滞回阈值推导
//! - `blink`: 滞回眨眼状态机
//! - `reporting`: 区间聚合、上报节奏、告警去抖
//! - `session`: 会话阶段状态机
//! - `wasm`: 浏览器端绑定

pub mod blink;
pub mod calibration;
pub mod geometry;
pub mod reporting;
pub mod session;
pub mod smoothing;
pub mod wasm;

// 重新导出核心类型，方便外部使用
pub use blink::{BlinkDetector, BlinkEvent, BlinkState};
pub use calibration::{CalibrationBuffer, CalibrationConfig, EyeTarget, Thresholds};
pub use geometry::{FrameInput, GeometryError, GeometrySample, LandmarkFrame, Point};
pub use reporting::{AlertDebounce, DispatchCadence, IntervalAggregate, ScoreResponse, ScoreStatus, TelemetryReport};
pub use session::{
    AlertDecision, Dispatch, InitFailure, PipelineConfig, SessionError, SessionMachine,
    SessionPhase, SessionSnapshot, SessionToken, TickOutcome,
};
pub use smoothing::EmaFilter;
