//! 面部几何提取模块
//!
//! 从单帧关键点计算疲劳相关的标量信号：
//! - EAR (Eye Aspect Ratio): EAR = (|p2-p6| + |p3-p5|) / (2 * |p1-p4|)
//! - 张嘴比: |上唇-下唇| / |左嘴角-右嘴角|
//! - 头部倾斜角: 左右外眼角连线的 atan2 角度（度）
//!
//! 关键点索引为 MediaPipe FaceMesh 的固定约定，不可配置。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 左眼 p1..p6
pub const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
/// 右眼 p1..p6
pub const RIGHT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];

pub const MOUTH_TOP: usize = 13;
pub const MOUTH_BOTTOM: usize = 14;
pub const MOUTH_LEFT: usize = 61;
pub const MOUTH_RIGHT: usize = 291;

/// 头部倾斜使用的外眼角
pub const TILT_LEFT_CORNER: usize = 33;
pub const TILT_RIGHT_CORNER: usize = 263;

/// 提取所需的最少关键点数（最大索引 + 1）
pub const REQUIRED_LANDMARKS: usize = 388;

/// 二维点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// 单帧关键点（像素坐标）
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    pub points: Vec<Point>,
    /// 采集时间戳（毫秒，单调时钟）
    pub timestamp: f64,
}

impl LandmarkFrame {
    pub fn new(points: Vec<Point>, timestamp: f64) -> Self {
        Self { points, timestamp }
    }

    /// 由检测模型输出的归一化 [0,1] 坐标构造，按帧宽高换算为像素坐标
    pub fn from_normalized<I>(normalized: I, width: f64, height: f64, timestamp: f64) -> Self
    where
        I: IntoIterator<Item = Point>,
    {
        let points = normalized
            .into_iter()
            .map(|p| Point::new(p.x * width, p.y * height))
            .collect();
        Self { points, timestamp }
    }
}

/// 单次 tick 的输入：检测到人脸，或本帧无人脸
#[derive(Debug, Clone, PartialEq)]
pub enum FrameInput {
    Face(LandmarkFrame),
    NoFace { timestamp: f64 },
}

impl FrameInput {
    pub fn timestamp(&self) -> f64 {
        match self {
            Self::Face(frame) => frame.timestamp,
            Self::NoFace { timestamp } => *timestamp,
        }
    }
}

/// 单帧几何信号
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometrySample {
    pub left_ear: f64,
    pub right_ear: f64,
    /// 左右 EAR 的算术平均
    pub ear_avg: f64,
    pub mouth_ratio: f64,
    pub head_tilt_deg: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("landmark frame has {actual} points, need at least {required}")]
    TooFewLandmarks { required: usize, actual: usize },
    #[error("degenerate geometry: zero-length {what}")]
    Degenerate { what: &'static str },
}

fn ratio(numerator: f64, denominator: f64, what: &'static str) -> Result<f64, GeometryError> {
    if denominator == 0.0 {
        return Err(GeometryError::Degenerate { what });
    }
    let value = numerator / denominator;
    if !value.is_finite() {
        return Err(GeometryError::Degenerate { what });
    }
    Ok(value)
}

/// 标准6点 EAR
///
/// `idx` 依次为 p1..p6 的关键点索引：
/// - p1, p4: 眼角点（水平方向）
/// - p2, p6 / p3, p5: 上下眼睑配对点
pub fn eye_aspect_ratio(points: &[Point], idx: &[usize; 6]) -> Result<f64, GeometryError> {
    let p = |i: usize| points[idx[i]];
    let horizontal = p(0).distance(&p(3));
    let vertical = p(1).distance(&p(5)) + p(2).distance(&p(4));
    ratio(vertical, 2.0 * horizontal, "eye width")
}

pub fn mouth_opening_ratio(points: &[Point]) -> Result<f64, GeometryError> {
    let vertical = points[MOUTH_TOP].distance(&points[MOUTH_BOTTOM]);
    let horizontal = points[MOUTH_LEFT].distance(&points[MOUTH_RIGHT]);
    ratio(vertical, horizontal, "mouth width")
}

/// 外眼角连线相对水平方向的角度（度），右倾为正
pub fn head_tilt_degrees(points: &[Point]) -> f64 {
    let left = points[TILT_LEFT_CORNER];
    let right = points[TILT_RIGHT_CORNER];
    (right.y - left.y).atan2(right.x - left.x).to_degrees()
}

/// 从一帧关键点提取全部几何信号
///
/// 任一分母为零（重复/退化的关键点）时返回错误，调用方应丢弃本帧。
pub fn extract(frame: &LandmarkFrame) -> Result<GeometrySample, GeometryError> {
    let points = frame.points.as_slice();
    if points.len() < REQUIRED_LANDMARKS {
        return Err(GeometryError::TooFewLandmarks {
            required: REQUIRED_LANDMARKS,
            actual: points.len(),
        });
    }

    let left_ear = eye_aspect_ratio(points, &LEFT_EYE)?;
    let right_ear = eye_aspect_ratio(points, &RIGHT_EYE)?;
    let mouth_ratio = mouth_opening_ratio(points)?;
    let head_tilt_deg = head_tilt_degrees(points);
    if !head_tilt_deg.is_finite() {
        return Err(GeometryError::Degenerate { what: "eye corner line" });
    }

    Ok(GeometrySample {
        left_ear,
        right_ear,
        ear_avg: (left_ear + right_ear) / 2.0,
        mouth_ratio,
        head_tilt_deg,
    })
}
