use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use std::fmt;

use fatigue_core::{CalibrationConfig, PipelineConfig};

#[derive(Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub cors_origin: String,
    pub scoring: ScoringConfig,
    pub pipeline: PipelineEnvConfig,
    pub alerts: AlertConfig,
}

#[derive(Clone)]
pub struct ScoringConfig {
    pub enabled: bool,
    pub api_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

/// 管线参数的环境变量覆盖；缺省值即核心库的默认常量
#[derive(Debug, Clone)]
pub struct PipelineEnvConfig {
    pub calibration_window_ms: f64,
    pub calibration_min_samples: usize,
    pub ema_alpha: f64,
    pub dispatch_interval_ms: f64,
    pub alert_gap_ms: f64,
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// SSE 告警广播通道容量
    pub channel_capacity: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("enable_file_logs", &self.enable_file_logs)
            .field("log_dir", &self.log_dir)
            .field("cors_origin", &self.cors_origin)
            .field("scoring", &self.scoring)
            .field("pipeline", &self.pipeline)
            .field("alerts", &self.alerts)
            .finish()
    }
}

impl fmt::Debug for ScoringConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoringConfig")
            .field("enabled", &self.enabled)
            .field("api_url", &self.api_url)
            .field("api_key", &"***REDACTED***")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for PipelineEnvConfig {
    fn default() -> Self {
        Self::from_pipeline(&PipelineConfig::default())
    }
}

impl PipelineEnvConfig {
    fn from_pipeline(p: &PipelineConfig) -> Self {
        Self {
            calibration_window_ms: p.calibration.window_ms,
            calibration_min_samples: p.calibration.min_samples,
            ema_alpha: p.ema_alpha,
            dispatch_interval_ms: p.dispatch_interval_ms,
            alert_gap_ms: p.alert_gap_ms,
        }
    }

    pub fn to_pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            calibration: CalibrationConfig {
                window_ms: self.calibration_window_ms,
                min_samples: self.calibration_min_samples,
                ..CalibrationConfig::default()
            },
            ema_alpha: self.ema_alpha,
            dispatch_interval_ms: self.dispatch_interval_ms,
            alert_gap_ms: self.alert_gap_ms,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = PipelineEnvConfig::default();
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            scoring: ScoringConfig {
                enabled: env_or_bool("SCORING_ENABLED", true),
                api_url: env_or("SCORING_API_URL", "http://127.0.0.1:8000/predict"),
                api_key: env_or("SCORING_API_KEY", ""),
                timeout_secs: env_or_parse("SCORING_TIMEOUT_SECS", 5_u64),
            },
            pipeline: PipelineEnvConfig {
                calibration_window_ms: env_or_parse_where(
                    "CALIBRATION_WINDOW_MS",
                    defaults.calibration_window_ms,
                    non_negative_ms,
                ),
                calibration_min_samples: env_or_parse_where(
                    "CALIBRATION_MIN_SAMPLES",
                    defaults.calibration_min_samples,
                    |n| *n >= 1,
                ),
                ema_alpha: env_or_parse_where("EAR_SMOOTHING_ALPHA", defaults.ema_alpha, |a| {
                    a.is_finite() && *a > 0.0 && *a <= 1.0
                }),
                dispatch_interval_ms: env_or_parse_where(
                    "DISPATCH_INTERVAL_MS",
                    defaults.dispatch_interval_ms,
                    non_negative_ms,
                ),
                alert_gap_ms: env_or_parse_where(
                    "ALERT_MIN_GAP_MS",
                    defaults.alert_gap_ms,
                    non_negative_ms,
                ),
            },
            alerts: AlertConfig {
                channel_capacity: env_or_parse("ALERT_CHANNEL_CAPACITY", 64_usize).max(1),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

/// 同 `env_or_parse`，但解析成功的值还需通过 `valid` 校验，否则回退默认值
pub fn env_or_parse_where<T, F>(key: &str, default: T, valid: F) -> T
where
    T: FromStr + Copy + fmt::Display,
    F: Fn(&T) -> bool,
{
    let value = env_or_parse(key, default);
    if valid(&value) {
        value
    } else {
        tracing::warn!(key, value = %value, default = %default, "Env var out of range, using default");
        default
    }
}

fn non_negative_ms(ms: &f64) -> bool {
    ms.is_finite() && *ms >= 0.0
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
