use std::time::{Duration, Instant};

use fatigue_core::{ScoreResponse, TelemetryReport};
use serde::Serialize;

use crate::config::ScoringConfig;

/// 连通性探测的超时，远小于上报超时
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// 评分服务连通性探测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringProbe {
    /// 任何 HTTP 响应（含 4xx/5xx）都视为可达
    pub reachable: bool,
    pub status: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// 远端疲劳评分服务客户端
///
/// 每个上报区间 POST 一次 `TelemetryReport`，只解析响应中的 `status`。
#[derive(Debug, Clone)]
pub struct ScoringClient {
    config: ScoringConfig,
    client: reqwest::Client,
}

impl ScoringClient {
    pub fn new(config: &ScoringConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config: config.clone(),
            client,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// 向 `api_url` 发一个短超时的 GET，只判断服务是否可达
    pub async fn probe(&self) -> Result<ScoringProbe, ScoringError> {
        if !self.config.enabled {
            return Err(ScoringError::Disabled);
        }

        let start = Instant::now();
        let result = self
            .client
            .get(&self.config.api_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        Ok(match result {
            Ok(response) => ScoringProbe {
                reachable: true,
                status: Some(response.status().as_u16()),
                latency_ms,
                error: None,
            },
            Err(e) => ScoringProbe {
                reachable: false,
                status: None,
                latency_ms,
                error: Some(ScoringError::from_transport(e).to_string()),
            },
        })
    }

    pub async fn submit(&self, report: &TelemetryReport) -> Result<ScoreResponse, ScoringError> {
        if !self.config.enabled {
            return Err(ScoringError::Disabled);
        }

        let mut request = self.client.post(&self.config.api_url).json(report);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().await.map_err(ScoringError::from_transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScoringError::Status(status.as_u16()));
        }

        response
            .json::<ScoreResponse>()
            .await
            .map_err(|e| ScoringError::InvalidBody(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("scoring is disabled")]
    Disabled,
    #[error("scoring request timed out")]
    Timeout,
    #[error("scoring network error: {0}")]
    Network(String),
    #[error("scoring service returned status {0}")]
    Status(u16),
    #[error("scoring response body is invalid: {0}")]
    InvalidBody(String),
}

impl ScoringError {
    fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e.to_string())
        }
    }
}
