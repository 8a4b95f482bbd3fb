use std::net::SocketAddr;

use axum::Router;
use tokio::sync::broadcast;

use fatigue_monitor::config::{AlertConfig, Config, PipelineEnvConfig, ScoringConfig};
use fatigue_monitor::routes::build_router;
use fatigue_monitor::state::AppState;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    pub shutdown_tx: broadcast::Sender<()>,
}

/// 直接构造 Config，避免 set_var 在并行测试间互相干扰
pub fn test_config(scoring_url: Option<String>) -> Config {
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        scoring: ScoringConfig {
            enabled: scoring_url.is_some(),
            api_url: scoring_url.unwrap_or_default(),
            api_key: String::new(),
            timeout_secs: 2,
        },
        // 校准窗口取 0，只看样本数，使测试与墙钟无关
        pipeline: PipelineEnvConfig {
            calibration_window_ms: 0.0,
            calibration_min_samples: 3,
            ema_alpha: 0.5,
            dispatch_interval_ms: 3_600_000.0,
            alert_gap_ms: 0.0,
        },
        alerts: AlertConfig { channel_capacity: 16 },
    }
}

pub fn spawn_with_config(config: Config) -> TestApp {
    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(&config, shutdown_tx.clone());
    let app = build_router(state.clone());
    TestApp {
        app,
        state,
        config,
        shutdown_tx,
    }
}

pub fn spawn_test_app() -> TestApp {
    spawn_with_config(test_config(None))
}

/// 在 127.0.0.1 随机端口上启动一个替身评分服务
pub async fn serve_stub(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });
    addr
}
