use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::monitor::alerts::BroadcastAlertSink;
use crate::monitor::Monitor;
use crate::services::scoring_client::ScoringClient;

#[derive(Clone)]
pub struct AppState {
    monitor: Arc<Monitor>,
    alerts: Arc<BroadcastAlertSink>,
    scoring: ScoringClient,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: &Config, shutdown_tx: broadcast::Sender<()>) -> Self {
        let alerts = Arc::new(BroadcastAlertSink::new(config.alerts.channel_capacity));
        let scoring = ScoringClient::new(&config.scoring);
        let monitor = Arc::new(Monitor::new(
            config.pipeline.to_pipeline(),
            scoring.clone(),
            alerts.clone(),
        ));

        Self {
            monitor,
            alerts,
            scoring,
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn alerts(&self) -> &BroadcastAlertSink {
        &self.alerts
    }

    pub fn scoring(&self) -> &ScoringClient {
        &self.scoring
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
