//! Periodic retention sweep for temp and result artifacts.
//!
//! Best-effort housekeeping on a fixed interval, independent of any request
//! lifecycle. Failures are logged and never escalated.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::artifacts::ArtifactStore;

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub temp_ttl: Duration,
    pub result_ttl: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            temp_ttl: Duration::from_secs(360),
            result_ttl: Duration::from_secs(3600),
        }
    }
}

/// Spawn the background sweep loop.
pub fn spawn(store: Arc<ArtifactStore>, config: SweeperConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so a fresh start
        // doesn't sweep before anything can age.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed_temp = store.sweep_temp(config.temp_ttl);
            let removed_results = store.sweep_results(config.result_ttl);
            if removed_temp + removed_results > 0 {
                tracing::debug!(removed_temp, removed_results, "sweep pass complete");
            }
        }
    })
}
