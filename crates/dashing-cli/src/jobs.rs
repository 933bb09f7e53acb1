//! Built-in sample job.

use async_trait::async_trait;
use dashing_core::{Config, Event, Job, Publisher};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const SAMPLE: &str = "sample";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SampleSettings {
    pub interval_secs: u64,
}

impl Default for SampleSettings {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

/// Publishes a counter to the `sample` widget, `{"current": n, "last": n - 1}`.
pub struct SampleJob;

impl SampleJob {
    fn settings(config: &Config) -> SampleSettings {
        match config.job_settings::<SampleSettings>(SAMPLE) {
            Ok(settings) => settings.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Using default sample job settings");
                SampleSettings::default()
            }
        }
    }
}

/// Next event for the sample widget.
pub fn sample_event(current: u64) -> Event {
    let body = json!({
        "current": current,
        "last": current.saturating_sub(1),
    });
    Event::widget(SAMPLE, body.as_object().cloned().unwrap_or_default())
}

#[async_trait]
impl Job for SampleJob {
    fn name(&self) -> &str {
        SAMPLE
    }

    async fn work(&self, config: Arc<Config>, events: Publisher) {
        let settings = Self::settings(&config);
        let mut ticker = tokio::time::interval(Duration::from_secs(settings.interval_secs.max(1)));
        let mut current = 0u64;

        loop {
            ticker.tick().await;
            current += 1;
            if events.publish(sample_event(current)).await.is_err() {
                // Broker stopped; nothing left to feed.
                return;
            }
        }
    }
}
