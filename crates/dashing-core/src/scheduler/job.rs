//! Job trait.

use async_trait::async_trait;
use std::sync::Arc;

use crate::broker::Publisher;
use crate::config::Config;

/// A pluggable producer of events.
///
/// `work` is spawned once per scheduler start and is expected to run for
/// the rest of the process, publishing at whatever pace it likes. There is
/// no restart: a job that returns simply stops producing.
///
/// `events` may wait briefly when the broker's publish queue is full, but
/// is never held up by slow viewers.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Name used for logging and for the `[jobs.<name>]` config section.
    fn name(&self) -> &str;

    async fn work(&self, config: Arc<Config>, events: Publisher);
}
