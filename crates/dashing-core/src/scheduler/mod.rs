//! Job scheduler.
//!
//! Jobs come from two places:
//! - the process-wide default list, filled by [`register_default_job`]
//!   before any scheduler is built (extension crates use this);
//! - the scheduler instance itself, via [`Scheduler::register`] or
//!   [`Scheduler::with_jobs`].
//!
//! A scheduler copies the default list when it is created, so later
//! instance registrations never leak back into it.

mod job;

pub use job::Job;

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::broker::{Broker, Publisher};
use crate::config::Config;
use crate::error::SchedulerError;

static DEFAULT_JOBS: Mutex<Vec<Arc<dyn Job>>> = Mutex::new(Vec::new());

fn validate(job: &dyn Job) -> Result<(), SchedulerError> {
    if job.name().trim().is_empty() {
        return Err(SchedulerError::invalid_job("job name must not be blank"));
    }
    Ok(())
}

/// Register a job that every scheduler created afterwards will run.
pub fn register_default_job(job: Arc<dyn Job>) -> Result<(), SchedulerError> {
    validate(job.as_ref())?;
    DEFAULT_JOBS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(job);
    Ok(())
}

/// Names of the jobs currently in the process-wide default list.
pub fn default_job_names() -> Vec<String> {
    DEFAULT_JOBS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .iter()
        .map(|job| job.name().to_string())
        .collect()
}

/// Owns a set of jobs and launches one task per job.
pub struct Scheduler {
    jobs: Vec<Arc<dyn Job>>,
    config: Arc<Config>,
    publisher: Publisher,
}

impl Scheduler {
    /// Create a scheduler seeded with the process-wide default jobs.
    pub fn new(broker: &Broker, config: Arc<Config>) -> Self {
        let jobs = DEFAULT_JOBS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        Self {
            jobs,
            config,
            publisher: broker.publisher(),
        }
    }

    /// Create a scheduler running exactly `jobs`, ignoring the defaults.
    pub fn with_jobs(
        broker: &Broker,
        config: Arc<Config>,
        jobs: Vec<Arc<dyn Job>>,
    ) -> Result<Self, SchedulerError> {
        for job in &jobs {
            validate(job.as_ref())?;
        }
        Ok(Self {
            jobs,
            config,
            publisher: broker.publisher(),
        })
    }

    /// Add a job to this scheduler only.
    pub fn register(&mut self, job: Arc<dyn Job>) -> Result<(), SchedulerError> {
        validate(job.as_ref())?;
        self.jobs.push(job);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.name()).collect()
    }

    /// Spawn every registered job. All jobs share one publisher.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let handles: Vec<_> = self
            .jobs
            .iter()
            .map(|job| {
                let job = Arc::clone(job);
                let config = Arc::clone(&self.config);
                let events = self.publisher.clone();
                tokio::spawn(async move {
                    let name = job.name().to_string();
                    info!(job = %name, "Job started");
                    match AssertUnwindSafe(job.work(config, events)).catch_unwind().await {
                        Ok(()) => warn!(job = %name, "Job exited"),
                        Err(_) => error!(job = %name, "Job panicked"),
                    }
                })
            })
            .collect();

        info!(job_count = handles.len(), "Scheduler started");
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::event::Event;
    use async_trait::async_trait;
    use serde_json::json;

    struct CountingJob {
        name: String,
        count: usize,
    }

    #[async_trait]
    impl Job for CountingJob {
        fn name(&self) -> &str {
            &self.name
        }

        async fn work(&self, _config: Arc<Config>, events: Publisher) {
            for i in 0..self.count {
                let body = json!({ "current": i }).as_object().cloned().unwrap_or_default();
                if events.publish(Event::widget(self.name.clone(), body)).await.is_err() {
                    return;
                }
            }
        }
    }

    struct PanickingJob;

    #[async_trait]
    impl Job for PanickingJob {
        fn name(&self) -> &str {
            "panics"
        }

        async fn work(&self, _config: Arc<Config>, _events: Publisher) {
            panic!("job failure");
        }
    }

    fn counting(name: &str, count: usize) -> Arc<dyn Job> {
        Arc::new(CountingJob {
            name: name.to_string(),
            count,
        })
    }

    fn broker() -> Broker {
        Broker::start(&BrokerConfig::default())
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let broker = broker();
        let config = Arc::new(Config::default());

        let err = Scheduler::with_jobs(&broker, config.clone(), vec![counting("  ", 1)])
            .err()
            .unwrap();
        assert!(matches!(err, SchedulerError::InvalidJob(_)));

        let mut scheduler = Scheduler::with_jobs(&broker, config, vec![]).unwrap();
        assert!(scheduler.register(counting("", 1)).is_err());
        assert!(scheduler.is_empty());
        assert!(register_default_job(counting("", 1)).is_err());
    }

    #[tokio::test]
    async fn test_default_registry_is_copied() {
        register_default_job(counting("scheduler-test-default", 0)).unwrap();

        let broker = broker();
        let config = Arc::new(Config::default());

        let mut seeded = Scheduler::new(&broker, config.clone());
        assert!(seeded.job_names().contains(&"scheduler-test-default"));

        seeded.register(counting("scheduler-test-instance", 0)).unwrap();
        assert!(!default_job_names().contains(&"scheduler-test-instance".to_string()));

        let isolated = Scheduler::with_jobs(&broker, config, vec![counting("only", 0)]).unwrap();
        assert_eq!(isolated.job_names(), vec!["only"]);
    }

    #[tokio::test]
    async fn test_jobs_share_the_broker() {
        let broker = broker();
        let mut sub = broker.subscribe().await.unwrap();

        let scheduler = Scheduler::with_jobs(
            &broker,
            Arc::new(Config::default()),
            vec![counting("alpha", 3), counting("beta", 2)],
        )
        .unwrap();
        assert_eq!(scheduler.len(), 2);

        for handle in scheduler.start() {
            handle.await.unwrap();
        }

        let mut alpha = Vec::new();
        let mut beta = 0;
        for _ in 0..5 {
            let event = sub.recv().await.unwrap();
            match event.id.as_str() {
                "alpha" => alpha.push(event.body["current"].as_u64().unwrap()),
                "beta" => beta += 1,
                other => panic!("unexpected event {other}"),
            }
        }
        assert_eq!(alpha, vec![0, 1, 2]);
        assert_eq!(beta, 2);
    }

    #[tokio::test]
    async fn test_panicking_job_is_contained() {
        let broker = broker();
        let mut sub = broker.subscribe().await.unwrap();

        let scheduler = Scheduler::with_jobs(
            &broker,
            Arc::new(Config::default()),
            vec![Arc::new(PanickingJob) as Arc<dyn Job>, counting("survivor", 1)],
        )
        .unwrap();

        for handle in scheduler.start() {
            assert!(handle.await.is_ok());
        }
        assert_eq!(sub.recv().await.unwrap().id, "survivor");
    }
}
