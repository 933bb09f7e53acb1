//! Web server command.

use anyhow::{Context, Result};
use clap::Args;
use dashing_core::{Broker, Config, Scheduler};
use dashing_web::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::jobs::SampleJob;
use crate::output;

#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on (overrides the config file)
    #[arg(long, env = "DASHING_BIND")]
    pub bind: Option<SocketAddr>,

    /// Directory containing dashboards/, widgets/ and public/
    #[arg(long, env = "DASHING_WEBROOT")]
    pub webroot: Option<PathBuf>,

    /// Development mode, exposed to dashboard templates
    #[arg(long)]
    pub dev: bool,

    /// Run the built-in sample job
    #[arg(long)]
    pub sample_jobs: bool,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl ServeArgs {
    /// Apply command-line overrides on top of the loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(webroot) = &self.webroot {
            config.webroot = webroot.clone();
        }
        if self.dev {
            config.development = true;
        }
    }
}

pub async fn execute(args: ServeArgs, mut config: Config) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;
    let config = Arc::new(config);

    let broker = Broker::start(&config.broker);

    let mut scheduler = Scheduler::new(&broker, Arc::clone(&config));
    if args.sample_jobs {
        scheduler
            .register(Arc::new(SampleJob))
            .context("Failed to register sample job")?;
    }

    output::print_banner(&config, &scheduler.job_names());

    // Dropping the handles detaches the jobs.
    let _ = scheduler.start();

    let state = AppState::new(broker.clone(), Arc::clone(&config));
    dashing_web::run_server(state, config.bind, shutdown_signal(broker)).await?;

    Ok(())
}

/// Resolve on SIGINT/SIGTERM, after stopping the broker so open event
/// streams end and graceful shutdown can finish.
async fn shutdown_signal(broker: Broker) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, initiating graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }

    broker.shutdown().await;
}
