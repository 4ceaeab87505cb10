//! Main application orchestration.
//!
//! Coordinates all components:
//! - realtime database client (REST streaming or in-memory + simulator)
//! - stream sources and collectors feeding the signal store
//! - pulse driver
//! - dashboard server
//! - periodic stats reporting

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::simulator::Simulator;
use crate::stats::StatsReporter;
use biomon_dashboard::{run_pulse, run_server, DashboardState};
use biomon_feed::{spawn_collectors, CollectorOutcome, SignalStore};
use biomon_source::{
    MemoryDatabase, RealtimeDatabase, RestClientConfig, RestStreamingClient, SourceSet,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    shutdown: CancellationToken,
}

impl Application {
    /// Create a new application from a validated configuration.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops `run` when cancelled, in addition to Ctrl-C.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Build the database handle for the configured mode. In simulated mode
    /// the simulator task is started against the returned in-memory database.
    fn open_database(&self) -> AppResult<(Arc<dyn RealtimeDatabase>, Option<JoinHandle<()>>)> {
        if self.config.is_simulated() {
            let memory = Arc::new(MemoryDatabase::new());
            let simulator = Simulator::new(
                memory.clone(),
                self.config.paths.clone(),
                self.config.simulator.clone(),
            );
            let handle = tokio::spawn(simulator.run(self.shutdown.clone()));
            info!("Using in-memory database with simulator");
            let database: Arc<dyn RealtimeDatabase> = memory;
            Ok((database, Some(handle)))
        } else {
            let client = RestStreamingClient::new(RestClientConfig {
                base_url: self.config.database_url.clone(),
                connect_timeout: self.config.request_timeout(),
            })?;
            info!(database_url = %self.config.database_url, "Using realtime database");
            let database: Arc<dyn RealtimeDatabase> = Arc::new(client);
            Ok((database, None))
        }
    }

    /// Run the application until Ctrl-C or the shutdown token fires.
    pub async fn run(self) -> AppResult<()> {
        info!(mode = ?self.config.mode, "Starting application");

        let (database, simulator_handle) = self.open_database()?;

        let paths = &self.config.paths;
        let sources = SourceSet::with_paths(database, &paths.ecg, &paths.emg, &paths.heart_rate);
        let store = Arc::new(SignalStore::new());

        let collectors = spawn_collectors(&sources, store.clone(), self.shutdown.clone());
        info!(collectors = collectors.len(), "Collectors started");

        let (beat_tx, beat_rx) = watch::channel(false);
        let pulse_handle = tokio::spawn(run_pulse(
            store.watch_heart_rate(),
            beat_tx,
            self.shutdown.clone(),
        ));

        let dashboard_handle = if self.config.dashboard.enabled {
            let state = DashboardState::new(
                store.clone(),
                sources.statuses(),
                self.config.dashboard.display_range(),
                beat_rx,
            );
            let config = self.config.dashboard.clone();
            let shutdown = self.shutdown.clone();
            Some(tokio::spawn(async move {
                let result = run_server(state, config, shutdown.clone()).await;
                if let Err(e) = &result {
                    error!(error = %e, "Dashboard server failed");
                    shutdown.cancel();
                }
                result
            }))
        } else {
            info!("Dashboard disabled");
            None
        };

        let mut reporter = StatsReporter::new(sources.statuses(), store.clone());
        let mut stats_interval = tokio::time::interval(self.config.stats_interval());
        // first tick completes immediately
        stats_interval.tick().await;

        info!("Entering main loop");
        loop {
            tokio::select! {
                _ = stats_interval.tick() => {
                    reporter.report();
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }

                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.shutdown.cancel();

        for (channel, outcome) in collectors.join().await? {
            match outcome {
                CollectorOutcome::Terminated(e) => {
                    warn!(channel = %channel, error = %e, "Collector ended with error")
                }
                other => info!(channel = %channel, outcome = ?other, "Collector finished"),
            }
        }

        if let Err(e) = pulse_handle.await {
            warn!(error = %e, "Pulse task failed");
        }
        if let Some(handle) = simulator_handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Simulator task failed");
            }
        }
        let dashboard_result = match dashboard_handle {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "Dashboard task failed");
                    Ok(())
                }
            },
            None => Ok(()),
        };

        info!("Final statistics:");
        reporter.report();
        info!(version = store.version(), "Shut down");

        dashboard_result?;
        Ok(())
    }
}
