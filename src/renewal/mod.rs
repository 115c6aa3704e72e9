// Scheduled renewal
//
// The engine does the work; the scheduler decides when. Scheduling is
// poll-based against the cron expression so settings changes take effect
// without restarting, and the last sweep time is persisted so downtime
// spanning fire times triggers exactly one catch-up sweep at startup.

pub mod engine;
pub mod retry;
pub mod schedule;

pub use engine::{
    CreateCertificate, PassphraseCheck, RenewParams, RenewalEngine, SweepFailure, SweepReport,
};

use crate::config::SchedulerSettings;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const STATE_FILE: &str = "scheduler.json";
const POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    last_sweep: Option<DateTime<Utc>>,
}

/// Status snapshot for the API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub schedule: String,
    pub next_run: Option<DateTime<Utc>>,
    pub last_sweep: Option<DateTime<Utc>>,
    pub running: bool,
}

pub struct SweepScheduler {
    engine: Arc<RenewalEngine>,
    settings: RwLock<SchedulerSettings>,
    state_path: PathBuf,
    last_sweep: RwLock<Option<DateTime<Utc>>>,
    running: AtomicBool,
    last_report: RwLock<Option<SweepReport>>,
}

impl SweepScheduler {
    pub fn new(
        engine: Arc<RenewalEngine>,
        settings: SchedulerSettings,
        storage_root: &std::path::Path,
    ) -> Self {
        let state_path = storage_root.join(STATE_FILE);
        let last_sweep = std::fs::read_to_string(&state_path)
            .ok()
            .and_then(|raw| serde_json::from_str::<PersistedState>(&raw).ok())
            .and_then(|s| s.last_sweep);

        Self {
            engine,
            settings: RwLock::new(settings),
            state_path,
            last_sweep: RwLock::new(last_sweep),
            running: AtomicBool::new(false),
            last_report: RwLock::new(None),
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        let settings = self.settings.read().await;
        let next_run = if settings.enabled {
            schedule::next_fire(&settings.schedule, Utc::now())
                .ok()
                .flatten()
        } else {
            None
        };
        SchedulerStatus {
            enabled: settings.enabled,
            schedule: settings.schedule.clone(),
            next_run,
            last_sweep: *self.last_sweep.read().await,
            running: self.running.load(Ordering::SeqCst),
        }
    }

    pub async fn settings(&self) -> SchedulerSettings {
        self.settings.read().await.clone()
    }

    /// Replace the scheduler settings after validating the expression
    pub async fn update_settings(&self, settings: SchedulerSettings) -> Result<()> {
        schedule::validate_expression(&settings.schedule)?;
        *self.settings.write().await = settings;
        tracing::info!("Scheduler settings updated");
        Ok(())
    }

    pub async fn last_report(&self) -> Option<SweepReport> {
        self.last_report.read().await.clone()
    }

    /// Run one sweep now, outside the schedule
    pub async fn run_now(&self) -> SweepReport {
        self.execute_sweep().await
    }

    async fn execute_sweep(&self) -> SweepReport {
        self.running.store(true, Ordering::SeqCst);
        let report = self.engine.sweep().await;
        self.running.store(false, Ordering::SeqCst);

        *self.last_sweep.write().await = Some(report.finished_at);
        *self.last_report.write().await = Some(report.clone());
        self.persist_state(report.finished_at);
        report
    }

    fn persist_state(&self, at: DateTime<Utc>) {
        let state = PersistedState {
            last_sweep: Some(at),
        };
        match serde_json::to_string_pretty(&state) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.state_path, json) {
                    tracing::debug!(error = %e, "Could not persist scheduler state");
                }
            }
            Err(e) => tracing::debug!(error = %e, "Could not serialize scheduler state"),
        }
    }

    /// Poll loop driving scheduled sweeps until shutdown is signalled
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        tracing::info!("Renewal scheduler started");
        loop {
            let due = {
                let settings = self.settings.read().await;
                if !settings.enabled {
                    false
                } else {
                    let baseline = self
                        .last_sweep
                        .read()
                        .await
                        .unwrap_or_else(|| Utc::now() - chrono::Duration::days(1));
                    schedule::sweep_due(&settings.schedule, baseline, Utc::now()).unwrap_or(false)
                }
            };

            if due {
                self.execute_sweep().await;
            }

            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Renewal scheduler stopping");
                        return;
                    }
                }
            }
        }
    }
}
