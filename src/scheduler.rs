use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::error::TaskError;
use crate::models::{PhaseStatus, TaskPhases};
use crate::service::{ScrapeService, SCRAPE_KIND};
use crate::tasks::TaskId;

/// Fires a full scrape every `period`, independent of on-demand triggers.
pub struct Scheduler {
    service: Arc<ScrapeService>,
    period: Duration,
    retention: chrono::Duration,
    job_id: String,
}

impl Scheduler {
    pub fn new(service: Arc<ScrapeService>, period: Duration, retention: chrono::Duration) -> Self {
        Self {
            service,
            period,
            retention,
            job_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// First tick fires one period from now, not immediately.
    pub fn start(self) -> JoinHandle<()> {
        info!(job_id = %self.job_id, minutes = self.period.as_secs() / 60, "Scheduler started");
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.tick() {
                    warn!(job_id = %self.job_id, "Scheduled scrape not started: {:#}", e);
                }
            }
        })
    }

    /// One firing: drop expired staging authors, then record the task and queue it.
    ///
    /// The purge runs whether or not a worker is alive. Without a worker no record is
    /// written; a submit that still fails leaves its record marked `FAILED`.
    pub fn tick(&self) -> Result<TaskId> {
        let store = self.service.store();
        match store.purge_scraped_authors(Utc::now() - self.retention) {
            Ok(0) => {}
            Ok(purged) => info!(purged, "Expired staging authors removed"),
            Err(e) => warn!("Staging purge failed: {}", e),
        }

        if !self.service.backend().is_worker_alive() {
            return Err(TaskError::WorkerUnavailable.into());
        }
        let record = store.create_task(SCRAPE_KIND, Some(&self.job_id), None)?;
        let task_id = match self.service.submit_scheduled(record.id) {
            Ok(id) => id,
            Err(e) => {
                let failed = TaskPhases::default()
                    .with_quote(PhaseStatus::Failed)
                    .with_author(PhaseStatus::Failed);
                store.update_task_status(record.id, failed)?;
                return Err(e.into());
            }
        };
        info!(
            job_id = %self.job_id,
            record_id = record.id,
            task_id = %task_id,
            "Scheduled scrape queued"
        );
        Ok(task_id)
    }
}
