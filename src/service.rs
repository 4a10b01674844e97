use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use url::Url;

use crate::db::Store;
use crate::error::{StoreError, TaskError};
use crate::fetch::SessionFactory;
use crate::models::{PhaseStatus, ScheduledTask};
use crate::pipeline::{run_scrape, PipelineOptions};
use crate::tasks::{TaskBackend, TaskContext, TaskId, TaskState};

/// Task kind recorded on every scrape task record.
pub const SCRAPE_KIND: &str = "scrape_data";
/// Handler for on-demand runs; creates its own task record.
pub const SCRAPE_HANDLER: &str = "scrape_data";
/// Handler for scheduled runs; the scheduler pre-creates the record.
pub const SCHEDULED_SCRAPE_HANDLER: &str = "scrape_data_scheduler";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnDemandPayload {
    #[serde(default)]
    single_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduledPayload {
    task_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    pub quote_phase: PhaseStatus,
    pub author_phase: PhaseStatus,
    pub progress: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Boundary between callers (HTTP, CLI, scheduler) and the scrape pipeline.
pub struct ScrapeService {
    store: Arc<Store>,
    backend: Arc<TaskBackend>,
    sessions: Arc<dyn SessionFactory>,
    source_url: Url,
}

impl ScrapeService {
    pub fn new(
        store: Arc<Store>,
        backend: Arc<TaskBackend>,
        sessions: Arc<dyn SessionFactory>,
        source_url: Url,
    ) -> Arc<Self> {
        let service = Arc::new(Self {
            store,
            backend,
            sessions,
            source_url,
        });
        service.register_handlers();
        service
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn backend(&self) -> &Arc<TaskBackend> {
        &self.backend
    }

    fn register_handlers(self: &Arc<Self>) {
        // Weak: the backend's registry must not keep the service alive.
        let service = Arc::downgrade(self);
        self.backend
            .registry()
            .register(SCRAPE_HANDLER, move |ctx: TaskContext| {
                let service = service.upgrade();
                async move {
                    let service = service.context("scrape service is gone")?;
                    let payload: OnDemandPayload = serde_json::from_value(ctx.payload.clone())
                        .context("invalid scrape_data payload")?;
                    let record =
                        service
                            .store
                            .create_task(SCRAPE_KIND, None, Some(ctx.id.0.as_str()))?;
                    service.run(&ctx, record.id, payload.single_page).await
                }
            });

        let service = Arc::downgrade(self);
        self.backend
            .registry()
            .register(SCHEDULED_SCRAPE_HANDLER, move |ctx: TaskContext| {
                let service = service.upgrade();
                async move {
                    let service = service.context("scrape service is gone")?;
                    let payload: ScheduledPayload = serde_json::from_value(ctx.payload.clone())
                        .context("invalid scrape_data_scheduler payload")?;
                    service
                        .store
                        .set_task_external_id(payload.task_id, &ctx.id.0)?;
                    service.run(&ctx, payload.task_id, false).await
                }
            });
    }

    async fn run(&self, ctx: &TaskContext, record_id: i64, single_page: bool) -> Result<Value> {
        let options = PipelineOptions {
            source_url: self.source_url.clone(),
            single_page,
        };
        let report = |meta: Value| ctx.report_progress(meta);
        let outcome = run_scrape(
            &self.store,
            self.sessions.as_ref(),
            record_id,
            &options,
            &report,
        )
        .await?;
        Ok(outcome.result)
    }

    /// Queues an on-demand scrape. Fails fast, before anything is queued, when no worker
    /// is alive to pick it up.
    pub fn trigger_scrape(&self, single_page: bool) -> Result<TaskId, TaskError> {
        if !self.backend.is_worker_alive() {
            return Err(TaskError::WorkerUnavailable);
        }
        let id = self
            .backend
            .submit(SCRAPE_HANDLER, json!({ "singlePage": single_page }))?;
        info!(task_id = %id, single_page, "Scrape triggered");
        Ok(id)
    }

    /// Queues a scheduled scrape for a record created by the caller.
    pub fn submit_scheduled(&self, record_id: i64) -> Result<TaskId, TaskError> {
        if !self.backend.is_worker_alive() {
            return Err(TaskError::WorkerUnavailable);
        }
        self.backend
            .submit(SCHEDULED_SCRAPE_HANDLER, json!({ "taskId": record_id }))
    }

    /// Phase status comes from the task record, progress from the result store. Either
    /// may lag the other slightly.
    pub fn get_scrape_status(&self, task_id: &TaskId) -> Result<ScrapeStatus, StatusError> {
        let backend_state = self.backend.state(task_id);
        let record = self.store.find_task_by_external_id(&task_id.0)?;
        if backend_state.is_none() && record.is_none() {
            return Err(TaskError::NotFound(task_id.0.clone()).into());
        }

        let phases = record.map(|r| r.status).unwrap_or_default();
        let (state, progress) = match backend_state {
            Some(r) => (r.state, r.meta),
            // Known only from a record written by an earlier process.
            None if phases.is_finished() => (TaskState::Success, Value::Null),
            None => (TaskState::Pending, Value::Null),
        };

        Ok(ScrapeStatus {
            task_id: task_id.clone(),
            state,
            quote_phase: phases.quote_phase,
            author_phase: phases.author_phase,
            progress,
        })
    }

    pub fn list_scheduled_tasks(
        &self,
        kind: Option<&str>,
    ) -> Result<Vec<ScheduledTask>, StoreError> {
        self.store.list_tasks(kind)
    }
}
