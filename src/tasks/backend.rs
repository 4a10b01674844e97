//! In-process task queue and result store.
//!
//! Submitting a task stores it as `PENDING` and queues it; workers started by
//! [`TaskExecutor`](super::executor::TaskExecutor) pick tasks up and write progress, results
//! and failures back here, where callers poll them by id.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

use super::registry::TaskHandlerRegistry;
use super::types::{Task, TaskId, TaskRecord, TaskState};
use crate::error::{FetchError, ParseError, StoreError, TaskError};

#[derive(Default)]
pub struct ResultStore {
    records: DashMap<TaskId, TaskRecord>,
}

impl ResultStore {
    pub fn set(&self, id: &TaskId, state: TaskState, meta: Value) {
        self.records.insert(id.clone(), TaskRecord { state, meta });
    }

    pub fn get(&self, id: &TaskId) -> Option<TaskRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }
}

/// Handed to a handler while it runs.
#[derive(Clone)]
pub struct TaskContext {
    pub id: TaskId,
    pub payload: Value,
    results: Arc<ResultStore>,
}

impl TaskContext {
    /// Publishes progress; pollers see it as `IN_PROGRESS` with this meta.
    pub fn report_progress(&self, meta: Value) {
        self.results.set(&self.id, TaskState::InProgress, meta);
    }
}

type Queued = (TaskId, Task);

pub struct TaskBackend {
    registry: TaskHandlerRegistry,
    results: Arc<ResultStore>,
    queue_tx: mpsc::UnboundedSender<Queued>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<Queued>>,
    live_workers: AtomicUsize,
}

impl TaskBackend {
    pub fn new() -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            registry: TaskHandlerRegistry::default(),
            results: Arc::new(ResultStore::default()),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            live_workers: AtomicUsize::new(0),
        })
    }

    pub fn registry(&self) -> &TaskHandlerRegistry {
        &self.registry
    }

    pub fn submit(&self, handler: &str, payload: Value) -> Result<TaskId, TaskError> {
        if !self.registry.has_handler(handler) {
            return Err(TaskError::UnknownHandler(handler.to_string()));
        }
        let id = TaskId::new();
        self.results.set(&id, TaskState::Pending, Value::Null);
        let task = Task {
            handler: handler.to_string(),
            payload,
        };
        self.queue_tx
            .send((id.clone(), task))
            .map_err(|_| TaskError::WorkerUnavailable)?;
        tracing::info!(task_id = %id, handler, "Task queued");
        Ok(id)
    }

    pub fn state(&self, id: &TaskId) -> Option<TaskRecord> {
        self.results.get(id)
    }

    pub fn is_worker_alive(&self) -> bool {
        self.live_workers.load(Ordering::SeqCst) > 0
    }

    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    pub(super) async fn next_task(&self) -> Option<Queued> {
        self.queue_rx.lock().await.recv().await
    }

    pub(super) fn context(&self, id: TaskId, payload: Value) -> TaskContext {
        TaskContext {
            id,
            payload,
            results: Arc::clone(&self.results),
        }
    }

    pub(super) fn finish(&self, id: &TaskId, outcome: anyhow::Result<Value>) {
        match outcome {
            Ok(result) => {
                tracing::info!(task_id = %id, "Task succeeded");
                self.results.set(id, TaskState::Success, result);
            }
            Err(err) => {
                tracing::error!(task_id = %id, "Task failed: {:#}", err);
                self.results.set(id, TaskState::Failure, failure_meta(&err));
            }
        }
    }

    pub(super) fn mark(&self, id: &TaskId, state: TaskState, meta: Value) {
        self.results.set(id, state, meta);
    }
}

/// Counts a worker as alive for as long as it is held.
pub(super) struct LiveWorker(Arc<TaskBackend>);

impl LiveWorker {
    pub(super) fn enter(backend: &Arc<TaskBackend>) -> Self {
        backend.live_workers.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(backend))
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.0.live_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn failure_meta(err: &anyhow::Error) -> Value {
    let exc_type = if err.downcast_ref::<StoreError>().is_some() {
        "StoreError"
    } else if err.downcast_ref::<FetchError>().is_some() {
        "FetchError"
    } else if err.downcast_ref::<ParseError>().is_some() {
        "ParseError"
    } else if err.downcast_ref::<TaskError>().is_some() {
        "TaskError"
    } else {
        "Error"
    };
    json!({
        "exc_type": exc_type,
        "exc_message": err.chain().map(|c| c.to_string()).collect::<Vec<_>>(),
    })
}
