use std::sync::Arc;

use serde_json::{json, Value};
use tokio::task::JoinHandle;

use super::backend::{LiveWorker, TaskBackend};
use super::types::{Task, TaskId, TaskState};

/// Worker pool draining the backend's queue.
pub struct TaskExecutor;

impl TaskExecutor {
    /// Spawns `worker_count` workers and returns immediately.
    pub fn start(backend: &Arc<TaskBackend>, worker_count: usize) -> Vec<JoinHandle<()>> {
        tracing::info!("Starting {} task workers", worker_count);
        (0..worker_count)
            .map(|worker_id| {
                let backend = Arc::clone(backend);
                let alive = LiveWorker::enter(&backend);
                tokio::spawn(async move {
                    let _alive = alive;
                    worker_loop(backend, worker_id).await;
                })
            })
            .collect()
    }
}

async fn worker_loop(backend: Arc<TaskBackend>, worker_id: usize) {
    while let Some((id, task)) = backend.next_task().await {
        tracing::info!(worker_id, task_id = %id, handler = %task.handler, "Picked up task");
        run_task(&backend, id, task).await;
    }
    tracing::info!("Worker {} stopped", worker_id);
}

async fn run_task(backend: &TaskBackend, id: TaskId, task: Task) {
    let Some(handler) = backend.registry().get(&task.handler) else {
        backend.mark(
            &id,
            TaskState::Failure,
            json!({
                "exc_type": "TaskError",
                "exc_message": [format!("unknown task handler: {}", task.handler)],
            }),
        );
        return;
    };

    backend.mark(&id, TaskState::InProgress, Value::Null);
    let ctx = backend.context(id.clone(), task.payload);

    // Run on its own task so a panicking handler cannot take the worker down.
    match tokio::spawn(handler(ctx)).await {
        Ok(outcome) => backend.finish(&id, outcome),
        Err(join_err) => {
            tracing::error!(task_id = %id, "Task panicked: {}", join_err);
            backend.mark(
                &id,
                TaskState::Failure,
                json!({"exc_type": "Panic", "exc_message": [join_err.to_string()]}),
            );
        }
    }
}
