use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use serde_json::Value;

use super::backend::TaskContext;

/// Type-erased async handler: takes the task context, resolves to the task's result.
pub type TaskHandlerFn =
    Arc<dyn Fn(TaskContext) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// Maps handler names to the code that runs them.
#[derive(Default)]
pub struct TaskHandlerRegistry {
    handlers: DashMap<String, TaskHandlerFn>,
}

impl TaskHandlerRegistry {
    pub fn register<F, Fut>(&self, name: &str, handler: F)
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler_fn: TaskHandlerFn = Arc::new(move |ctx: TaskContext| {
            Box::pin(handler(ctx)) as Pin<Box<dyn Future<Output = Result<Value>> + Send>>
        });
        self.handlers.insert(name.to_string(), handler_fn);
        tracing::info!("Registered task handler: {}", name);
    }

    /// Clones the handler out so no map guard is held while it runs.
    pub fn get(&self, name: &str) -> Option<TaskHandlerFn> {
        self.handlers.get(name).map(|h| Arc::clone(h.value()))
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}
