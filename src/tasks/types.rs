use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque id handed back to whoever submitted the task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    InProgress,
    Success,
    Failure,
}

/// A named unit of work and its JSON arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub handler: String,
    pub payload: Value,
}

/// What the result store knows about a task: its state plus the latest progress,
/// result or failure payload.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub state: TaskState,
    pub meta: Value,
}
