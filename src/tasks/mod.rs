pub mod backend;
pub mod executor;
pub mod registry;
pub mod types;

pub use backend::{TaskBackend, TaskContext};
pub use executor::TaskExecutor;
pub use types::{TaskId, TaskRecord, TaskState};
