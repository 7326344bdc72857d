//! Core backend traits for arbor.

mod data;

use arbor_flow_core::{ExpressionRecord, FlowExpressionId, Task};

pub use arbor_backends_core::{BackendError, BackendResult};

pub use self::data::*;

/// Persistence for expression records and the shared task queue.
#[async_trait::async_trait]
pub trait CoreBackend: Send + Sync {
    /// Insert or replace the record stored under its fei.
    async fn put_expression(&self, record: &ExpressionRecord) -> BackendResult<()>;

    async fn get_expression(
        &self,
        fei: &FlowExpressionId,
    ) -> BackendResult<Option<ExpressionRecord>>;

    /// Returns whether a record was removed.
    async fn delete_expression(&self, fei: &FlowExpressionId) -> BackendResult<bool>;

    async fn list_expressions(&self) -> BackendResult<Vec<ExpressionRecord>>;

    /// Append a task. Durable once this returns.
    async fn put_task(&self, task: Task) -> BackendResult<()>;

    /// Snapshot of queued tasks in insertion order.
    async fn get_tasks(&self) -> BackendResult<Vec<Task>>;

    /// Atomically claim a task by removing it from the queue.
    ///
    /// Exactly one caller gets `true` for a given task id.
    async fn delete_task(&self, task: &Task) -> BackendResult<bool>;

    async fn get_worker_configuration(&self) -> BackendResult<Option<WorkerConfiguration>>;
}
