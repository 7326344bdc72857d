//! Helpers shared by unit tests.

use std::sync::Arc;

use arbor_backend_memory::MemoryBackend;
use arbor_core_backend::CoreBackend;
use arbor_flow_core::{
    ExpressionRecord, FlowExpressionId, Task, TaskAction, TreeNode, Variables, Workitem,
};

use crate::config::WorkerConfig;
use crate::context::EngineContext;
use crate::expression::FlowExpression;
use crate::worker::Worker;

pub fn memory_context() -> (MemoryBackend, EngineContext) {
    let backend = MemoryBackend::new();
    let ctx = EngineContext::with_builtins(Arc::new(backend.clone()));
    (backend, ctx)
}

pub fn test_worker(ctx: EngineContext) -> Worker {
    let config = WorkerConfig {
        name: "test-worker".to_string(),
        idle_sleep: std::time::Duration::from_millis(5),
        reload_schedules_on_start: false,
    };
    Worker::new(ctx, config)
}

pub fn root_fei(wfid: &str) -> FlowExpressionId {
    FlowExpressionId::root(wfid, "test")
}

/// Unpersisted root expression with an empty variable scope.
pub fn root_expression<'a>(ctx: &'a EngineContext, tree: TreeNode) -> FlowExpression<'a> {
    let record = ExpressionRecord::new(
        root_fei("wf-test"),
        None,
        tree,
        Some(Variables::new()),
        Workitem::default(),
    );
    FlowExpression::new(ctx, record)
}

pub fn child_expression<'a>(
    ctx: &'a EngineContext,
    parent: &FlowExpressionId,
    index: usize,
    tree: TreeNode,
) -> FlowExpression<'a> {
    let record = ExpressionRecord::new(
        parent.child(index),
        Some(parent.clone()),
        tree,
        None,
        Workitem::default(),
    );
    FlowExpression::new(ctx, record)
}

pub fn tasks_with(backend: &MemoryBackend, action: TaskAction) -> Vec<Task> {
    backend
        .tasks()
        .into_iter()
        .filter(|task| task.action == action)
        .collect()
}

/// Claim every queued task, returning them in queue order.
pub async fn drain_tasks(backend: &MemoryBackend) -> Vec<Task> {
    let tasks = backend.get_tasks().await.expect("get tasks");
    for task in &tasks {
        backend.delete_task(task).await.expect("delete task");
    }
    tasks
}

/// Step `worker` until the queue holds no dispatchable task or `max_steps`
/// iterations have run.
pub async fn run_until_quiet(worker: &mut Worker, backend: &MemoryBackend, max_steps: usize) {
    for _ in 0..max_steps {
        worker.step().await.expect("worker step");
        let pending = backend.tasks().iter().any(|task| {
            matches!(
                task.action,
                TaskAction::Launch | TaskAction::Apply | TaskAction::Reply | TaskAction::Cancel
            )
        });
        if !pending {
            return;
        }
    }
    panic!("worker did not settle after {max_steps} steps");
}
