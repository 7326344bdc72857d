//! Polling worker.
//!
//! Each [`Worker::step`] fires due timers (at most once per wall-clock
//! second), then claims and dispatches every queued task. Several workers
//! may share one storage: the atomic task claim guarantees each task is
//! dispatched once.

use std::collections::HashSet;
use std::sync::Arc;

use arbor_flow_core::{
    CancelFlavour, ErrorRecord, ExpressionRecord, FlowExpressionId, Task, TaskAction, TreeNode,
    Variables, Workitem,
};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backends::BackendError;
use crate::config::WorkerConfig;
use crate::context::EngineContext;
use crate::expression::{ExpressionError, FlowExpression};
use crate::scheduler::SchedulerError;

/// Definition id used for launches that do not name one.
pub const DEFAULT_DEFINITION_ID: &str = "main";

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("malformed {action} task: {reason}")]
    MalformedTask {
        action: TaskAction,
        reason: &'static str,
    },
}

/// Sink notified after each successfully dispatched task.
pub trait Subscriber: Send + Sync {
    fn notify(&self, task: &Task);
}

impl<F> Subscriber for F
where
    F: Fn(&Task) + Send + Sync,
{
    fn notify(&self, task: &Task) {
        self(task)
    }
}

/// Which actions a subscriber hears about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    All,
    Actions(HashSet<TaskAction>),
}

impl Subscription {
    pub fn actions(actions: impl IntoIterator<Item = TaskAction>) -> Self {
        Self::Actions(actions.into_iter().collect())
    }

    pub fn matches(&self, action: TaskAction) -> bool {
        match self {
            Self::All => true,
            Self::Actions(actions) => actions.contains(&action),
        }
    }
}

/// What one [`Worker::step`] found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Timers claimed and fired.
    pub schedules: usize,
    /// Tasks seen in the queue (claimed or not).
    pub tasks: usize,
}

impl StepOutcome {
    pub fn is_idle(&self) -> bool {
        self.schedules == 0 && self.tasks == 0
    }
}

pub struct Worker {
    ctx: EngineContext,
    config: WorkerConfig,
    subscribers: Vec<(Subscription, Arc<dyn Subscriber>)>,
    last_second: Option<i64>,
}

impl Worker {
    pub fn new(ctx: EngineContext, config: WorkerConfig) -> Self {
        Self {
            ctx,
            config,
            subscribers: Vec::new(),
            last_second: None,
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn subscribe(&mut self, subscription: Subscription, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.push((subscription, subscriber));
    }

    /// Apply the storage-provided worker configuration, if any.
    pub async fn configure(&mut self) -> Result<(), WorkerError> {
        if let Some(overrides) = self.ctx.storage.get_worker_configuration().await? {
            self.config.apply_overrides(&overrides);
        }
        Ok(())
    }

    /// Queue a new process instance and return its wfid.
    pub async fn launch(
        &self,
        tree: TreeNode,
        workitem: Workitem,
        variables: Option<Variables>,
    ) -> Result<String, WorkerError> {
        let wfid = Uuid::new_v4().to_string();
        let task = Task::launch(wfid.clone(), tree, workitem)
            .with_definition(DEFAULT_DEFINITION_ID)
            .with_variables(variables);
        self.ctx.storage.put_task(task).await?;
        info!(worker = %self.config.name, wfid = %wfid, "process launch queued");
        Ok(wfid)
    }

    /// One loop iteration.
    pub async fn step(&mut self) -> Result<StepOutcome, WorkerError> {
        let now = Utc::now();
        let mut outcome = StepOutcome::default();

        if self.last_second != Some(now.timestamp()) {
            self.last_second = Some(now.timestamp());
            outcome.schedules = self.fire_schedules(now).await?;
        }

        let tasks = self.ctx.storage.get_tasks().await?;
        outcome.tasks = tasks.len();
        for task in &tasks {
            self.process(task).await;
        }
        Ok(outcome)
    }

    /// Claim and fire every timer due at `now`. Returns how many fired.
    pub async fn fire_schedules(&self, now: DateTime<Utc>) -> Result<usize, WorkerError> {
        let mut fired = 0;
        for schedule in self.ctx.scheduler.due(now).await? {
            match self.ctx.scheduler.trigger(&schedule, now).await {
                Ok(true) => fired += 1,
                Ok(false) => debug!(schedule_id = %schedule.id, "timer claimed elsewhere"),
                Err(err) => error!(
                    worker = %self.config.name,
                    schedule_id = %schedule.id,
                    error = %err,
                    "timer failed"
                ),
            }
        }
        Ok(fired)
    }

    /// Claim and dispatch one task. Returns `false` if another worker
    /// claimed it first.
    ///
    /// Dispatch failures are logged and turned into an `error` task; they
    /// never escape.
    pub async fn process(&self, task: &Task) -> bool {
        match self.ctx.storage.delete_task(task).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(err) => {
                error!(worker = %self.config.name, task_id = %task.id, error = %err, "task claim failed");
                return false;
            }
        }

        match self.dispatch(task).await {
            Ok(()) => self.notify(task),
            Err(err) => {
                error!(
                    worker = %self.config.name,
                    action = %task.action,
                    fei = ?task.fei.as_ref().map(FlowExpressionId::to_storage_id),
                    error = %err,
                    "task dispatch failed"
                );
                self.put_error_task(task, &err).await;
            }
        }
        true
    }

    async fn dispatch(&self, task: &Task) -> Result<(), WorkerError> {
        match task.action {
            TaskAction::Launch => self.dispatch_launch(task).await,
            TaskAction::Apply => {
                let fei = required(task, task.fei.clone(), "missing fei")?;
                let tree = required(task, task.tree.clone(), "missing tree")?;
                let record = ExpressionRecord::new(
                    fei,
                    task.parent_id.clone(),
                    tree,
                    task.variables.clone(),
                    task.workitem.clone().unwrap_or_default(),
                );
                FlowExpression::new(&self.ctx, record).do_apply().await?;
                Ok(())
            }
            TaskAction::Reply => {
                let fei = required(task, task.fei.as_ref(), "missing fei")?;
                let Some(mut exp) = FlowExpression::fetch(&self.ctx, fei).await? else {
                    warn!(fei = %fei, "reply for missing expression");
                    return Ok(());
                };
                exp.do_reply(task.workitem.clone().unwrap_or_default())
                    .await?;
                Ok(())
            }
            TaskAction::Cancel => {
                let fei = required(task, task.fei.as_ref(), "missing fei")?;
                let Some(mut exp) = FlowExpression::fetch(&self.ctx, fei).await? else {
                    debug!(fei = %fei, "cancel for missing expression");
                    return Ok(());
                };
                exp.do_cancel(task.flavour.unwrap_or(CancelFlavour::Normal))
                    .await?;
                Ok(())
            }
            // Notifications and terminal events only reach subscribers.
            _ => Ok(()),
        }
    }

    async fn dispatch_launch(&self, task: &Task) -> Result<(), WorkerError> {
        let tree = required(task, task.tree.clone(), "missing tree")?;
        let fei = match &task.fei {
            Some(fei) => fei.clone(),
            None => {
                let wfid = required(task, task.wfid.clone(), "missing wfid")?;
                let definition = task.definition.as_deref().unwrap_or(DEFAULT_DEFINITION_ID);
                FlowExpressionId::root(wfid, definition)
            }
        };
        info!(worker = %self.config.name, fei = %fei, "launching");

        let record = ExpressionRecord::new(
            fei,
            task.parent_id.clone(),
            tree,
            Some(task.variables.clone().unwrap_or_default()),
            task.workitem.clone().unwrap_or_default(),
        );
        FlowExpression::new(&self.ctx, record).do_apply().await?;
        Ok(())
    }

    fn notify(&self, task: &Task) {
        for (subscription, subscriber) in &self.subscribers {
            if subscription.matches(task.action) {
                subscriber.notify(task);
            }
        }
    }

    async fn put_error_task(&self, task: &Task, err: &WorkerError) {
        let mut error_task = Task::new(TaskAction::Error)
            .with_parent_id(task.parent_id.clone())
            .with_variables(task.variables.clone())
            .with_error(ErrorRecord::apply(task.action, err.to_string()));
        error_task.fei = task.fei.clone();
        error_task.wfid = task
            .wfid
            .clone()
            .or_else(|| task.fei.as_ref().map(|fei| fei.wfid.clone()));
        error_task.tree = task.tree.clone();
        error_task.workitem = task.workitem.clone();

        if let Err(put_err) = self.ctx.storage.put_task(error_task).await {
            error!(error = %put_err, "failed to record dispatch error");
        }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        if let Err(err) = self.configure().await {
            warn!(error = %err, "worker configuration unavailable, using defaults");
        }
        info!(
            worker = %self.config.name,
            idle_sleep_ms = self.config.idle_sleep.as_millis() as u64,
            node_types = ?self.ctx.registry.names(),
            "worker started"
        );
        if self.config.reload_schedules_on_start {
            match self.ctx.scheduler.reload().await {
                Ok(count) => debug!(count, "timers reloaded"),
                Err(err) => error!(error = %err, "timer reload failed"),
            }
        }

        while !shutdown.is_cancelled() {
            let idle = match self.step().await {
                Ok(outcome) => outcome.is_idle(),
                Err(err) => {
                    error!(worker = %self.config.name, error = %err, "worker step failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.idle_sleep) => {}
                }
            } else {
                tokio::task::yield_now().await;
            }
        }
        info!(worker = %self.config.name, "worker shutting down");
    }
}

fn required<T>(task: &Task, value: Option<T>, reason: &'static str) -> Result<T, WorkerError> {
    value.ok_or(WorkerError::MalformedTask {
        action: task.action,
        reason,
    })
}

#[cfg(test)]
mod tests;
