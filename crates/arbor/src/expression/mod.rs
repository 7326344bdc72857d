//! Persisted expression state machine.
//!
//! A [`FlowExpression`] wraps one [`ExpressionRecord`] loaded for the
//! duration of a single task dispatch. Every state-affecting transition
//! writes the record back through the storage handle in the
//! [`EngineContext`]; nothing is cached between dispatches.

mod behavior;
mod handlers;
mod variables;

use std::sync::Arc;

use arbor_flow_core::{
    CancelFlavour, ExpressionRecord, ExpressionState, FlowExpressionId, TIMED_OUT_FIELD, Task,
    TaskAction, TreeNode, Variables, Workitem,
};
use arbor_scheduler_core::{
    DurationError, ExpressionMethod, Schedulable, ScheduleId, parse_duration,
};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backends::BackendError;
use crate::condition;
use crate::context::EngineContext;
use crate::scheduler::SchedulerError;

pub use self::behavior::{ExpressionBehavior, ExpressionRegistry};

#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("expression not found: {0}")]
    Missing(FlowExpressionId),
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),
    #[error("{fei} has no child at index {index}")]
    MissingChild { fei: FlowExpressionId, index: usize },
    #[error(transparent)]
    Duration(#[from] DurationError),
    /// Fault raised by node-type logic.
    #[error("{0}")]
    Raised(String),
}

/// Options for [`FlowExpression::launch_sub`].
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Start the sub-process detached from this expression.
    pub forget: bool,
    /// Variables merged over the sub-process scope.
    pub variables: Option<Variables>,
    /// Defaults to this expression's applied workitem.
    pub workitem: Option<Workitem>,
}

pub struct FlowExpression<'a> {
    ctx: &'a EngineContext,
    pub record: ExpressionRecord,
}

impl<'a> FlowExpression<'a> {
    pub fn new(ctx: &'a EngineContext, record: ExpressionRecord) -> Self {
        Self { ctx, record }
    }

    pub async fn fetch(
        ctx: &'a EngineContext,
        fei: &FlowExpressionId,
    ) -> Result<Option<Self>, ExpressionError> {
        let record = ctx.storage.get_expression(fei).await?;
        Ok(record.map(|record| Self::new(ctx, record)))
    }

    pub fn context(&self) -> &'a EngineContext {
        self.ctx
    }

    pub fn fei(&self) -> &FlowExpressionId {
        &self.record.fei
    }

    pub fn tree(&self) -> &TreeNode {
        self.record.tree()
    }

    /// Switch to a private copy of the tree and return it for mutation.
    ///
    /// Without a replacement the original tree is copied on first call
    /// only; later calls keep the existing override.
    pub fn update_tree(&mut self, replacement: Option<TreeNode>) -> &mut TreeNode {
        if let Some(tree) = replacement {
            self.record.updated_tree = Some(tree);
        }
        let original = &self.record.original_tree;
        self.record
            .updated_tree
            .get_or_insert_with(|| original.clone())
    }

    pub fn name(&self) -> &str {
        &self.tree().name
    }

    pub fn attributes(&self) -> &arbor_flow_core::Attributes {
        &self.tree().attributes
    }

    pub fn tree_children(&self) -> &[TreeNode] {
        &self.tree().children
    }

    pub async fn persist(&mut self) -> Result<(), ExpressionError> {
        self.record.modified_at = Utc::now();
        self.ctx.storage.put_expression(&self.record).await?;
        Ok(())
    }

    pub async fn unpersist(&self) -> Result<(), ExpressionError> {
        self.ctx.storage.delete_expression(&self.record.fei).await?;
        Ok(())
    }

    pub(crate) async fn put_task(&self, task: Task) -> Result<(), ExpressionError> {
        self.ctx.storage.put_task(task).await?;
        Ok(())
    }

    fn behavior(&self) -> Result<Arc<dyn ExpressionBehavior>, ExpressionError> {
        let name = self.name();
        self.ctx
            .registry
            .get(name)
            .ok_or_else(|| ExpressionError::UnknownNodeType(name.to_string()))
    }

    pub async fn do_apply(&mut self) -> Result<(), ExpressionError> {
        let behavior = self.behavior()?;

        let tree = self.tree();
        if condition::skip(tree.attribute("if"), tree.attribute("unless")) {
            debug!(fei = %self.record.fei, "guard skipped expression");
            let workitem = self.record.applied_workitem.clone();
            return self.put_reply_task(workitem).await;
        }

        let snapshot = self.record.clone();
        if let Err(err) = self.apply_with(behavior).await {
            warn!(fei = %snapshot.fei, error = %err, "apply failed, restoring expression");
            self.roll_back_apply(snapshot).await?;
            return Err(err);
        }
        Ok(())
    }

    async fn apply_with(
        &mut self,
        behavior: Arc<dyn ExpressionBehavior>,
    ) -> Result<(), ExpressionError> {
        if self.tree().attribute_flag("forget") {
            let former_parent = self.record.parent_id.clone();
            self.forget().await?;
            if let Some(parent) = former_parent {
                let mut workitem = self.record.applied_workitem.clone();
                workitem.fei = Some(self.record.fei.clone());
                self.put_task(
                    Task::new(TaskAction::Reply)
                        .with_fei(parent)
                        .with_workitem(workitem),
                )
                .await?;
            }
        }

        self.consider_tag().await?;
        self.consider_timeout().await?;
        self.persist().await?;

        behavior.apply(self).await
    }

    /// Drop the timer and tag variable a failed apply created, then put
    /// back the record as it was before the attempt.
    async fn roll_back_apply(&mut self, snapshot: ExpressionRecord) -> Result<(), ExpressionError> {
        if let Some(job_id) = self.record.timeout_job_id
            && snapshot.timeout_job_id != Some(job_id)
        {
            self.ctx.scheduler.unschedule(ScheduleId(job_id)).await?;
        }
        if let Some(tag) = self.record.tag.clone()
            && snapshot.tag.as_ref() != Some(&tag)
        {
            self.unset_variable(&tag).await?;
        }
        self.ctx.storage.put_expression(&snapshot).await?;
        self.record = snapshot;
        Ok(())
    }

    pub async fn do_reply(&mut self, workitem: Workitem) -> Result<(), ExpressionError> {
        if let Some(child) = &workitem.fei {
            self.record.children.retain(|fei| fei != child);
        }

        if !self.record.state.is_active() {
            if self.record.children.is_empty() {
                let mut workitem = workitem;
                if let Some(stamp) = self.record.applied_workitem.field(TIMED_OUT_FIELD)
                    && workitem.field(TIMED_OUT_FIELD).is_none()
                {
                    workitem.set_field(TIMED_OUT_FIELD, stamp.clone());
                }
                return self.reply_to_parent(workitem).await;
            }
            return self.persist().await;
        }

        let behavior = self.behavior()?;
        behavior.reply(self, workitem).await
    }

    pub async fn do_cancel(&mut self, flavour: CancelFlavour) -> Result<(), ExpressionError> {
        if self.record.state == ExpressionState::Failing && flavour == CancelFlavour::Timeout {
            debug!(fei = %self.record.fei, "failing expression ignores timeout");
            return Ok(());
        }

        self.record.state = match flavour {
            CancelFlavour::Normal => ExpressionState::Cancelling,
            CancelFlavour::Kill => ExpressionState::CancellingByKill,
            CancelFlavour::Timeout => ExpressionState::CancellingByTimeout,
        };
        if flavour == CancelFlavour::Timeout {
            let stamp = json!([self.record.fei, Utc::now()]);
            self.record.applied_workitem.set_field(TIMED_OUT_FIELD, stamp);
        }
        self.persist().await?;

        let behavior = self.behavior()?;
        behavior.cancel(self, flavour).await
    }

    /// Enter error handling: mark failing and cancel every pending child.
    pub async fn fail(&mut self) -> Result<(), ExpressionError> {
        self.record.state = ExpressionState::Failing;
        self.persist().await?;
        self.cancel_children(CancelFlavour::Normal).await
    }

    /// Forward a cancel to every pending child, or reply right away when
    /// there is none.
    pub async fn cancel_children(&mut self, flavour: CancelFlavour) -> Result<(), ExpressionError> {
        if self.record.children.is_empty() {
            let workitem = self.record.applied_workitem.clone();
            return self.reply_to_parent(workitem).await;
        }
        for child in &self.record.children {
            self.put_task(
                Task::new(TaskAction::Cancel)
                    .with_fei(child.clone())
                    .with_flavour(flavour),
            )
            .await?;
        }
        Ok(())
    }

    /// Detach from the parent, keeping a frozen copy of the visible
    /// variables.
    pub async fn forget(&mut self) -> Result<(), ExpressionError> {
        let variables = self.compile_variables().await?;
        let former_parent = self.record.parent_id.take();
        self.record.variables = Some(variables);

        self.put_task(
            Task::new(TaskAction::Forgotten)
                .with_fei(self.record.fei.clone())
                .with_parent_id(former_parent),
        )
        .await?;
        self.persist().await
    }

    pub async fn register_child(&mut self, fei: FlowExpressionId) -> Result<(), ExpressionError> {
        if !self.record.children.contains(&fei) {
            self.record.children.push(fei);
        }
        self.persist().await
    }

    pub async fn apply_child(
        &mut self,
        index: usize,
        workitem: Workitem,
        forget: bool,
    ) -> Result<FlowExpressionId, ExpressionError> {
        let tree = self
            .tree_children()
            .get(index)
            .cloned()
            .ok_or_else(|| ExpressionError::MissingChild {
                fei: self.record.fei.clone(),
                index,
            })?;
        let child_fei = self.record.fei.child(index);

        let (parent_id, variables) = if forget {
            (None, Some(self.compile_variables().await?))
        } else {
            self.register_child(child_fei.clone()).await?;
            (Some(self.record.fei.clone()), None)
        };

        self.put_task(
            Task::new(TaskAction::Apply)
                .with_fei(child_fei.clone())
                .with_parent_id(parent_id)
                .with_tree(tree)
                .with_variables(variables)
                .with_workitem(workitem),
        )
        .await?;
        Ok(child_fei)
    }

    /// Start `subtree` as a sub-process at expid `position`.
    pub async fn launch_sub(
        &mut self,
        position: impl Into<String>,
        subtree: TreeNode,
        options: LaunchOptions,
    ) -> Result<FlowExpressionId, ExpressionError> {
        let fei = FlowExpressionId {
            expid: position.into(),
            sub_wfid: Some(Uuid::new_v4().simple().to_string()),
            ..self.record.fei.clone()
        };

        let mut variables = if options.forget {
            self.compile_variables().await?
        } else {
            self.register_child(fei.clone()).await?;
            Variables::new()
        };
        variables.extend(options.variables.unwrap_or_default());

        let parent_id = (!options.forget).then(|| self.record.fei.clone());
        let workitem = options
            .workitem
            .unwrap_or_else(|| self.record.applied_workitem.clone());

        self.put_task(
            Task::new(TaskAction::Launch)
                .with_fei(fei.clone())
                .with_parent_id(parent_id)
                .with_tree(subtree)
                .with_variables(Some(variables))
                .with_workitem(workitem),
        )
        .await?;
        Ok(fei)
    }

    async fn consider_tag(&mut self) -> Result<(), ExpressionError> {
        let Some(tag) = self.tree().attribute_str("tag") else {
            return Ok(());
        };
        let fei = serde_json::to_value(&self.record.fei).map_err(BackendError::from)?;
        self.set_variable(&tag, fei).await?;
        self.record.tag = Some(tag.clone());

        self.put_task(
            Task::new(TaskAction::EnteredTag)
                .with_fei(self.record.fei.clone())
                .with_tag(tag)
                .with_workitem(self.record.applied_workitem.clone()),
        )
        .await
    }

    async fn consider_timeout(&mut self) -> Result<(), ExpressionError> {
        let Some(timeout) = self.tree().attribute_str("timeout") else {
            return Ok(());
        };
        let delay = parse_duration(&timeout)?;
        let schedulable = Schedulable::expression(self.record.fei.clone(), ExpressionMethod::Cancel);
        let schedule = self.ctx.scheduler.schedule_in(delay, schedulable).await?;
        self.record.timeout_at = Some(schedule.at);
        self.record.timeout_job_id = Some(schedule.id.0);
        Ok(())
    }
}
