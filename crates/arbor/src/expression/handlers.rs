use arbor_flow_core::{
    ErrorRecord, ExpressionState, FAILED_FIELD, HandlerSpec, Task, TaskAction, TreeNode, Workitem,
};
use arbor_scheduler_core::ScheduleId;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{ExpressionError, FlowExpression};

impl FlowExpression<'_> {
    /// Leave this node: release its tag and timeout, then either run the
    /// handler matching its state or reply upward.
    pub async fn reply_to_parent(&mut self, workitem: Workitem) -> Result<(), ExpressionError> {
        self.leave_tag().await?;
        if let Some(job_id) = self.record.timeout_job_id.take() {
            self.ctx.scheduler.unschedule(ScheduleId(job_id)).await?;
            self.record.timeout_at = None;
        }

        match self.record.state {
            ExpressionState::Failing => self.trigger_on_error(workitem).await,
            ExpressionState::Cancelling if self.record.on_cancel.is_some() => {
                self.trigger_on_cancel().await
            }
            ExpressionState::CancellingByTimeout if self.record.on_timeout.is_some() => {
                self.trigger_on_timeout().await
            }
            state => {
                if state.is_active() {
                    self.propagate_updated_tree().await?;
                }
                self.put_reply_task(workitem).await
            }
        }
    }

    /// Remove this node from storage and emit its outbound task: a reply
    /// to the parent, or a terminal event for the process.
    pub async fn put_reply_task(&mut self, mut workitem: Workitem) -> Result<(), ExpressionError> {
        self.unpersist().await?;
        workitem.fei = Some(self.record.fei.clone());

        let task = match &self.record.parent_id {
            Some(parent) => Task::new(TaskAction::Reply).with_fei(parent.clone()),
            None => {
                let action = match self.record.state {
                    ExpressionState::Cancelling => TaskAction::Cancelled,
                    ExpressionState::CancellingByKill => TaskAction::Killed,
                    _ => TaskAction::Terminated,
                };
                info!(wfid = %self.record.fei.wfid, action = %action, "process finished");
                Task::new(action).with_wfid(self.record.fei.wfid.clone())
            }
        };
        self.put_task(task.with_workitem(workitem)).await
    }

    pub async fn trigger_on_cancel(&mut self) -> Result<(), ExpressionError> {
        let Some(handler) = self.record.on_cancel.clone() else {
            return Ok(());
        };
        let tree = self.handler_tree(handler);
        self.apply_tree(tree, "on_cancel").await
    }

    pub async fn trigger_on_error(&mut self, mut workitem: Workitem) -> Result<(), ExpressionError> {
        match self.record.on_error.clone() {
            None => {
                workitem.set_field(FAILED_FIELD, json!([self.record.fei, Utc::now()]));
                self.put_reply_task(workitem).await
            }
            // The cancellation that brought the node here is the undo.
            Some(handler) if handler.is_keyword("undo") => self.put_reply_task(workitem).await,
            Some(handler) => {
                let tree = self.handler_tree(handler);
                self.apply_tree(tree, "on_error").await
            }
        }
    }

    pub async fn trigger_on_timeout(&mut self) -> Result<(), ExpressionError> {
        let Some(handler) = self.record.on_timeout.clone() else {
            return Ok(());
        };
        if handler.is_keyword("error") {
            return self.raise_timeout_error().await;
        }
        let tree = self.handler_tree(handler);
        self.apply_tree(tree, "on_timeout").await
    }

    fn handler_tree(&self, handler: HandlerSpec) -> TreeNode {
        match handler {
            HandlerSpec::Named(name) if name == "redo" => self.tree().clone(),
            HandlerSpec::Named(name) => TreeNode::new(name),
            HandlerSpec::Tree(tree) => tree,
        }
    }

    /// Re-apply `tree` in this node's place: same fei, parent, applied
    /// workitem and variables.
    async fn apply_tree(&mut self, mut tree: TreeNode, trigger: &str) -> Result<(), ExpressionError> {
        tree.attributes.insert("_triggered".to_string(), json!(trigger));
        debug!(fei = %self.record.fei, trigger, handler = %tree.name, "applying handler");

        self.unpersist().await?;
        self.put_task(
            Task::new(TaskAction::Apply)
                .with_fei(self.record.fei.clone())
                .with_parent_id(self.record.parent_id.clone())
                .with_tree(tree)
                .with_workitem(self.record.applied_workitem.clone())
                .with_variables(self.record.variables.clone()),
        )
        .await
    }

    /// Emit an `error` event for an expiry configured as `on_timeout: error`.
    ///
    /// The node stays in storage so the fault can be inspected or replayed.
    async fn raise_timeout_error(&mut self) -> Result<(), ExpressionError> {
        let timeout = self.tree().attribute_str("timeout");
        warn!(fei = %self.record.fei, timeout = ?timeout, "expression timed out");

        self.persist().await?;
        self.put_task(
            Task::new(TaskAction::Error)
                .with_fei(self.record.fei.clone())
                .with_parent_id(self.record.parent_id.clone())
                .with_tree(self.tree().clone())
                .with_workitem(self.record.applied_workitem.clone())
                .with_variables(self.record.variables.clone())
                .with_error(ErrorRecord::timeout(timeout)),
        )
        .await
    }

    /// Splice this node's tree override into its parent at its child index.
    async fn propagate_updated_tree(&self) -> Result<(), ExpressionError> {
        let (Some(updated), Some(parent_id)) = (&self.record.updated_tree, &self.record.parent_id)
        else {
            return Ok(());
        };
        // Sub-processes are not tree children of their parent.
        let Some(index) = self.record.fei.tree_index_under(parent_id) else {
            return Ok(());
        };
        let Some(mut parent) = FlowExpression::fetch(self.ctx, parent_id).await? else {
            warn!(fei = %self.record.fei, parent = %parent_id, "parent gone, tree change dropped");
            return Ok(());
        };

        let slot = parent
            .update_tree(None)
            .children
            .get_mut(index)
            .ok_or_else(|| ExpressionError::MissingChild {
                fei: parent_id.clone(),
                index,
            })?;
        *slot = updated.clone();
        parent.persist().await
    }

    async fn leave_tag(&mut self) -> Result<(), ExpressionError> {
        let Some(tag) = self.record.tag.take() else {
            return Ok(());
        };
        self.unset_variable(&tag).await?;
        self.put_task(
            Task::new(TaskAction::LeftTag)
                .with_fei(self.record.fei.clone())
                .with_tag(tag)
                .with_workitem(self.record.applied_workitem.clone()),
        )
        .await
    }
}
