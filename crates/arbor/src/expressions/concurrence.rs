use arbor_flow_core::Workitem;

use crate::expression::{ExpressionBehavior, ExpressionError, FlowExpression};

/// Applies every child at once and replies when all of them have.
///
/// Replying workitems are merged field by field into the applied
/// workitem, later replies winning.
pub struct Concurrence;

#[async_trait::async_trait]
impl ExpressionBehavior for Concurrence {
    async fn apply(&self, exp: &mut FlowExpression<'_>) -> Result<(), ExpressionError> {
        let workitem = exp.record.applied_workitem.clone();
        let count = exp.tree_children().len();
        if count == 0 {
            return exp.reply_to_parent(workitem).await;
        }
        for index in 0..count {
            exp.apply_child(index, workitem.clone(), false).await?;
        }
        Ok(())
    }

    async fn reply(
        &self,
        exp: &mut FlowExpression<'_>,
        workitem: Workitem,
    ) -> Result<(), ExpressionError> {
        exp.record.applied_workitem.fields.extend(workitem.fields);
        if exp.record.children.is_empty() {
            let merged = exp.record.applied_workitem.clone();
            return exp.reply_to_parent(merged).await;
        }
        exp.persist().await
    }
}
