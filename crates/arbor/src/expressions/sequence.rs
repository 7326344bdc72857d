use arbor_flow_core::Workitem;

use crate::expression::{ExpressionBehavior, ExpressionError, FlowExpression};

/// Applies its children one after the other, handing each the workitem
/// the previous one replied with.
pub struct Sequence;

#[async_trait::async_trait]
impl ExpressionBehavior for Sequence {
    async fn apply(&self, exp: &mut FlowExpression<'_>) -> Result<(), ExpressionError> {
        let workitem = exp.record.applied_workitem.clone();
        if exp.tree_children().is_empty() {
            return exp.reply_to_parent(workitem).await;
        }
        exp.apply_child(0, workitem, false).await?;
        Ok(())
    }

    async fn reply(
        &self,
        exp: &mut FlowExpression<'_>,
        workitem: Workitem,
    ) -> Result<(), ExpressionError> {
        let index = workitem
            .fei
            .as_ref()
            .and_then(|fei| fei.tree_index_under(exp.fei()));
        let Some(index) = index else {
            // A sub-process reply does not move the sequence along.
            if exp.record.children.is_empty() {
                return exp.reply_to_parent(workitem).await;
            }
            return exp.persist().await;
        };
        let next = index + 1;
        if next < exp.tree_children().len() {
            exp.apply_child(next, workitem, false).await?;
            return Ok(());
        }
        exp.reply_to_parent(workitem).await
    }
}
