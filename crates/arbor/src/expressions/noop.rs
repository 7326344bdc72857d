use tracing::info;

use crate::expression::{ExpressionBehavior, ExpressionError, FlowExpression};

/// Replies immediately. Registered as `noop` and `echo`; an `echo` with a
/// `message` attribute logs it first.
pub struct Noop;

#[async_trait::async_trait]
impl ExpressionBehavior for Noop {
    async fn apply(&self, exp: &mut FlowExpression<'_>) -> Result<(), ExpressionError> {
        if let Some(message) = exp.tree().attribute_str("message") {
            info!(fei = %exp.fei(), message = %message, "echo");
        }
        let workitem = exp.record.applied_workitem.clone();
        exp.reply_to_parent(workitem).await
    }
}
