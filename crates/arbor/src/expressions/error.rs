use crate::expression::{ExpressionBehavior, ExpressionError, FlowExpression};

/// Raises an application fault carrying its `message` attribute.
pub struct RaiseError;

#[async_trait::async_trait]
impl ExpressionBehavior for RaiseError {
    async fn apply(&self, exp: &mut FlowExpression<'_>) -> Result<(), ExpressionError> {
        let message = exp
            .tree()
            .attribute_str("message")
            .unwrap_or_else(|| format!("error raised at {}", exp.fei()));
        Err(ExpressionError::Raised(message))
    }
}
