use arbor_scheduler_core::{ExpressionMethod, Schedulable, parse_duration};

use crate::expression::{ExpressionBehavior, ExpressionError, FlowExpression};

/// Holds the workitem until replied to.
///
/// With a `for` duration the reply comes from a timer; without one the
/// node waits for an external `reply` task, like a participant would.
pub struct Wait;

#[async_trait::async_trait]
impl ExpressionBehavior for Wait {
    async fn apply(&self, exp: &mut FlowExpression<'_>) -> Result<(), ExpressionError> {
        let Some(duration) = exp.tree().attribute_str("for") else {
            return Ok(());
        };
        let delay = parse_duration(&duration)?;
        let schedulable = Schedulable::expression(exp.fei().clone(), ExpressionMethod::Reply);
        exp.context()
            .scheduler
            .schedule_in(delay, schedulable)
            .await?;
        Ok(())
    }
}
