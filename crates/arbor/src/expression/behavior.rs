use std::collections::HashMap;
use std::sync::Arc;

use arbor_flow_core::{CancelFlavour, Workitem};

use super::{ExpressionError, FlowExpression};
use crate::expressions;

/// Node-type logic plugged into the expression envelope.
///
/// `apply` runs once the envelope has handled guards, `forget`, tagging
/// and timeouts. The defaults for `reply` and `cancel` reply to the parent
/// and forward the cancel to every pending child.
#[async_trait::async_trait]
pub trait ExpressionBehavior: Send + Sync {
    async fn apply(&self, exp: &mut FlowExpression<'_>) -> Result<(), ExpressionError>;

    async fn reply(
        &self,
        exp: &mut FlowExpression<'_>,
        workitem: Workitem,
    ) -> Result<(), ExpressionError> {
        exp.reply_to_parent(workitem).await
    }

    async fn cancel(
        &self,
        exp: &mut FlowExpression<'_>,
        flavour: CancelFlavour,
    ) -> Result<(), ExpressionError> {
        exp.cancel_children(flavour).await
    }
}

/// Node-type name to behavior mapping, populated at startup.
#[derive(Clone, Default)]
pub struct ExpressionRegistry {
    behaviors: HashMap<String, Arc<dyn ExpressionBehavior>>,
}

impl ExpressionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        expressions::register_builtins(&mut registry);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, behavior: Arc<dyn ExpressionBehavior>) {
        self.behaviors.insert(name.into(), behavior);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExpressionBehavior>> {
        self.behaviors.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.behaviors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
