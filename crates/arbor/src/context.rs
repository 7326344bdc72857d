use std::sync::Arc;

use crate::backends::Storage;
use crate::expression::ExpressionRegistry;
use crate::scheduler::Scheduler;

/// Handles shared by every state-machine transition and worker step.
#[derive(Clone)]
pub struct EngineContext {
    pub storage: Arc<dyn Storage>,
    pub registry: Arc<ExpressionRegistry>,
    pub scheduler: Scheduler,
}

impl EngineContext {
    pub fn new(storage: Arc<dyn Storage>, registry: ExpressionRegistry) -> Self {
        let scheduler = Scheduler::new(Arc::clone(&storage));
        Self {
            storage,
            registry: Arc::new(registry),
            scheduler,
        }
    }

    /// Context with the built-in node types registered.
    pub fn with_builtins(storage: Arc<dyn Storage>) -> Self {
        Self::new(storage, ExpressionRegistry::with_builtins())
    }
}
