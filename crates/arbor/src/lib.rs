//! Arbor - persisted expression state machine plus the worker and timer
//! service that drive it from a shared task queue.

pub mod backends;
pub mod condition;
pub mod config;
pub mod context;
pub mod expression;
pub mod expressions;
pub mod observability;
pub mod scheduler;
#[cfg(test)]
pub mod test_support;
pub mod worker;

pub use arbor_flow_core::{
    CancelFlavour, ErrorKind, ErrorRecord, ExpressionRecord, ExpressionState, FlowExpressionId,
    HandlerSpec, Task, TaskAction, TreeNode, Variables, Workitem,
};
pub use config::WorkerConfig;
pub use context::EngineContext;
pub use expression::{
    ExpressionBehavior, ExpressionError, ExpressionRegistry, FlowExpression, LaunchOptions,
};
pub use scheduler::{ScheduledService, Scheduler, SchedulerError};
pub use worker::{StepOutcome, Subscriber, Subscription, Worker, WorkerError};
