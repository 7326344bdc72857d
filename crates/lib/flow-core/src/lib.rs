//! Data model shared by the arbor state machine, scheduler and backends.
//!
//! Nothing in here performs I/O: these are the values that get persisted
//! (expression records), queued (tasks) and threaded through execution
//! (workitems, trees).

mod expression;
mod fei;
mod task;
mod tree;
mod workitem;

pub use self::expression::{ExpressionRecord, ExpressionState, HandlerSpec};
pub use self::fei::FlowExpressionId;
pub use self::task::{CancelFlavour, ErrorKind, ErrorRecord, Task, TaskAction};
pub use self::tree::{Attributes, TreeNode};
pub use self::workitem::{FAILED_FIELD, Fields, TIMED_OUT_FIELD, Workitem};

/// Variables visible to an expression and its descendants.
pub type Variables = serde_json::Map<String, serde_json::Value>;
