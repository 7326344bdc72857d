//! Built-in node types.

mod concurrence;
mod error;
mod noop;
mod sequence;
mod wait;

use std::sync::Arc;

use crate::expression::ExpressionRegistry;

pub use self::concurrence::Concurrence;
pub use self::error::RaiseError;
pub use self::noop::Noop;
pub use self::sequence::Sequence;
pub use self::wait::Wait;

pub fn register_builtins(registry: &mut ExpressionRegistry) {
    registry.register("sequence", Arc::new(Sequence));
    registry.register("concurrence", Arc::new(Concurrence));
    registry.register("noop", Arc::new(Noop));
    registry.register("echo", Arc::new(Noop));
    registry.register("wait", Arc::new(Wait));
    registry.register("error", Arc::new(RaiseError));
}
