//! Storage capabilities the engine is built against.

pub use arbor_core_backend::{
    BackendError, BackendResult, CoreBackend, WorkerConfiguration,
};
pub use arbor_scheduler_backend::SchedulerBackend;

/// Everything the engine needs from shared storage.
pub trait Storage: CoreBackend + SchedulerBackend {}

impl<T> Storage for T where T: CoreBackend + SchedulerBackend + ?Sized {}
