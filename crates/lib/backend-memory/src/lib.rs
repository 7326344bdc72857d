//! In-memory backend for tests and local runs.

mod core_backend;
mod scheduler_backend;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use arbor_core_backend::WorkerConfiguration;
use arbor_flow_core::{ExpressionRecord, FlowExpressionId, Task};
use arbor_scheduler_core::{Schedule, ScheduleId};

/// Backend that keeps expressions, tasks and timers in process memory.
///
/// Clones share the same state, so several workers built from clones of
/// one backend contend for the same queue.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    expressions: Arc<Mutex<HashMap<String, ExpressionRecord>>>,
    tasks: Arc<Mutex<VecDeque<Task>>>,
    schedules: Arc<Mutex<HashMap<ScheduleId, Schedule>>>,
    worker_configuration: Option<WorkerConfiguration>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker_configuration(mut self, configuration: WorkerConfiguration) -> Self {
        self.worker_configuration = Some(configuration);
        self
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks
            .lock()
            .expect("tasks poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn expressions(&self) -> Vec<ExpressionRecord> {
        self.expressions
            .lock()
            .expect("expressions poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn expression(&self, fei: &FlowExpressionId) -> Option<ExpressionRecord> {
        self.expressions
            .lock()
            .expect("expressions poisoned")
            .get(&fei.to_storage_id())
            .cloned()
    }

    pub fn schedules(&self) -> Vec<Schedule> {
        self.schedules
            .lock()
            .expect("schedules poisoned")
            .values()
            .cloned()
            .collect()
    }
}
