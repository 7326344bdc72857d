use arbor_core_backend::{BackendResult, CoreBackend, WorkerConfiguration};
use arbor_flow_core::{ExpressionRecord, FlowExpressionId, Task};

#[async_trait::async_trait]
impl CoreBackend for crate::MemoryBackend {
    async fn put_expression(&self, record: &ExpressionRecord) -> BackendResult<()> {
        let mut guard = self.expressions.lock().expect("expressions poisoned");
        guard.insert(record.storage_id(), record.clone());
        Ok(())
    }

    async fn get_expression(
        &self,
        fei: &FlowExpressionId,
    ) -> BackendResult<Option<ExpressionRecord>> {
        let guard = self.expressions.lock().expect("expressions poisoned");
        Ok(guard.get(&fei.to_storage_id()).cloned())
    }

    async fn delete_expression(&self, fei: &FlowExpressionId) -> BackendResult<bool> {
        let mut guard = self.expressions.lock().expect("expressions poisoned");
        Ok(guard.remove(&fei.to_storage_id()).is_some())
    }

    async fn list_expressions(&self) -> BackendResult<Vec<ExpressionRecord>> {
        let guard = self.expressions.lock().expect("expressions poisoned");
        Ok(guard.values().cloned().collect())
    }

    async fn put_task(&self, task: Task) -> BackendResult<()> {
        let mut guard = self.tasks.lock().expect("tasks poisoned");
        guard.push_back(task);
        Ok(())
    }

    async fn get_tasks(&self) -> BackendResult<Vec<Task>> {
        let guard = self.tasks.lock().expect("tasks poisoned");
        Ok(guard.iter().cloned().collect())
    }

    async fn delete_task(&self, task: &Task) -> BackendResult<bool> {
        let mut guard = self.tasks.lock().expect("tasks poisoned");
        match guard.iter().position(|queued| queued.id == task.id) {
            Some(index) => {
                guard.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_worker_configuration(&self) -> BackendResult<Option<WorkerConfiguration>> {
        Ok(self.worker_configuration.clone())
    }
}
