use chrono::{DateTime, Utc};

pub use arbor_backends_core::{BackendError, BackendResult};
use arbor_scheduler_core::{Schedule, ScheduleId};

/// Backend capability for timer persistence.
#[async_trait::async_trait]
pub trait SchedulerBackend: Send + Sync {
    async fn put_schedule(&self, schedule: &Schedule) -> BackendResult<()>;
    async fn get_schedule(&self, id: ScheduleId) -> BackendResult<Option<Schedule>>;
    async fn delete_schedule(&self, id: ScheduleId) -> BackendResult<bool>;
    async fn list_schedules(&self) -> BackendResult<Vec<Schedule>>;
    /// Due one-shot and interval timers.
    async fn get_at_schedules(&self, now: DateTime<Utc>) -> BackendResult<Vec<Schedule>>;
    /// Due cron timers.
    async fn get_cron_schedules(&self, now: DateTime<Utc>) -> BackendResult<Vec<Schedule>>;
    /// Claim one occurrence of `schedule`.
    ///
    /// Succeeds only while the stored fire time still equals `schedule.at`.
    /// On success the timer is deleted (`next_at == None`) or moved to
    /// `next_at`, so concurrent pollers fire each occurrence once.
    async fn claim_schedule(
        &self,
        schedule: &Schedule,
        next_at: Option<DateTime<Utc>>,
    ) -> BackendResult<bool>;
}
