//! Timer service.
//!
//! Timers are persisted through the storage timer capability; workers poll them
//! once per second and call [`Scheduler::trigger`] on the due ones. A
//! timer targets either an expression (`reply` or `cancel`) or a named
//! service registered with [`Scheduler::register_service`].

use std::collections::HashMap;
use std::sync::Arc;

use arbor_flow_core::{CancelFlavour, Task, TaskAction};
use arbor_scheduler_core::{
    ExpressionMethod, Schedulable, Schedule, ScheduleError, ScheduleId, fire_time,
};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backends::{BackendError, Storage};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("no scheduled service named '{0}'")]
    UnknownService(String),
    #[error("scheduled service '{name}' failed: {source}")]
    Service {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Long-lived service a timer can fire.
#[async_trait::async_trait]
pub trait ScheduledService: Send + Sync {
    async fn call(&self, schedule: &Schedule) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct Scheduler {
    storage: Arc<dyn Storage>,
    services: Arc<RwLock<HashMap<String, Arc<dyn ScheduledService>>>>,
}

impl Scheduler {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            services: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register_service(
        &self,
        name: impl Into<String>,
        service: Arc<dyn ScheduledService>,
    ) {
        self.services.write().await.insert(name.into(), service);
    }

    pub async fn schedule_at(
        &self,
        at: DateTime<Utc>,
        schedulable: Schedulable,
    ) -> Result<Schedule, SchedulerError> {
        self.store(Schedule::at(at, schedulable)).await
    }

    pub async fn schedule_in(
        &self,
        delay: Duration,
        schedulable: Schedulable,
    ) -> Result<Schedule, SchedulerError> {
        self.schedule_at(fire_time(Utc::now(), delay)?, schedulable)
            .await
    }

    pub async fn schedule_every(
        &self,
        period: Duration,
        schedulable: Schedulable,
    ) -> Result<Schedule, SchedulerError> {
        self.store(Schedule::every(period, Utc::now(), schedulable)?)
            .await
    }

    pub async fn schedule_cron(
        &self,
        expression: &str,
        schedulable: Schedulable,
    ) -> Result<Schedule, SchedulerError> {
        let schedule = Schedule::cron(expression, Utc::now(), schedulable)?;
        self.store(schedule).await
    }

    async fn store(&self, schedule: Schedule) -> Result<Schedule, SchedulerError> {
        self.storage.put_schedule(&schedule).await?;
        debug!(
            schedule_id = %schedule.id,
            kind = %schedule.kind,
            at = %schedule.at,
            "timer scheduled"
        );
        Ok(schedule)
    }

    /// Returns whether a pending timer was removed.
    pub async fn unschedule(&self, id: ScheduleId) -> Result<bool, SchedulerError> {
        Ok(self.storage.delete_schedule(id).await?)
    }

    pub async fn jobs(&self) -> Result<Vec<Schedule>, SchedulerError> {
        Ok(self.storage.list_schedules().await?)
    }

    /// Drop every pending timer. Returns how many were removed.
    pub async fn purge(&self) -> Result<usize, SchedulerError> {
        let mut removed = 0;
        for schedule in self.storage.list_schedules().await? {
            if self.storage.delete_schedule(schedule.id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Claim the occurrence of `schedule` due at `schedule.at` and fire it.
    ///
    /// Returns `false` when another worker claimed it first.
    pub async fn trigger(
        &self,
        schedule: &Schedule,
        now: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        let next_at = schedule.next_run_after(now)?;
        if !self.storage.claim_schedule(schedule, next_at).await? {
            return Ok(false);
        }
        self.fire(schedule).await?;
        Ok(true)
    }

    async fn fire(&self, schedule: &Schedule) -> Result<(), SchedulerError> {
        match &schedule.schedulable {
            Schedulable::Expression { fei, method } => {
                let Some(record) = self.storage.get_expression(fei).await? else {
                    warn!(
                        schedule_id = %schedule.id,
                        fei = %fei,
                        "scheduled expression is gone, unscheduling"
                    );
                    self.storage.delete_schedule(schedule.id).await?;
                    return Ok(());
                };
                let task = match method {
                    ExpressionMethod::Reply => Task::new(TaskAction::Reply)
                        .with_fei(fei.clone())
                        .with_workitem(record.applied_workitem),
                    ExpressionMethod::Cancel => Task::new(TaskAction::Cancel)
                        .with_fei(fei.clone())
                        .with_flavour(CancelFlavour::Timeout),
                };
                debug!(fei = %fei, action = %task.action, "timer fired");
                self.storage.put_task(task).await?;
                Ok(())
            }
            Schedulable::Service { name } => {
                let service = self
                    .services
                    .read()
                    .await
                    .get(name)
                    .cloned()
                    .ok_or_else(|| SchedulerError::UnknownService(name.clone()))?;
                service
                    .call(schedule)
                    .await
                    .map_err(|source| SchedulerError::Service {
                        name: name.clone(),
                        source,
                    })
            }
        }
    }

    /// Re-register expression timeouts from their persisted `timeout_at`.
    ///
    /// Only needed when the timer store lost its state; expressions whose
    /// timeout timer still exists are left alone. Returns how many timers
    /// were re-created.
    pub async fn reload(&self) -> Result<usize, SchedulerError> {
        let mut reloaded = 0;
        for mut record in self.storage.list_expressions().await? {
            let Some(timeout_at) = record.timeout_at else {
                continue;
            };
            if let Some(job_id) = record.timeout_job_id
                && self
                    .storage
                    .get_schedule(ScheduleId(job_id))
                    .await?
                    .is_some()
            {
                continue;
            }
            let schedulable = Schedulable::expression(record.fei.clone(), ExpressionMethod::Cancel);
            let schedule = self.schedule_at(timeout_at, schedulable).await?;
            record.timeout_job_id = Some(schedule.id.0);
            record.modified_at = Utc::now();
            self.storage.put_expression(&record).await?;
            reloaded += 1;
        }
        if reloaded > 0 {
            info!(count = reloaded, "reloaded expression timeouts");
        }
        Ok(reloaded)
    }

    /// Due timers of every kind, one-shot and interval first.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Schedule>, SchedulerError> {
        let mut due = self.storage.get_at_schedules(now).await?;
        due.extend(self.storage.get_cron_schedules(now).await?);
        Ok(due)
    }
}
