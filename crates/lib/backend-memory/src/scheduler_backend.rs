use arbor_scheduler_backend::{BackendResult, SchedulerBackend};
use arbor_scheduler_core::{Schedule, ScheduleId, ScheduleKind};
use chrono::{DateTime, Utc};

impl crate::MemoryBackend {
    fn due_schedules(
        &self,
        now: DateTime<Utc>,
        matches: impl Fn(ScheduleKind) -> bool,
    ) -> Vec<Schedule> {
        let guard = self.schedules.lock().expect("schedules poisoned");
        let mut due: Vec<Schedule> = guard
            .values()
            .filter(|schedule| matches(schedule.kind) && schedule.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|schedule| schedule.at);
        due
    }
}

#[async_trait::async_trait]
impl SchedulerBackend for crate::MemoryBackend {
    async fn put_schedule(&self, schedule: &Schedule) -> BackendResult<()> {
        let mut guard = self.schedules.lock().expect("schedules poisoned");
        guard.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn get_schedule(&self, id: ScheduleId) -> BackendResult<Option<Schedule>> {
        let guard = self.schedules.lock().expect("schedules poisoned");
        Ok(guard.get(&id).cloned())
    }

    async fn delete_schedule(&self, id: ScheduleId) -> BackendResult<bool> {
        let mut guard = self.schedules.lock().expect("schedules poisoned");
        Ok(guard.remove(&id).is_some())
    }

    async fn list_schedules(&self) -> BackendResult<Vec<Schedule>> {
        let guard = self.schedules.lock().expect("schedules poisoned");
        let mut schedules: Vec<Schedule> = guard.values().cloned().collect();
        schedules.sort_by_key(|schedule| schedule.at);
        Ok(schedules)
    }

    async fn get_at_schedules(&self, now: DateTime<Utc>) -> BackendResult<Vec<Schedule>> {
        Ok(self.due_schedules(now, |kind| {
            matches!(kind, ScheduleKind::At | ScheduleKind::Every)
        }))
    }

    async fn get_cron_schedules(&self, now: DateTime<Utc>) -> BackendResult<Vec<Schedule>> {
        Ok(self.due_schedules(now, |kind| kind == ScheduleKind::Cron))
    }

    async fn claim_schedule(
        &self,
        schedule: &Schedule,
        next_at: Option<DateTime<Utc>>,
    ) -> BackendResult<bool> {
        let mut guard = self.schedules.lock().expect("schedules poisoned");
        let Some(stored) = guard.get_mut(&schedule.id) else {
            return Ok(false);
        };
        if stored.at != schedule.at {
            return Ok(false);
        }
        match next_at {
            Some(next_at) => stored.at = next_at,
            None => {
                guard.remove(&schedule.id);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use arbor_scheduler_core::Schedulable;
    use chrono::Duration;

    use super::*;
    use crate::MemoryBackend;

    #[tokio::test]
    async fn test_due_lookups_split_by_kind() {
        let backend = MemoryBackend::new();
        let now = Utc::now();
        let one_shot = Schedule::at(now - Duration::seconds(1), Schedulable::service("a"));
        let later = Schedule::at(now + Duration::hours(1), Schedulable::service("b"));
        let mut cron = Schedule::cron("* * * * *", now, Schedulable::service("c")).unwrap();
        cron.at = now - Duration::seconds(5);
        for schedule in [&one_shot, &later, &cron] {
            backend.put_schedule(schedule).await.unwrap();
        }

        let at = backend.get_at_schedules(now).await.unwrap();
        assert_eq!(at, vec![one_shot]);
        let crons = backend.get_cron_schedules(now).await.unwrap();
        assert_eq!(crons, vec![cron]);
        assert_eq!(backend.list_schedules().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_claim_is_compare_and_set_on_fire_time() {
        let backend = MemoryBackend::new();
        let now = Utc::now();
        let schedule =
            Schedule::every(Duration::seconds(10), now, Schedulable::service("tick")).unwrap();
        backend.put_schedule(&schedule).await.unwrap();

        let next = schedule.at + Duration::seconds(10);
        assert!(backend.claim_schedule(&schedule, Some(next)).await.unwrap());
        // A second poller holding the same snapshot loses.
        assert!(!backend.claim_schedule(&schedule, Some(next)).await.unwrap());

        let stored = backend.get_schedule(schedule.id).await.unwrap().unwrap();
        assert_eq!(stored.at, next);
    }

    #[tokio::test]
    async fn test_claiming_one_shot_removes_it() {
        let backend = MemoryBackend::new();
        let schedule = Schedule::at(Utc::now(), Schedulable::service("once"));
        backend.put_schedule(&schedule).await.unwrap();

        assert!(backend.claim_schedule(&schedule, None).await.unwrap());
        assert!(backend.get_schedule(schedule.id).await.unwrap().is_none());
        assert!(!backend.claim_schedule(&schedule, None).await.unwrap());
        assert!(!backend.delete_schedule(schedule.id).await.unwrap());
    }
}
