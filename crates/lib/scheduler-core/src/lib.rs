//! Persisted timer records, cron/interval next-run math and duration strings.

mod recurrence;
mod duration;
mod types;

pub use self::recurrence::{CronError, next_cron_run_after};
pub use self::duration::{DurationError, parse_duration};
pub use self::types::{
    ExpressionMethod, Schedulable, Schedule, ScheduleError, ScheduleId, ScheduleKind, fire_time,
};
