//! Schedule types.

use arbor_flow_core::FlowExpressionId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CronError, next_cron_run_after};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Cron(#[from] CronError),
    #[error("fire time {delay} after {from} is out of range")]
    OutOfRange {
        from: DateTime<Utc>,
        delay: Duration,
    },
}

/// `from + delay`, or an error when the result is not representable.
pub fn fire_time(from: DateTime<Utc>, delay: Duration) -> Result<DateTime<Utc>, ScheduleError> {
    from.checked_add_signed(delay)
        .ok_or(ScheduleError::OutOfRange { from, delay })
}

/// Unique identifier for a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleId(pub Uuid);

impl ScheduleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScheduleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type of schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    /// Fires once at a point in time.
    At,
    /// Fires repeatedly at a fixed period.
    Every,
    Cron,
}

impl ScheduleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::At => "at",
            Self::Every => "every",
            Self::Cron => "cron",
        }
    }
}

impl std::fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Protocol entry point a timer drives on an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionMethod {
    Reply,
    Cancel,
}

/// What a schedule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedulable {
    Expression {
        fei: FlowExpressionId,
        method: ExpressionMethod,
    },
    /// A long-lived service registered with the scheduler under `name`.
    Service { name: String },
}

impl Schedulable {
    pub fn expression(fei: FlowExpressionId, method: ExpressionMethod) -> Self {
        Self::Expression { fei, method }
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self::Service { name: name.into() }
    }
}

/// A persisted timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub kind: ScheduleKind,
    pub schedulable: Schedulable,
    /// Next fire time.
    pub at: DateTime<Utc>,
    pub interval_ms: Option<i64>,
    pub cron_expression: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    pub fn at(at: DateTime<Utc>, schedulable: Schedulable) -> Self {
        Self {
            id: ScheduleId::new(),
            kind: ScheduleKind::At,
            schedulable,
            at,
            interval_ms: None,
            cron_expression: None,
            created_at: Utc::now(),
        }
    }

    /// First fire is one period from `now`.
    pub fn every(
        period: Duration,
        now: DateTime<Utc>,
        schedulable: Schedulable,
    ) -> Result<Self, ScheduleError> {
        Ok(Self {
            kind: ScheduleKind::Every,
            interval_ms: Some(period.num_milliseconds()),
            ..Self::at(fire_time(now, period)?, schedulable)
        })
    }

    pub fn cron(
        expression: impl Into<String>,
        now: DateTime<Utc>,
        schedulable: Schedulable,
    ) -> Result<Self, ScheduleError> {
        let expression = expression.into();
        let at = next_cron_run_after(&expression, now)?;
        Ok(Self {
            kind: ScheduleKind::Cron,
            cron_expression: Some(expression),
            ..Self::at(at, schedulable)
        })
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.at <= now
    }

    /// Fire time following an occurrence handled at `now`, or `None` for
    /// one-shot timers.
    ///
    /// Missed periods are skipped rather than replayed.
    pub fn next_run_after(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        match self.kind {
            ScheduleKind::At => Ok(None),
            ScheduleKind::Every => {
                let period = Duration::milliseconds(self.interval_ms.unwrap_or(0).max(1));
                let next = fire_time(self.at, period)?;
                let next = if next > now { next } else { fire_time(now, period)? };
                Ok(Some(next))
            }
            ScheduleKind::Cron => {
                let expression = self.cron_expression.as_deref().unwrap_or_default();
                Ok(Some(next_cron_run_after(expression, now)?))
            }
        }
    }

    /// Fei targeted by an expression schedulable.
    pub fn fei(&self) -> Option<&FlowExpressionId> {
        match &self.schedulable {
            Schedulable::Expression { fei, .. } => Some(fei),
            Schedulable::Service { .. } => None,
        }
    }
}
