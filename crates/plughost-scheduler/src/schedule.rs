use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, SchedulerError};
use crate::types::{ScheduleKind, ScheduleSpec};

/// Runtime schedule state for one worker host.
///
/// Recurring offsets are always measured from the fixed anchor, never from
/// the previous wake-up, so the due instants do not drift no matter how late
/// the host wakes or how long the worker runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    OneShot {
        executed: bool,
    },
    Recurring {
        interval: Duration,
        anchor: DateTime<Utc>,
        stop: Option<DateTime<Utc>>,
    },
}

impl Schedule {
    /// Build a schedule from `spec`, anchoring recurring schedules without a
    /// start at `now`.
    pub fn build(spec: &ScheduleSpec, now: DateTime<Utc>) -> Result<Self> {
        match spec {
            ScheduleSpec::OneShot => Ok(Schedule::OneShot { executed: false }),
            ScheduleSpec::Recurring {
                interval,
                start,
                stop,
            } => {
                let interval = Duration::from_std(*interval)
                    .map_err(|e| SchedulerError::InvalidSchedule(e.to_string()))?;
                if interval <= Duration::zero() || interval.num_nanoseconds().is_none() {
                    return Err(SchedulerError::InvalidSchedule(format!(
                        "interval {interval} is out of range"
                    )));
                }
                Ok(Schedule::Recurring {
                    interval,
                    anchor: start.unwrap_or(now),
                    stop: *stop,
                })
            }
        }
    }

    pub fn kind(&self) -> ScheduleKind {
        match self {
            Schedule::OneShot { .. } => ScheduleKind::OneShot,
            Schedule::Recurring { .. } => ScheduleKind::Recurring,
        }
    }

    /// Note that the worker ran. Completes a one-shot schedule.
    pub fn record_execution(&mut self) {
        if let Schedule::OneShot { executed } = self {
            *executed = true;
        }
    }

    /// Whether the schedule is still active as of `now`, and how long until
    /// its next due instant.
    ///
    /// A zero offset means `now` is a due instant. An inactive schedule
    /// reports a negative offset and will never become active again.
    pub fn calculate_offset_to_next_interval(&self, now: DateTime<Utc>) -> (bool, Duration) {
        match self {
            Schedule::OneShot { executed: false } => (true, Duration::zero()),
            Schedule::OneShot { executed: true } => (false, Duration::nanoseconds(-1)),
            Schedule::Recurring {
                interval,
                anchor,
                stop,
            } => {
                let offset = if now < *anchor {
                    *anchor - now
                } else {
                    // Missed ticks are skipped: only the next multiple counts.
                    let step = interval.num_nanoseconds().unwrap_or(i64::MAX);
                    let elapsed = (now - *anchor).num_nanoseconds().unwrap_or(i64::MAX);
                    match elapsed % step {
                        0 => Duration::zero(),
                        rem => Duration::nanoseconds(step - rem),
                    }
                };

                let next = now + offset;
                match stop {
                    Some(stop) if next > *stop => (false, *stop - next),
                    _ => (true, offset),
                }
            }
        }
    }
}
