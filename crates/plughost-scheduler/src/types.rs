use std::time::Duration;

use chrono::{DateTime, Utc};
use plughost_core::config::ScheduleConfig;
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Validated schedule definition for one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleSpec {
    /// Run exactly once, immediately.
    OneShot,

    /// Run immediately, then on every multiple of `interval` after the
    /// anchor (`start`, or the instant the schedule is built) until `stop`.
    Recurring {
        interval: Duration,
        start: Option<DateTime<Utc>>,
        stop: Option<DateTime<Utc>>,
    },
}

impl ScheduleSpec {
    pub fn recurring(interval: Duration) -> Self {
        ScheduleSpec::Recurring {
            interval,
            start: None,
            stop: None,
        }
    }

    pub fn kind(&self) -> ScheduleKind {
        match self {
            ScheduleSpec::OneShot => ScheduleKind::OneShot,
            ScheduleSpec::Recurring { .. } => ScheduleKind::Recurring,
        }
    }
}

impl TryFrom<&ScheduleConfig> for ScheduleSpec {
    type Error = SchedulerError;

    fn try_from(config: &ScheduleConfig) -> Result<Self, Self::Error> {
        match config {
            ScheduleConfig::OneShot => Ok(ScheduleSpec::OneShot),
            ScheduleConfig::Recurring {
                interval_ms,
                start,
                stop,
            } => {
                let interval_ms = interval_ms.ok_or_else(|| {
                    SchedulerError::InvalidSchedule(
                        "recurring schedule requires interval_ms".to_string(),
                    )
                })?;
                if interval_ms == 0 {
                    return Err(SchedulerError::InvalidSchedule(
                        "interval_ms must be greater than zero".to_string(),
                    ));
                }
                let start = start.as_deref().map(parse_instant).transpose()?;
                let stop = stop.as_deref().map(parse_instant).transpose()?;
                if let (Some(start), Some(stop)) = (start, stop) {
                    if stop < start {
                        return Err(SchedulerError::InvalidSchedule(format!(
                            "stop {stop} is before start {start}"
                        )));
                    }
                }
                Ok(ScheduleSpec::Recurring {
                    interval: Duration::from_millis(interval_ms),
                    start,
                    stop,
                })
            }
        }
    }
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, SchedulerError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SchedulerError::InvalidSchedule(format!("bad timestamp '{s}': {e}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    OneShot,
    Recurring,
}

/// Observable lifecycle of a worker host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    Starting,
    /// The worker is executing.
    Running,
    /// Waiting for the next due instant.
    Sleeping,
    Stopped,
}

impl std::fmt::Display for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HostState::Starting => "starting",
            HostState::Running => "running",
            HostState::Sleeping => "sleeping",
            HostState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Why a host stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The schedule has no further due instants.
    Completed,
    Cancelled,
}
