//! `plughost-scheduler`: schedules and the per-worker supervisor.
//!
//! # Overview
//!
//! A [`WorkerHost`] owns one [`Worker`] and one [`Schedule`]. It runs the
//! worker once as soon as it starts, then sleeps until each due instant the
//! schedule reports, until the schedule completes or the shared
//! `CancellationToken` fires.
//!
//! # Schedule variants
//!
//! | Variant     | Behaviour                                              |
//! |-------------|--------------------------------------------------------|
//! | `OneShot`   | Single run at host start                               |
//! | `Recurring` | Run at start, then every interval from a fixed anchor  |

pub mod clock;
pub mod error;
pub mod host;
pub mod schedule;
pub mod types;
pub mod worker;

pub use clock::{Clock, MonotonicClock};
pub use error::{Result, SchedulerError};
pub use host::{HostMonitor, WorkerHost};
pub use schedule::Schedule;
pub use types::{HostState, ScheduleKind, ScheduleSpec, StopReason};
pub use worker::{Worker, WorkerError};
