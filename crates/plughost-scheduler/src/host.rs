use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use plughost_core::WorkerId;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::clock::{Clock, MonotonicClock};
use crate::error::{Result, SchedulerError};
use crate::schedule::Schedule;
use crate::types::{HostState, StopReason};
use crate::worker::{Worker, WorkerError};

/// Read-only view of a running [`WorkerHost`].
#[derive(Debug, Clone)]
pub struct HostMonitor {
    state: watch::Receiver<HostState>,
    executions: Arc<AtomicU64>,
}

impl HostMonitor {
    pub fn state(&self) -> HostState {
        *self.state.borrow()
    }

    /// Number of executions that have finished, successfully or not.
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Acquire)
    }

    /// Wait until the host reaches `Stopped`.
    pub async fn stopped(&mut self) {
        // An Err means the host was dropped, which is also a stop.
        let _ = self.state.wait_for(|s| *s == HostState::Stopped).await;
    }
}

/// Supervises one worker on one schedule.
///
/// Runs the worker once immediately, then once per due instant until the
/// schedule completes, the worker fails, or cancellation is requested.
pub struct WorkerHost {
    worker_id: WorkerId,
    worker: Arc<dyn Worker>,
    schedule: Schedule,
    clock: Arc<dyn Clock>,
    state: watch::Sender<HostState>,
    executions: Arc<AtomicU64>,
    /// Wall time at which the latest execution started.
    last_run_at: Option<DateTime<Utc>>,
}

impl WorkerHost {
    pub fn new(worker_id: WorkerId, worker: Arc<dyn Worker>, schedule: Schedule) -> Self {
        let (state, _) = watch::channel(HostState::Starting);
        Self {
            worker_id,
            worker,
            schedule,
            clock: Arc::new(MonotonicClock::new()),
            state,
            executions: Arc::new(AtomicU64::new(0)),
            last_run_at: None,
        }
    }

    /// Use `clock` instead of a fresh [`MonotonicClock`]. Should be the same
    /// clock the schedule was anchored with.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn monitor(&self) -> HostMonitor {
        HostMonitor {
            state: self.state.subscribe(),
            executions: Arc::clone(&self.executions),
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Drive the worker until its schedule completes or `cancel` fires.
    ///
    /// Cancellation, whether observed while waiting or reported by the
    /// worker, ends with `Ok(StopReason::Cancelled)`. Any other worker error
    /// is returned as `WorkerExecutionFailed`.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<StopReason> {
        info!(
            worker_id = %self.worker_id,
            worker = self.worker.name(),
            kind = ?self.schedule.kind(),
            "worker host started"
        );

        let outcome = self.drive(&cancel).await;
        self.state.send_replace(HostState::Stopped);

        match &outcome {
            Ok(StopReason::Cancelled) => {
                info!(worker_id = %self.worker_id, worker = self.worker.name(), "worker host cancelled")
            }
            Ok(StopReason::Completed) => {
                info!(worker_id = %self.worker_id, worker = self.worker.name(), "worker host completed")
            }
            Err(e) => error!(
                worker_id = %self.worker_id,
                worker = self.worker.name(),
                code = e.code(),
                error = %e,
                "worker host stopped on failure"
            ),
        }
        outcome
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<StopReason> {
        if cancel.is_cancelled() {
            return Ok(StopReason::Cancelled);
        }

        if let Some(reason) = self.execute(cancel).await? {
            return Ok(reason);
        }
        if matches!(self.schedule, Schedule::OneShot { .. }) {
            return Ok(StopReason::Completed);
        }

        loop {
            let Some(offset) = self.next_offset() else {
                return Ok(StopReason::Completed);
            };

            self.state.send_replace(HostState::Sleeping);
            let wait = offset.to_std().unwrap_or_default();
            debug!(worker_id = %self.worker_id, ?wait, "worker host sleeping");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StopReason::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }

            if let Some(reason) = self.execute(cancel).await? {
                return Ok(reason);
            }
        }
    }

    /// Time until the next execution, or `None` once the schedule is done.
    fn next_offset(&self) -> Option<Duration> {
        let now = self.clock.now();
        let (active, offset) = self.schedule.calculate_offset_to_next_interval(now);
        if !active && offset < Duration::zero() {
            return None;
        }
        if offset > Duration::zero() || self.last_run_at.is_some_and(|last| last < now) {
            return Some(offset);
        }

        // Due now, but this instant was already served by the run that just
        // finished: look for the following due instant instead.
        let tick = Duration::nanoseconds(1);
        let (active, offset) = self.schedule.calculate_offset_to_next_interval(now + tick);
        if !active && offset < Duration::zero() {
            return None;
        }
        Some(offset + tick)
    }

    /// Run the worker once. `Some(Cancelled)` when the worker reported
    /// cancellation.
    async fn execute(&mut self, cancel: &CancellationToken) -> Result<Option<StopReason>> {
        self.state.send_replace(HostState::Running);
        self.last_run_at = Some(self.clock.now());

        let result = self.worker.execute(cancel.clone()).await;
        self.schedule.record_execution();
        let run = self.executions.fetch_add(1, Ordering::AcqRel) + 1;

        match result {
            Ok(()) => {
                debug!(worker_id = %self.worker_id, run, "worker execution finished");
                Ok(None)
            }
            Err(WorkerError::Cancelled) => Ok(Some(StopReason::Cancelled)),
            Err(WorkerError::Failed(source)) => Err(SchedulerError::WorkerExecutionFailed {
                worker: self.worker.name().to_string(),
                source,
            }),
        }
    }
}
