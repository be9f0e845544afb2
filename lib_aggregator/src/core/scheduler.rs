//! # Periodic Job Scheduler
//!
//! Runs named refresh jobs on fixed periods for the lifetime of the process
//! (or until [`Scheduler::shutdown`] is called).
//!
//! ## Key Design Principles:
//! - **One task per job**: each scheduled job gets its own long-lived tokio
//!   task and its own timer, so a slow job never holds back another job's
//!   schedule.
//! - **No overlap, no skip**: a job's body is awaited inside its own loop,
//!   so two runs of the same job can never execute at the same time. If a run
//!   takes longer than the period, the next run starts as soon as the previous
//!   one finishes and the cadence then resumes one full period later
//!   (`MissedTickBehavior::Delay`). Overdue ticks are neither queued up nor
//!   dropped entirely.
//! - **Cooperative shutdown**: a shared [`CancellationToken`] is checked at the
//!   top of every iteration and raced against the tick. Jobs can grab the
//!   same token through [`Scheduler::cancellation_token`] so retries inside a
//!   run stop as well.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Errors raised when registering a job.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// A zero period would spin the job in a tight loop.
    #[error("job '{0}' was scheduled with a zero period")]
    ZeroPeriod(String),
    /// The scheduler was already shut down; new jobs would never run.
    #[error("job '{0}' was scheduled after shutdown")]
    ShutDown(String),
}

/// # Scheduler
///
/// Owns the cancellation token and the set of spawned job loops.
pub struct Scheduler {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates a scheduler with its own cancellation token.
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Creates a scheduler that stops when `cancel` (or a parent of it) fires.
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tracker: TaskTracker::new(),
        }
    }

    /// The token observed by every job loop. Clone it into retry calls so that
    /// in-flight work also stops on shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of job loops still running.
    pub fn running_jobs(&self) -> usize {
        self.tracker.len()
    }

    /// # Schedule
    ///
    /// Starts a background loop that runs `task` every `period`.
    ///
    /// With `run_immediately` the first run starts right away; otherwise the
    /// first run happens one full period from now.
    ///
    /// # Errors
    /// [`SchedulerError::ZeroPeriod`] for a zero period and
    /// [`SchedulerError::ShutDown`] once [`Scheduler::shutdown`] was called.
    pub fn schedule<F, Fut>(
        &self,
        name: &str,
        period: Duration,
        run_immediately: bool,
        mut task: F,
    ) -> Result<(), SchedulerError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod(name.to_string()));
        }
        if self.cancel.is_cancelled() || self.tracker.is_closed() {
            return Err(SchedulerError::ShutDown(name.to_string()));
        }

        let name = name.to_string();
        let cancel = self.cancel.clone();
        let start = if run_immediately {
            Instant::now()
        } else {
            Instant::now() + period
        };

        self.tracker.spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            log::info!("Job '{}' scheduled every {:?} (immediate: {}).", name, period, run_immediately);

            loop {
                if cancel.is_cancelled() {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                log::debug!("Job '{}' starting.", name);
                let started = Instant::now();
                task().await;
                log::debug!("Job '{}' finished in {:?}.", name, started.elapsed());
            }

            log::info!("Job '{}' stopped.", name);
        });

        Ok(())
    }

    /// Cancels every job and waits for the loops to exit.
    ///
    /// A job that is mid-run finishes (or aborts its retries, if it observes
    /// the token) before its loop notices the cancellation.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
