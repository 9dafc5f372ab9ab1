//! Scheduling of one-shot, delayed and repeating work.
//!
//! ## Domains
//!
//! - `Foreground` - closures run directly on the async worker threads.
//!   Keep them short; they share threads with latency-sensitive code.
//! - `Background` - closures run on tokio's blocking pool, off the
//!   critical path (persisting a chat log, sweeping large maps).
//!
//! Build one [`Schedulers`] pair at startup and hand a [`Scheduler`] to
//! whatever needs one. There are no process-wide scheduler singletons.

mod task;

pub use task::{TaskError, TaskFuture, TaskHandle};

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error};

pub(crate) use task::panic_message;
use task::StartGate;

/// Errors raised when setting up scheduled work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("no tokio runtime is running on this thread")]
    NoRuntime,

    #[error("repeating task period must be greater than zero")]
    ZeroPeriod,
}

/// Where scheduled closures execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Foreground,
    #[default]
    Background,
}

/// Submits work to one scheduling domain of a tokio runtime.
///
/// Cloning is cheap and the clone targets the same runtime and domain.
#[derive(Debug, Clone)]
pub struct Scheduler {
    handle: Handle,
    domain: Domain,
}

impl Scheduler {
    /// Create a scheduler on the given runtime.
    pub fn new(handle: Handle, domain: Domain) -> Self {
        Self { handle, domain }
    }

    /// Create a scheduler on the runtime of the calling thread.
    pub fn current(domain: Domain) -> Result<Self, SchedulerError> {
        let handle = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(Self::new(handle, domain))
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Run `f` once, as soon as possible.
    pub fn run<F, T>(&self, f: F) -> TaskFuture<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.run_later(f, Duration::ZERO)
    }

    /// Run `f` once after `delay`.
    ///
    /// The caller is not blocked; observe completion through the returned
    /// future.
    pub fn run_later<F, T>(&self, f: F, delay: Duration) -> TaskFuture<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let domain = self.domain;
        let gate = Arc::new(StartGate::default());
        let started = Arc::clone(&gate);
        let inner = self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = started.aborted() => return Err(TaskError::Cancelled),
                }
            }
            if !started.start() {
                return Err(TaskError::Cancelled);
            }
            match domain {
                Domain::Foreground => Ok(f()),
                Domain::Background => tokio::task::spawn_blocking(f)
                    .await
                    .map_err(TaskError::from),
            }
        });
        TaskFuture::new(inner, gate)
    }

    /// Run `f` every `period`, first after `initial_delay`, until the
    /// returned handle is stopped.
    ///
    /// Runs never overlap. A run that panics is logged and counted; the
    /// schedule continues. If a run overshoots the period, the next run is
    /// pushed back rather than bunched up.
    pub fn run_repeating<F>(
        &self,
        f: F,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<TaskHandle, SchedulerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }

        let handle = TaskHandle::new();
        let task = handle.clone();
        let domain = self.domain;
        let f = Arc::new(f);

        self.handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + initial_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = task.stopped() => break,
                }
                if task.is_cancelled() {
                    break;
                }

                let outcome = match domain {
                    Domain::Foreground => panic::catch_unwind(AssertUnwindSafe(|| (*f)()))
                        .map_err(|payload| panic_message(payload.as_ref())),
                    Domain::Background => {
                        let f = Arc::clone(&f);
                        tokio::task::spawn_blocking(move || (*f)())
                            .await
                            .map_err(|e| TaskError::from(e).to_string())
                    }
                };
                task.record_run();

                if let Err(reason) = outcome {
                    error!("Repeating task run {} failed: {}", task.times_ran(), reason);
                }
            }

            debug!("Repeating task stopped after {} runs", task.times_ran());
        });

        Ok(handle)
    }
}

/// The foreground/background scheduler pair an application owns.
#[derive(Debug, Clone)]
pub struct Schedulers {
    pub foreground: Scheduler,
    pub background: Scheduler,
}

impl Schedulers {
    /// Create both domains on the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self {
            foreground: Scheduler::new(handle.clone(), Domain::Foreground),
            background: Scheduler::new(handle, Domain::Background),
        }
    }

    /// Create both domains on the runtime of the calling thread.
    pub fn current() -> Result<Self, SchedulerError> {
        let handle = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(Self::new(handle))
    }

    /// Pick the scheduler for `domain`.
    pub fn get(&self, domain: Domain) -> &Scheduler {
        match domain {
            Domain::Foreground => &self.foreground,
            Domain::Background => &self.background,
        }
    }
}
