//! Handles returned by the scheduler.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};

/// Why a one-shot task produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task was cancelled before it completed")]
    Cancelled,
}

impl From<JoinError> for TaskError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            Self::Panicked(panic_message(err.into_panic().as_ref()))
        } else {
            Self::Cancelled
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const ABORTED: u8 = 2;

/// Decides, exactly once, whether a one-shot closure runs or is aborted.
#[derive(Debug, Default)]
pub(crate) struct StartGate {
    state: AtomicU8,
    aborted: Notify,
}

impl StartGate {
    /// Claim the right to run the closure. `false` if it was aborted first.
    pub(crate) fn start(&self) -> bool {
        self.state
            .compare_exchange(PENDING, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn abort(&self) -> bool {
        let aborted = self
            .state
            .compare_exchange(PENDING, ABORTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if aborted {
            self.aborted.notify_one();
        }
        aborted
    }

    /// Resolves once [`abort`](Self::abort) has won the gate.
    pub(crate) async fn aborted(&self) {
        self.aborted.notified().await;
    }
}

/// Result of [`Scheduler::run`](super::Scheduler::run) and
/// [`Scheduler::run_later`](super::Scheduler::run_later).
///
/// Awaiting it yields the closure's return value, or a [`TaskError`] if the
/// closure panicked or the task was aborted. Dropping it does not cancel the
/// work.
#[derive(Debug)]
pub struct TaskFuture<T> {
    inner: JoinHandle<Result<T, TaskError>>,
    gate: Arc<StartGate>,
}

impl<T> TaskFuture<T> {
    pub(crate) fn new(inner: JoinHandle<Result<T, TaskError>>, gate: Arc<StartGate>) -> Self {
        Self { inner, gate }
    }

    /// Whether the task has finished (successfully or not).
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Abort the task if its closure has not started yet.
    ///
    /// Returns `true` if the task was aborted; the future then resolves to
    /// [`TaskError::Cancelled`]. In either domain a closure that already
    /// started runs to completion and the future resolves to its value.
    pub fn abort(&self) -> bool {
        self.gate.abort()
    }
}

impl<T> Future for TaskFuture<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        })
    }
}

#[derive(Debug, Default)]
struct TaskState {
    cancelled: AtomicBool,
    times_ran: AtomicU64,
    stop: Notify,
}

/// Cancellable handle to repeating work.
///
/// Cloning is cheap; all clones control the same task.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    state: Arc<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Cancel all future runs. A run already in progress completes.
    ///
    /// Calling this more than once has no further effect.
    pub fn stop(&self) {
        if !self.state.cancelled.swap(true, Ordering::AcqRel) {
            self.state.stop.notify_one();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Number of completed runs, including runs that panicked.
    pub fn times_ran(&self) -> u64 {
        self.state.times_ran.load(Ordering::Acquire)
    }

    pub(crate) fn record_run(&self) {
        self.state.times_ran.fetch_add(1, Ordering::AcqRel);
    }

    /// Resolves once [`stop`](Self::stop) has been called.
    pub(crate) async fn stopped(&self) {
        if self.is_cancelled() {
            return;
        }
        self.state.stop.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_idempotent() {
        let handle = TaskHandle::new();
        assert!(!handle.is_cancelled());

        handle.stop();
        handle.stop();

        assert!(handle.is_cancelled());
        assert_eq!(handle.times_ran(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let handle = TaskHandle::new();
        let other = handle.clone();

        other.record_run();
        other.record_run();
        handle.stop();

        assert_eq!(handle.times_ran(), 2);
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_panic_message_extracts_text() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_start_gate_decides_once() {
        let gate = StartGate::default();
        assert!(gate.start());
        assert!(!gate.abort());
        assert!(!gate.start());

        let gate = StartGate::default();
        assert!(gate.abort());
        assert!(!gate.start());
        assert!(!gate.abort());
    }

    #[tokio::test]
    async fn test_stopped_resolves_after_stop() {
        let handle = TaskHandle::new();
        let waiter = handle.clone();
        let join = tokio::spawn(async move { waiter.stopped().await });

        handle.stop();

        join.await.unwrap();
    }
}
