//! Units of work submitted to a module runtime.
//!
//! A [`Task`] is a shared handle: clones refer to the same work item, and any
//! number of threads may wait on it. State only moves
//! Idle → Pending → Running → Done, back to Pending on resubmission, or to
//! Idle through [`Task::reset`]. A task discarded before it started moves
//! straight from Pending to Done with no result.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::ExecutionFault;
use crate::value::Value;

/// The code a task runs against an interpreter context.
pub type Callable<I> = Box<dyn FnMut(&mut I) -> Result<Value, ExecutionFault> + Send + 'static>;

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Never submitted, or reset.
    Idle,
    /// Queued on a runtime.
    Pending,
    /// Executing on a runtime's worker.
    Running,
    /// Finished, faulted, or discarded.
    Done,
}

impl TaskState {
    /// Whether the task is queued or executing.
    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Running)
    }
}

struct TaskSlot {
    state: TaskState,
    result: Option<Value>,
}

struct TaskInner<I> {
    slot: Mutex<TaskSlot>,
    settled: Condvar,
    callable: Mutex<Callable<I>>,
}

/// A unit of work for a runtime whose interpreter is `I`.
pub struct Task<I> {
    inner: Arc<TaskInner<I>>,
}

impl<I> Clone for Task<I> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<I: 'static> std::fmt::Debug for Task<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("state", &self.state()).finish()
    }
}

impl<I: 'static> Task<I> {
    /// Wrap a callable. The task starts Idle.
    pub fn new<F>(callable: F) -> Self
    where
        F: FnMut(&mut I) -> Result<Value, ExecutionFault> + Send + 'static,
    {
        Self {
            inner: Arc::new(TaskInner {
                slot: Mutex::new(TaskSlot {
                    state: TaskState::Idle,
                    result: None,
                }),
                settled: Condvar::new(),
                callable: Mutex::new(Box::new(callable)),
            }),
        }
    }

    pub fn state(&self) -> TaskState {
        self.slot().state
    }

    /// Result of the most recent completed execution, without blocking.
    pub fn result(&self) -> Option<Value> {
        self.slot().result.clone()
    }

    /// Block until the task is no longer in flight and return its result.
    pub fn wait(&self) -> Option<Value> {
        let slot = self.wait_settled(self.slot());
        slot.result.clone()
    }

    /// Like [`Task::wait`] with an upper bound. Returns `false` if the task
    /// was still in flight when the timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot();
        while slot.state.is_in_flight() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            slot = self
                .inner
                .settled
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Wait for any in-flight execution to finish, then return to Idle and
    /// clear the stored result.
    pub fn reset(&self) -> &Self {
        let mut slot = self.wait_settled(self.slot());
        slot.state = TaskState::Idle;
        slot.result = None;
        self
    }

    /// Move to Pending through `push`, which hands the task to a queue and
    /// reports whether it was accepted.
    ///
    /// A task already in flight is left alone and counts as accepted. The
    /// slot lock is held across `push`, so a worker that dequeues the task
    /// immediately still observes it as Pending.
    pub(crate) fn enqueue_with(&self, push: impl FnOnce(Task<I>) -> bool) -> bool {
        let mut slot = self.slot();
        if slot.state.is_in_flight() {
            return true;
        }
        if !push(self.clone()) {
            return false;
        }
        slot.state = TaskState::Pending;
        slot.result = None;
        true
    }

    /// Claim a dequeued task for execution.
    pub(crate) fn begin(&self) -> bool {
        let mut slot = self.slot();
        if slot.state != TaskState::Pending {
            return false;
        }
        slot.state = TaskState::Running;
        true
    }

    /// Run the callable, converting panics into faults.
    pub(crate) fn invoke(&self, interpreter: &mut I) -> Result<Value, ExecutionFault> {
        let mut callable = self
            .inner
            .callable
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match panic::catch_unwind(AssertUnwindSafe(|| (*callable)(interpreter))) {
            Ok(result) => result,
            Err(payload) => Err(ExecutionFault::new(panic_message(payload.as_ref()))),
        }
    }

    /// Record the outcome and release every waiter.
    pub(crate) fn complete(&self, result: Option<Value>) {
        let mut slot = self.slot();
        slot.state = TaskState::Done;
        slot.result = result;
        self.inner.settled.notify_all();
    }

    /// Discard a task that never started. Tasks that already began are left
    /// to finish normally.
    pub(crate) fn cancel(&self) -> bool {
        let mut slot = self.slot();
        if slot.state != TaskState::Pending {
            return false;
        }
        slot.state = TaskState::Done;
        slot.result = None;
        self.inner.settled.notify_all();
        true
    }

    fn wait_settled<'a>(&'a self, mut slot: MutexGuard<'a, TaskSlot>) -> MutexGuard<'a, TaskSlot> {
        while slot.state.is_in_flight() {
            slot = self
                .inner
                .settled
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
        slot
    }

    fn slot(&self) -> MutexGuard<'_, TaskSlot> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}
