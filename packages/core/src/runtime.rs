//! Module runtimes: one worker thread, one interpreter context, one queue.
//!
//! A [`ModuleRuntime`] owns a single-threaded interpreter context and accepts
//! work from any number of threads. Queued [`Task`]s run on the runtime's
//! dedicated worker in submission order; [`ModuleRuntime::run_direct`] runs a
//! callable on the caller's thread instead. Either way the interpreter mutex
//! is held for the duration, so two callables never touch the context at
//! the same time.
//!
//! ```text
//!   caller threads                      worker thread
//!   ──────────────                      ─────────────
//!   submit(task) ──► queue ──► pop ──► lock interpreter ──► invoke ──► Done
//!   run_direct(f) ─────────────────────► lock interpreter ──► f
//! ```
//!
//! Lifecycle: Starting (context created, bootstrap running) → Running
//! (service loop) → Terminating (no new work, queue discarded, bindings
//! unregistered) → Terminated (worker exited, context dropped).

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::binding::BindingSet;
use crate::config::HostConfig;
use crate::error::{ExecutionFault, Result, RuntimeError, StartupFault};
use crate::host::{ChatFormatter, HostCapabilities};
use crate::interpreter::{self, Interpreter, InterpreterEngine, ModuleContext};
use crate::task::{panic_message, Task};
use crate::value::Value;

/// Unique identifier of one runtime instance.
///
/// Reloading a module creates a new runtime with a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeId(Uuid);

impl RuntimeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RuntimeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Context is being created and bootstrapped.
    Starting,
    /// The worker is serving the queue.
    Running,
    /// Termination requested; the worker has not exited yet.
    Terminating,
    /// The worker has exited.
    Terminated,
}

impl RuntimeState {
    /// Starting or Running: the runtime still accepts work.
    pub fn is_live(self) -> bool {
        matches!(self, RuntimeState::Starting | RuntimeState::Running)
    }
}

/// Interpreter type of an engine.
pub type InterpreterOf<E> = <E as InterpreterEngine>::Interpreter;

/// Executable unit type of an engine's interpreter.
pub type UnitOf<E> = <InterpreterOf<E> as Interpreter>::Unit;

struct Queue<I> {
    state: RuntimeState,
    tasks: VecDeque<Task<I>>,
}

/// A live execution environment for one module.
pub struct ModuleRuntime<E: InterpreterEngine> {
    id: RuntimeId,
    context: ModuleContext,
    engine: Arc<E>,
    host: HostCapabilities,

    /// The interpreter mutex. `None` until bootstrap finishes and after the
    /// worker exits.
    interpreter: Mutex<Option<InterpreterOf<E>>>,

    queue: Mutex<Queue<InterpreterOf<E>>>,
    work_ready: Condvar,
    state_changed: Condvar,

    worker: Mutex<Option<JoinHandle<()>>>,
    worker_thread: OnceLock<ThreadId>,
}

impl<E: InterpreterEngine> ModuleRuntime<E> {
    /// Create a runtime in the Starting state. No thread runs until
    /// [`ModuleRuntime::spawn`].
    pub fn new(
        module: &str,
        config: &HostConfig,
        engine: Arc<E>,
        host: HostCapabilities,
    ) -> Arc<Self> {
        let id = RuntimeId::new();
        let chat = host.chat_formatter().cloned();
        if chat.is_none() {
            tracing::warn!(module, "no chat formatter available, enhanced chat disabled");
        }

        let context = ModuleContext {
            module: module.to_string(),
            runtime_id: id,
            base_dir: config.base_dir(),
            module_dir: config.module_dir(module),
            scripts_dir: config.scripts_dir(),
            bindings: BindingSet::new(),
            chat,
        };

        Arc::new(Self {
            id,
            context,
            engine,
            host,
            interpreter: Mutex::new(None),
            queue: Mutex::new(Queue {
                state: RuntimeState::Starting,
                tasks: VecDeque::new(),
            }),
            work_ready: Condvar::new(),
            state_changed: Condvar::new(),
            worker: Mutex::new(None),
            worker_thread: OnceLock::new(),
        })
    }

    /// Launch the worker thread.
    pub fn spawn(self: &Arc<Self>) -> Result<()> {
        // Held until the handle is stored so a concurrent joining terminate
        // cannot miss it.
        let mut worker = self.lock_worker();
        let runtime = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("modhost-{}", self.name()))
            .spawn(move || runtime.service());

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                tracing::error!(module = self.name(), error = %e, "failed to spawn worker");
                self.terminate(false);
                self.finish();
                Err(RuntimeError::Spawn(e))
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.context.module
    }

    pub fn id(&self) -> RuntimeId {
        self.id
    }

    pub fn state(&self) -> RuntimeState {
        self.lock_queue().state
    }

    /// Whether the runtime still accepts work.
    pub fn is_running(&self) -> bool {
        self.state().is_live()
    }

    pub fn base_dir(&self) -> &Path {
        &self.context.base_dir
    }

    pub fn module_dir(&self) -> &Path {
        &self.context.module_dir
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.context.scripts_dir
    }

    /// Bindings registered by adapters on behalf of this module.
    pub fn bindings(&self) -> &BindingSet {
        &self.context.bindings
    }

    pub fn chat_formatter(&self) -> Option<&Arc<dyn ChatFormatter>> {
        self.context.chat.as_ref()
    }

    /// Number of tasks waiting to start.
    pub fn queued_len(&self) -> usize {
        self.lock_queue().tasks.len()
    }

    /// Block until the runtime leaves Starting. Returns whether it is Running.
    pub fn wait_ready(&self) -> bool {
        let mut queue = self.lock_queue();
        while queue.state == RuntimeState::Starting {
            queue = self
                .state_changed
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
        queue.state == RuntimeState::Running
    }

    /// Block until the worker has exited or the timeout elapses. Returns
    /// whether the runtime is Terminated.
    pub fn wait_terminated(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.lock_queue();
        while queue.state != RuntimeState::Terminated {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            queue = self
                .state_changed
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Submit a task to the worker.
    ///
    /// With `wait`, blocks until the task is Done and returns its result;
    /// otherwise returns `None` immediately. A task that is already queued or
    /// running is not queued again. Submissions to a runtime that is no
    /// longer live are rejected and yield `None`.
    pub fn submit(&self, task: &Task<InterpreterOf<E>>, wait: bool) -> Option<Value> {
        let accepted = task.enqueue_with(|task| {
            let mut queue = self.lock_queue();
            if !queue.state.is_live() {
                return false;
            }
            queue.tasks.push_back(task);
            self.work_ready.notify_one();
            true
        });

        if !accepted {
            tracing::debug!(module = self.name(), "task rejected: runtime not running");
            return None;
        }
        if !wait {
            return None;
        }
        if self.on_worker_thread() {
            // The worker would be waiting on itself.
            tracing::warn!(module = self.name(), "cannot wait on a task from its own worker");
            return None;
        }
        task.wait()
    }

    /// Queue a callable without waiting. The returned task can be waited on.
    pub fn run_later<F>(&self, callable: F) -> Task<InterpreterOf<E>>
    where
        F: FnMut(&mut InterpreterOf<E>) -> std::result::Result<Value, ExecutionFault>
            + Send
            + 'static,
    {
        let task = Task::new(callable);
        self.submit(&task, false);
        task
    }

    /// Run a callable on the caller's thread under the interpreter mutex.
    ///
    /// Only for callers that never invoke this concurrently with themselves,
    /// such as the host's main update cycle. Returns `None` if the runtime
    /// has no context (not bootstrapped yet, or terminated) or the callable
    /// faults.
    pub fn run_direct<F>(&self, callable: F) -> Option<Value>
    where
        F: FnOnce(&mut InterpreterOf<E>) -> std::result::Result<Value, ExecutionFault>,
    {
        if self.on_worker_thread() {
            tracing::warn!(module = self.name(), "run_direct called from the worker thread");
            return None;
        }
        if !self.is_running() {
            return None;
        }

        let mut guard = self.lock_interpreter();
        let interpreter = guard.as_mut()?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callable(interpreter)))
            .unwrap_or_else(|payload| Err(ExecutionFault::new(panic_message(payload.as_ref()))));
        match outcome {
            Ok(value) => Some(value),
            Err(fault) => {
                tracing::error!(module = self.name(), error = %fault, "direct call faulted");
                None
            }
        }
    }

    /// Hand a callable to the host's main thread, where it runs through
    /// [`ModuleRuntime::run_direct`]. Returns `false` if the host has no
    /// main-thread scheduler.
    pub fn run_on_main_thread<F>(self: &Arc<Self>, callable: F) -> bool
    where
        F: FnOnce(&mut InterpreterOf<E>) -> std::result::Result<Value, ExecutionFault>
            + Send
            + 'static,
    {
        let Some(scheduler) = self.host.main_thread() else {
            tracing::warn!(module = self.name(), "host has no main-thread scheduler");
            return false;
        };

        let runtime = Arc::downgrade(self);
        scheduler.schedule(Box::new(move || {
            if let Some(runtime) = runtime.upgrade() {
                runtime.run_direct(callable);
            }
        }));
        true
    }

    /// Run `f` against the context under the interpreter mutex.
    pub fn with_interpreter<R>(&self, f: impl FnOnce(&mut InterpreterOf<E>) -> R) -> Result<R> {
        let not_running = || RuntimeError::NotRunning(self.name().to_string());
        if self.on_worker_thread() || !self.is_running() {
            return Err(not_running());
        }
        let mut guard = self.lock_interpreter();
        let interpreter = guard.as_mut().ok_or_else(not_running)?;
        Ok(f(interpreter))
    }

    /// Compile source text in this runtime's context.
    pub fn load(&self, source: &str) -> Result<UnitOf<E>> {
        let name = format!("={}", self.name());
        Ok(self.with_interpreter(|interpreter| interpreter.load(source, &name))??)
    }

    /// Compile a script file in this runtime's context.
    pub fn load_file(&self, path: &Path) -> Result<UnitOf<E>> {
        Ok(self.with_interpreter(|interpreter| interpreter.load_file(path))??)
    }

    /// A task that executes a loaded unit.
    pub fn execute_unit(&self, unit: UnitOf<E>) -> Task<InterpreterOf<E>> {
        Task::new(move |interpreter: &mut InterpreterOf<E>| interpreter.execute(&unit))
    }

    /// Stop the runtime.
    ///
    /// Marks it Terminating, discards queued tasks (their waiters get
    /// `None`) and closes the binding set, unregistering every binding and
    /// refusing later ones. With `join`, also waits for the worker to exit,
    /// even when another caller already began the shutdown. Returns whether
    /// this call stopped it.
    pub fn terminate(&self, join: bool) -> bool {
        let stopped = self.begin_terminate();
        if join {
            if self.on_worker_thread() {
                tracing::debug!(module = self.name(), "terminate from worker: not joining");
                return stopped;
            }
            self.join_worker();
        }
        stopped
    }

    fn begin_terminate(&self) -> bool {
        let discarded = {
            let mut queue = self.lock_queue();
            if !queue.state.is_live() {
                return false;
            }
            queue.state = RuntimeState::Terminating;
            self.work_ready.notify_all();
            self.state_changed.notify_all();
            queue.tasks.drain(..).collect::<Vec<_>>()
        };
        tracing::info!(module = self.name(), runtime = %self.id, "terminating module runtime");
        self.discard(discarded);
        self.context.bindings.close();
        true
    }

    /// Join the worker. The worker lock stays held for the join so that a
    /// second joiner blocks until the thread is gone.
    fn join_worker(&self) {
        {
            let mut worker = self.lock_worker();
            if let Some(handle) = worker.take() {
                if handle.join().is_err() {
                    tracing::error!(module = self.name(), "worker thread panicked");
                }
            }
        }
        // Catch anything that slipped in while the worker was winding down.
        let leftovers = self.lock_queue().tasks.drain(..).collect::<Vec<_>>();
        self.discard(leftovers);
        self.context.bindings.close();
    }

    fn service(self: Arc<Self>) {
        let _ = self.worker_thread.set(thread::current().id());
        tracing::debug!(module = self.name(), runtime = %self.id, "worker started");

        if let Err(fault) = self.boot() {
            tracing::error!(module = self.name(), error = %fault, "module failed to start");
            self.terminate(false);
            self.finish();
            return;
        }

        {
            let mut queue = self.lock_queue();
            if queue.state == RuntimeState::Starting {
                queue.state = RuntimeState::Running;
                self.state_changed.notify_all();
            }
        }
        tracing::info!(module = self.name(), runtime = %self.id, "module runtime running");

        while let Some(task) = self.next_task() {
            self.run_task(&task);
        }
        self.finish();
    }

    /// Create the context and run the bootstrap under the interpreter mutex.
    fn boot(&self) -> std::result::Result<(), StartupFault> {
        let mut slot = self.lock_interpreter();
        let booted = panic::catch_unwind(AssertUnwindSafe(
            || -> std::result::Result<InterpreterOf<E>, StartupFault> {
                let mut interp = self.engine.create(&self.context)?;
                interpreter::bootstrap(&*self.engine, &mut interp, &self.context.base_dir)?;
                Ok(interp)
            },
        ))
        .unwrap_or_else(|payload| {
            Err(StartupFault::Execute(ExecutionFault::new(panic_message(
                payload.as_ref(),
            ))))
        })?;
        *slot = Some(booted);
        Ok(())
    }

    /// Next queued task, blocking while the queue is empty. `None` once the
    /// runtime stops with nothing left to run.
    fn next_task(&self) -> Option<Task<InterpreterOf<E>>> {
        let mut queue = self.lock_queue();
        loop {
            if let Some(task) = queue.tasks.pop_front() {
                return Some(task);
            }
            if !queue.state.is_live() {
                return None;
            }
            queue = self
                .work_ready
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn run_task(&self, task: &Task<InterpreterOf<E>>) {
        if !task.begin() {
            return;
        }
        let outcome = {
            let mut guard = self.lock_interpreter();
            match guard.as_mut() {
                Some(interpreter) => task.invoke(interpreter),
                None => Err(ExecutionFault::new("interpreter context not available")),
            }
        };
        match outcome {
            Ok(value) => task.complete(Some(value)),
            Err(fault) => {
                tracing::error!(module = self.name(), error = %fault, "task faulted");
                task.complete(None);
            }
        }
    }

    /// Worker exit: drop the context, release bindings and publish
    /// Terminated.
    fn finish(&self) {
        self.lock_interpreter().take();
        let leftovers = {
            let mut queue = self.lock_queue();
            queue.state = RuntimeState::Terminated;
            self.state_changed.notify_all();
            queue.tasks.drain(..).collect::<Vec<_>>()
        };
        self.discard(leftovers);
        self.context.bindings.close();
        tracing::debug!(module = self.name(), runtime = %self.id, "worker exited");
    }

    fn discard(&self, tasks: Vec<Task<InterpreterOf<E>>>) {
        let cancelled = tasks.iter().filter(|task| task.cancel()).count();
        if cancelled > 0 {
            tracing::debug!(module = self.name(), cancelled, "discarded queued tasks");
        }
    }

    fn on_worker_thread(&self) -> bool {
        self.worker_thread.get() == Some(&thread::current().id())
    }

    fn lock_interpreter(&self) -> MutexGuard<'_, Option<InterpreterOf<E>>> {
        self.interpreter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_queue(&self) -> MutexGuard<'_, Queue<InterpreterOf<E>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: InterpreterEngine> std::fmt::Debug for ModuleRuntime<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRuntime")
            .field("module", &self.context.module)
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
