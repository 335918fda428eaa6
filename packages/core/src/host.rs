//! Optional capabilities the host application advertises to runtimes.
//!
//! Nothing here is looked up globally: the registry is handed a
//! [`HostCapabilities`] at construction and passes it to every runtime it
//! creates.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// A unit of work the host runs on its main update thread.
pub type MainThreadJob = Box<dyn FnOnce() + Send + 'static>;

/// Rich chat formatting offered by a host plugin.
pub trait ChatFormatter: Send + Sync {
    /// Render a message template into the host's chat format.
    fn format(&self, template: &str) -> String;
}

/// Schedules work on the host's single-threaded main update cycle.
pub trait MainThreadScheduler: Send + Sync {
    fn schedule(&self, job: MainThreadJob);
}

/// The set of optional host capabilities.
#[derive(Clone, Default)]
pub struct HostCapabilities {
    chat: Option<Arc<dyn ChatFormatter>>,
    main_thread: Option<Arc<dyn MainThreadScheduler>>,
}

impl HostCapabilities {
    /// A host that advertises nothing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chat_formatter(mut self, chat: Arc<dyn ChatFormatter>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_main_thread(mut self, scheduler: Arc<dyn MainThreadScheduler>) -> Self {
        self.main_thread = Some(scheduler);
        self
    }

    pub fn chat_formatter(&self) -> Option<&Arc<dyn ChatFormatter>> {
        self.chat.as_ref()
    }

    pub fn main_thread(&self) -> Option<&Arc<dyn MainThreadScheduler>> {
        self.main_thread.as_ref()
    }
}

impl fmt::Debug for HostCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCapabilities")
            .field("chat", &self.chat.is_some())
            .field("main_thread", &self.main_thread.is_some())
            .finish()
    }
}

/// A main-thread scheduler that queues jobs until the host pumps them.
///
/// The host's update loop calls [`ManualScheduler::run_pending`] once per
/// cycle; jobs scheduled while pumping run on the next cycle.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    jobs: Arc<Mutex<VecDeque<MainThreadJob>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every job queued before this call. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let jobs = std::mem::take(&mut *self.lock());
        let count = jobs.len();
        for job in jobs {
            job();
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<MainThreadJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MainThreadScheduler for ManualScheduler {
    fn schedule(&self, job: MainThreadJob) {
        self.lock().push_back(job);
    }
}
