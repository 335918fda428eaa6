//! External capability bindings held by a module runtime.
//!
//! Event and command adapters register a [`Binding`] for every subscription
//! interpreted code makes. The runtime unregisters all of them when it
//! terminates, so a stopped module never keeps receiving host callbacks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// What kind of host surface a binding hooks into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Subscription to a host event.
    Event,
    /// Registration of a host command.
    Command,
    /// Anything else an adapter wants torn down with the module.
    Other,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Event => write!(f, "event"),
            BindingKind::Command => write!(f, "command"),
            BindingKind::Other => write!(f, "other"),
        }
    }
}

/// A registration an adapter made with the host on behalf of a module.
pub trait Binding: Send + Sync {
    fn kind(&self) -> BindingKind;

    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Remove the registration from the host. Called at most once.
    fn unregister(&self);
}

/// Identifier returned by [`BindingSet::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

/// The set of bindings registered for one runtime.
///
/// Once [`BindingSet::close`] has run, the set refuses new registrations:
/// the binding is unregistered on the spot and `register` returns `None`.
#[derive(Clone, Default)]
pub struct BindingSet {
    inner: Arc<BindingSetInner>,
}

#[derive(Default)]
struct BindingSetInner {
    next_id: AtomicU64,
    registrations: Mutex<Registrations>,
}

#[derive(Default)]
struct Registrations {
    closed: bool,
    bindings: BTreeMap<BindingId, Box<dyn Binding>>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a binding until it is unregistered. Returns `None` if the set
    /// is closed, in which case the binding has already been unregistered.
    pub fn register(&self, binding: Box<dyn Binding>) -> Option<BindingId> {
        let mut registrations = self.lock();
        if registrations.closed {
            drop(registrations);
            tracing::debug!(kind = %binding.kind(), name = binding.name(), "binding refused: set closed");
            binding.unregister();
            return None;
        }
        let id = BindingId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(kind = %binding.kind(), name = binding.name(), "binding registered");
        registrations.bindings.insert(id, binding);
        Some(id)
    }

    /// Unregister a single binding. Returns `false` if it was already gone.
    pub fn unregister(&self, id: BindingId) -> bool {
        let removed = self.lock().bindings.remove(&id);
        match removed {
            Some(binding) => {
                binding.unregister();
                true
            }
            None => false,
        }
    }

    /// Unregister every binding, returning how many were removed. The set
    /// stays open.
    pub fn unregister_all(&self) -> usize {
        let drained = std::mem::take(&mut self.lock().bindings);
        Self::release(drained)
    }

    /// Unregister every binding and refuse any later registration.
    pub fn close(&self) -> usize {
        let drained = {
            let mut registrations = self.lock();
            registrations.closed = true;
            std::mem::take(&mut registrations.bindings)
        };
        Self::release(drained)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Runs without the lock held.
    fn release(drained: BTreeMap<BindingId, Box<dyn Binding>>) -> usize {
        for binding in drained.values() {
            tracing::debug!(kind = %binding.kind(), name = binding.name(), "binding unregistered");
            binding.unregister();
        }
        drained.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registrations> {
        self.inner
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for BindingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingSet").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingBinding {
        name: String,
        calls: Arc<AtomicUsize>,
    }

    impl Binding for CountingBinding {
        fn kind(&self) -> BindingKind {
            BindingKind::Event
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn unregister(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting(name: &str, calls: &Arc<AtomicUsize>) -> Box<dyn Binding> {
        Box::new(CountingBinding {
            name: name.to_string(),
            calls: calls.clone(),
        })
    }

    #[test]
    fn unregister_all_calls_each_binding_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = BindingSet::new();
        set.register(counting("player_join", &calls));
        set.register(counting("player_quit", &calls));

        assert_eq!(set.unregister_all(), 2);
        assert_eq!(set.unregister_all(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(set.is_empty());
    }

    #[test]
    fn unregister_single_binding() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = BindingSet::new();
        let id = set.register(counting("kick", &calls)).unwrap();
        set.register(counting("ban", &calls));

        assert!(set.unregister(id));
        assert!(!set.unregister(id));
        assert_eq!(set.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clones_share_registrations() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = BindingSet::new();
        let adapter_view = set.clone();
        adapter_view.register(counting("chat", &calls));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn unregister_all_keeps_set_open() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = BindingSet::new();
        set.register(counting("chat", &calls));
        set.unregister_all();

        assert!(!set.is_closed());
        assert!(set.register(counting("chat", &calls)).is_some());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn closed_set_refuses_registrations() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = BindingSet::new();
        set.register(counting("player_join", &calls));

        assert_eq!(set.close(), 1);
        assert!(set.is_closed());
        assert_eq!(set.register(counting("late", &calls)), None);

        // Both the drained and the refused binding were unregistered.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(set.is_empty());
        assert_eq!(set.close(), 0);
    }
}
