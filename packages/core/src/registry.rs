//! The module registry: at most one live runtime per module name.
//!
//! Every structural change to the name → runtime map happens under one
//! registry lock, including the synchronous termination a reload performs.
//! The lock is always taken before touching a runtime, never while holding
//! a runtime's interpreter mutex, and task submission never needs it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::HostConfig;
use crate::discovery::{discover_modules, validate_module_name};
use crate::error::Result;
use crate::host::HostCapabilities;
use crate::interpreter::InterpreterEngine;
use crate::runtime::{ModuleRuntime, RuntimeState};

/// What [`ModuleRegistry::start`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new runtime was created.
    Started,
    /// A live runtime was terminated and replaced.
    Restarted,
    /// A live runtime already existed and was left alone.
    AlreadyRunning,
}

/// Running status of a discoverable module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleStatus {
    pub name: String,
    pub running: bool,
}

type RuntimeMap<E> = BTreeMap<String, Arc<ModuleRuntime<E>>>;

/// Owns every module runtime of a host.
pub struct ModuleRegistry<E: InterpreterEngine> {
    config: HostConfig,
    engine: Arc<E>,
    host: HostCapabilities,
    runtimes: Mutex<RuntimeMap<E>>,
}

impl<E: InterpreterEngine> ModuleRegistry<E> {
    pub fn new(config: HostConfig, engine: E, host: HostCapabilities) -> Self {
        Self {
            config,
            engine: Arc::new(engine),
            host,
            runtimes: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Start a module.
    ///
    /// If the module is already live, nothing happens unless `overwrite` is
    /// set, in which case the old runtime is terminated and joined before
    /// the new one is created.
    pub fn start(&self, name: &str, overwrite: bool) -> Result<StartOutcome> {
        validate_module_name(name)?;
        let mut runtimes = self.lock();
        self.start_locked(&mut runtimes, name, overwrite)
    }

    /// Stop a module. Returns `false` if it had no entry.
    pub fn stop(&self, name: &str) -> bool {
        let mut runtimes = self.lock();
        match runtimes.remove(name) {
            Some(runtime) => {
                runtime.terminate(true);
                true
            }
            None => false,
        }
    }

    /// Terminate every runtime and clear the map.
    pub fn stop_all(&self) {
        let mut runtimes = self.lock();
        Self::stop_all_locked(&mut runtimes);
    }

    /// Stop everything, then start every discoverable module. Returns the
    /// names that were started.
    pub fn restart_all(&self) -> Result<Vec<String>> {
        let mut runtimes = self.lock();
        Self::stop_all_locked(&mut runtimes);

        let modules = discover_modules(&self.config.modules_dir())?;
        let mut started = Vec::with_capacity(modules.len());
        for name in modules {
            match self.start_locked(&mut runtimes, &name, false) {
                Ok(_) => started.push(name),
                Err(e) => tracing::error!(module = %name, error = %e, "failed to start module"),
            }
        }
        Ok(started)
    }

    /// Discoverable module names, regardless of whether they are running.
    pub fn list(&self) -> Result<Vec<String>> {
        discover_modules(&self.config.modules_dir())
    }

    /// Drop entries whose runtime has already terminated. Returns the names
    /// removed.
    pub fn cleanup(&self) -> Vec<String> {
        let mut runtimes = self.lock();
        let stale: Vec<String> = runtimes
            .iter()
            .filter(|(_, runtime)| runtime.state() == RuntimeState::Terminated)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &stale {
            runtimes.remove(name);
            tracing::debug!(module = %name, "removed terminated runtime");
        }
        stale
    }

    /// The runtime registered under `name`, live or not.
    pub fn get(&self, name: &str) -> Option<Arc<ModuleRuntime<E>>> {
        self.lock().get(name).cloned()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.get(name).is_some_and(|runtime| runtime.is_running())
    }

    /// Names of live runtimes.
    pub fn running(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, runtime)| runtime.is_running())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Every discoverable module with its status, followed by live modules
    /// that are no longer discoverable.
    pub fn statuses(&self) -> Result<Vec<ModuleStatus>> {
        self.cleanup();
        let discovered = self.list()?;
        let runtimes = self.lock();

        let mut statuses: Vec<ModuleStatus> = discovered
            .iter()
            .map(|name| ModuleStatus {
                name: name.clone(),
                running: runtimes.get(name).is_some_and(|r| r.is_running()),
            })
            .collect();
        statuses.extend(
            runtimes
                .iter()
                .filter(|(name, runtime)| runtime.is_running() && !discovered.contains(*name))
                .map(|(name, _)| ModuleStatus {
                    name: name.clone(),
                    running: true,
                }),
        );
        Ok(statuses)
    }

    fn start_locked(
        &self,
        runtimes: &mut RuntimeMap<E>,
        name: &str,
        overwrite: bool,
    ) -> Result<StartOutcome> {
        let mut outcome = StartOutcome::Started;
        if let Some(existing) = runtimes.get(name) {
            if existing.is_running() {
                if !overwrite {
                    tracing::debug!(module = name, "already running");
                    return Ok(StartOutcome::AlreadyRunning);
                }
                existing.terminate(true);
                outcome = StartOutcome::Restarted;
            }
        }

        let runtime = ModuleRuntime::new(name, &self.config, self.engine.clone(), self.host.clone());
        runtimes.insert(name.to_string(), runtime.clone());
        if let Err(e) = runtime.spawn() {
            runtimes.remove(name);
            return Err(e);
        }
        tracing::info!(module = name, runtime = %runtime.id(), "module started");
        Ok(outcome)
    }

    fn stop_all_locked(runtimes: &mut RuntimeMap<E>) {
        for runtime in runtimes.values() {
            runtime.terminate(true);
        }
        runtimes.clear();
    }

    fn lock(&self) -> MutexGuard<'_, RuntimeMap<E>> {
        self.runtimes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: InterpreterEngine> Drop for ModuleRegistry<E> {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use crate::testing::{ScriptEngine, ScriptInterpreter};
    use crate::value::Value;
    use std::time::Duration;

    fn registry_with(modules: &[&str]) -> (tempfile::TempDir, ModuleRegistry<ScriptEngine>) {
        registry_with_engine(modules, ScriptEngine::new())
    }

    fn registry_with_engine(
        modules: &[&str],
        engine: ScriptEngine,
    ) -> (tempfile::TempDir, ModuleRegistry<ScriptEngine>) {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig::new(dir.path());
        config.ensure_dirs().unwrap();
        for module in modules {
            std::fs::create_dir(config.module_dir(module)).unwrap();
        }
        (dir, ModuleRegistry::new(config, engine, HostCapabilities::new()))
    }

    fn live_count(registry: &ModuleRegistry<ScriptEngine>, name: &str) -> usize {
        registry
            .lock()
            .iter()
            .filter(|(n, r)| n.as_str() == name && r.is_running())
            .count()
    }

    #[test]
    fn start_is_idempotent_without_overwrite() {
        let (_dir, registry) = registry_with(&["alpha", "beta"]);

        assert_eq!(registry.start("alpha", false).unwrap(), StartOutcome::Started);
        let first = registry.get("alpha").unwrap();
        assert_eq!(
            registry.start("alpha", false).unwrap(),
            StartOutcome::AlreadyRunning
        );
        let second = registry.get("alpha").unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(live_count(&registry, "alpha"), 1);
        assert!(first.wait_ready());
        assert_eq!(registry.engine().contexts_created(), 1);
    }

    #[test]
    fn list_reports_running_status() {
        let (_dir, registry) = registry_with(&["alpha", "beta"]);
        registry.start("alpha", false).unwrap();

        let statuses = registry.statuses().unwrap();
        assert_eq!(
            statuses,
            vec![
                ModuleStatus {
                    name: "alpha".into(),
                    running: true
                },
                ModuleStatus {
                    name: "beta".into(),
                    running: false
                },
            ]
        );
        assert_eq!(registry.list().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn overwrite_replaces_runtime_without_sharing_state() {
        let (_dir, registry) = registry_with(&["alpha"]);
        registry.start("alpha", false).unwrap();
        let old = registry.get("alpha").unwrap();
        old.wait_ready();

        let set = old.execute_unit(old.load("set counter 10").unwrap());
        old.submit(&set, true);

        assert_eq!(registry.start("alpha", true).unwrap(), StartOutcome::Restarted);
        assert_eq!(old.state(), RuntimeState::Terminated);

        let new = registry.get("alpha").unwrap();
        assert_ne!(old.id(), new.id());
        assert!(new.wait_ready());
        let get = new.execute_unit(new.load("get counter").unwrap());
        assert_eq!(new.submit(&get, true), Some(Value::Nil));
        assert_eq!(live_count(&registry, "alpha"), 1);
    }

    #[test]
    fn stop_then_submit_on_retained_handle() {
        let (_dir, registry) = registry_with(&["alpha", "beta"]);
        registry.start("alpha", false).unwrap();
        let handle = registry.get("alpha").unwrap();
        handle.wait_ready();

        assert!(registry.stop("alpha"));
        assert!(!registry.stop("alpha"));
        assert!(!registry.statuses().unwrap()[0].running);

        let task = Task::new(|_: &mut ScriptInterpreter| Ok(Value::Integer(1)));
        let (tx, rx) = std::sync::mpsc::channel();
        let handle_clone = handle.clone();
        let task_clone = task.clone();
        std::thread::spawn(move || {
            tx.send(handle_clone.submit(&task_clone, true)).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), None);
    }

    #[test]
    fn stop_all_and_restart_all() {
        let (_dir, registry) = registry_with(&["alpha", "beta", "gamma"]);
        registry.start("alpha", false).unwrap();
        let old_alpha = registry.get("alpha").unwrap();

        let started = registry.restart_all().unwrap();
        assert_eq!(started, vec!["alpha", "beta", "gamma"]);
        assert_eq!(old_alpha.state(), RuntimeState::Terminated);
        assert_eq!(registry.running(), vec!["alpha", "beta", "gamma"]);

        registry.stop_all();
        assert!(registry.running().is_empty());
        assert!(registry.get("beta").is_none());
    }

    #[test]
    fn cleanup_removes_self_terminated_runtimes() {
        let engine = ScriptEngine::new().with_bootstrap("fail broken bootstrap");
        let (_dir, registry) = registry_with_engine(&["alpha"], engine);
        registry.start("alpha", false).unwrap();
        let runtime = registry.get("alpha").unwrap();
        assert!(runtime.wait_terminated(Duration::from_secs(5)));

        assert!(!registry.is_running("alpha"));
        assert_eq!(registry.cleanup(), vec!["alpha"]);
        assert!(registry.get("alpha").is_none());
    }

    #[test]
    fn start_after_self_termination_creates_new_runtime() {
        let engine = ScriptEngine::new().with_bootstrap("fail broken bootstrap");
        let (_dir, registry) = registry_with_engine(&["alpha"], engine);
        registry.start("alpha", false).unwrap();
        let broken = registry.get("alpha").unwrap();
        broken.wait_terminated(Duration::from_secs(5));

        assert_eq!(registry.start("alpha", false).unwrap(), StartOutcome::Started);
        assert_ne!(registry.get("alpha").unwrap().id(), broken.id());
    }

    #[test]
    fn invalid_names_are_rejected() {
        let (_dir, registry) = registry_with(&[]);
        assert!(registry.start("../escape", false).is_err());
        assert!(registry.start("", false).is_err());
        assert!(registry.running().is_empty());
    }

    #[test]
    fn concurrent_starts_keep_one_runtime() {
        let (_dir, registry) = registry_with(&["alpha"]);
        let registry = Arc::new(registry);

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.start("alpha", i % 2 == 0).unwrap())
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
            assert!(live_count(&registry, "alpha") <= 1);
        }
        assert_eq!(live_count(&registry, "alpha"), 1);
    }

    #[test]
    fn restart_all_with_missing_storage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig::new(dir.path().join("nowhere"));
        let registry = ModuleRegistry::new(config, ScriptEngine::new(), HostCapabilities::new());
        assert!(registry.restart_all().is_err());
        assert!(registry.list().is_err());
    }
}
