//! # modhost-core
//!
//! Runs independently named modules of interpreted code side by side, each
//! in its own interpreter context, while staying controllable from any
//! thread.
//!
//! ## Core Concepts
//!
//! ### Module Runtimes
//!
//! A [`ModuleRuntime`] is the live environment behind one module: a
//! dedicated worker thread, one single-threaded interpreter context guarded
//! by a mutex, and a FIFO queue of [`Task`]s. Any thread may submit tasks,
//! either waiting for the result or not. The host's main loop may also run
//! code directly under the same mutex.
//!
//! ### The Registry
//!
//! The [`ModuleRegistry`] maps module names to runtimes and guarantees at
//! most one live runtime per name. Reloading a module joins the old worker
//! before the new one starts, so two generations never share interpreter
//! state.
//!
//! ### Interpreters
//!
//! The hosted language is opaque. An [`InterpreterEngine`] builds one
//! [`Interpreter`] per runtime; the runtime only loads code into it and
//! executes the resulting units.
//!
//! ## Example
//!
//! ```ignore
//! use modhost_core::{HostCapabilities, HostConfig, ModuleRegistry};
//!
//! let registry = ModuleRegistry::new(
//!     HostConfig::new("/srv/modhost"),
//!     my_engine,
//!     HostCapabilities::new(),
//! );
//! registry.restart_all()?;
//!
//! let runtime = registry.get("greeter").unwrap();
//! let unit = runtime.load("return 42")?;
//! let task = runtime.execute_unit(unit);
//! assert_eq!(runtime.submit(&task, true), Some(Value::Integer(42)));
//! ```

pub mod binding;
pub mod config;
pub mod discovery;
pub mod error;
pub mod host;
pub mod interpreter;
pub mod registry;
pub mod runtime;
pub mod task;
pub mod value;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use binding::{Binding, BindingId, BindingKind, BindingSet};
pub use config::HostConfig;
pub use discovery::{discover_modules, validate_module_name};
pub use error::{ExecutionFault, LoadError, Result, RuntimeError, StartupFault};
pub use host::{ChatFormatter, HostCapabilities, MainThreadJob, MainThreadScheduler, ManualScheduler};
pub use interpreter::{Interpreter, InterpreterEngine, ModuleContext};
pub use registry::{ModuleRegistry, ModuleStatus, StartOutcome};
pub use runtime::{InterpreterOf, ModuleRuntime, RuntimeId, RuntimeState, UnitOf};
pub use task::{Task, TaskState};
pub use value::Value;
