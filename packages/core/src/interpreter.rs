//! The boundary to the interpreter library.
//!
//! A runtime never looks inside the language it hosts. It asks an
//! [`InterpreterEngine`] for one context per runtime, then only ever loads
//! code into that context and executes the resulting units.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::binding::BindingSet;
use crate::error::{ExecutionFault, LoadError, StartupFault};
use crate::host::ChatFormatter;
use crate::runtime::RuntimeId;
use crate::value::Value;

/// A single-threaded interpreter context.
///
/// Contexts are never used concurrently, but the interpreter mutex may hand
/// one to the worker thread or to a direct caller, so they must be `Send`.
pub trait Interpreter: Send + 'static {
    /// An executable unit produced by loading code.
    type Unit: Send + 'static;

    /// Compile source text. `chunk_name` labels the code in diagnostics.
    fn load(&mut self, source: &str, chunk_name: &str) -> Result<Self::Unit, LoadError>;

    /// Compile a script file.
    fn load_file(&mut self, path: &Path) -> Result<Self::Unit, LoadError>;

    /// Execute a previously loaded unit.
    fn execute(&mut self, unit: &Self::Unit) -> Result<Value, ExecutionFault>;
}

/// Creates interpreter contexts and describes their bootstrap script.
pub trait InterpreterEngine: Send + Sync + 'static {
    type Interpreter: Interpreter;

    /// Build a fresh context for one runtime.
    fn create(&self, ctx: &ModuleContext) -> Result<Self::Interpreter, StartupFault>;

    /// File name looked up in the base directory to override the bootstrap.
    fn bootstrap_file_name(&self) -> &str;

    /// Bootstrap source used when no override exists.
    fn bundled_bootstrap(&self) -> &str;
}

/// What an interpreter context knows about the module it belongs to.
///
/// This is the back-reference interpreted code uses to reach the host.
#[derive(Clone)]
pub struct ModuleContext {
    pub module: String,
    pub runtime_id: RuntimeId,
    pub base_dir: PathBuf,
    pub module_dir: PathBuf,
    pub scripts_dir: PathBuf,
    pub bindings: BindingSet,
    pub chat: Option<Arc<dyn ChatFormatter>>,
}

impl std::fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("module", &self.module)
            .field("runtime_id", &self.runtime_id)
            .field("module_dir", &self.module_dir)
            .field("chat", &self.chat.is_some())
            .finish()
    }
}

/// Locate the bootstrap script and run it in a fresh context.
pub(crate) fn bootstrap<E: InterpreterEngine>(
    engine: &E,
    interpreter: &mut E::Interpreter,
    base_dir: &Path,
) -> Result<Value, StartupFault> {
    let override_path = base_dir.join(engine.bootstrap_file_name());
    let unit = if override_path.is_file() {
        tracing::debug!(path = %override_path.display(), "using bootstrap override");
        interpreter.load_file(&override_path)?
    } else {
        interpreter.load(engine.bundled_bootstrap(), engine.bootstrap_file_name())?
    };
    Ok(interpreter.execute(&unit)?)
}
