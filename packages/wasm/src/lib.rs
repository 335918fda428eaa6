//! WebAssembly interpreter contexts for modhost runtimes.
//!
//! Loading compiles a core WebAssembly module (binary or WAT text) into a
//! [`Module`]. Executing instantiates it against the host imports in a fresh
//! Wasmtime [`Store`] and calls its exported `run` function, if it has one.
//! The store is dropped after the call, so instances never pile up in a
//! long-lived context.
//!
//! Guests see a small host interface under the `host` import module:
//!
//! | Import | Signature | Effect |
//! |--------|-----------|--------|
//! | `log` | `(i64)` | emit a tracing event tagged with the module name |
//! | `get` | `(i32) -> i64` | read a context slot (unset slots read as 0) |
//! | `set` | `(i32, i64)` | write a context slot |
//! | `bindings` | `() -> i32` | number of bindings registered for the module |
//!
//! Slots live in the interpreter and are lent to each execution's store, so
//! they survive across executions in the same context and vanish when the
//! runtime is torn down.

use std::collections::BTreeMap;
use std::path::Path;

use modhost_core::{
    BindingSet, ExecutionFault, Interpreter, InterpreterEngine, LoadError, ModuleContext,
    RuntimeError, RuntimeId, StartupFault, Value,
};
use wasmtime::{Caller, Config, Engine, Linker, Module, Store, Val};

/// Name of the bootstrap override looked up in the base directory.
pub const BOOTSTRAP_FILE_NAME: &str = "init.wat";

/// Bootstrap run in every new context when no override exists.
pub const BUNDLED_BOOTSTRAP: &str = include_str!("../bootstrap/init.wat");

/// Builds one [`WasmInterpreter`] per module runtime.
///
/// The underlying Wasmtime engine is shared by every context; compiled
/// modules are not.
#[derive(Clone)]
pub struct WasmEngine {
    engine: Engine,
}

impl WasmEngine {
    pub fn new() -> modhost_core::Result<Self> {
        let config = Config::new();
        let engine = Engine::new(&config)
            .map_err(|e| RuntimeError::Config(format!("wasmtime engine: {}", e)))?;
        Ok(Self { engine })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn linker(&self) -> std::result::Result<Linker<WasmModuleState>, StartupFault> {
        let mut linker = Linker::new(&self.engine);
        let context = |e: wasmtime::Error| StartupFault::Context(format!("host import: {}", e));

        linker
            .func_wrap("host", "log", |caller: Caller<'_, WasmModuleState>, value: i64| {
                tracing::info!(module = %caller.data().module, value, "guest log");
            })
            .map_err(context)?;
        linker
            .func_wrap("host", "get", |caller: Caller<'_, WasmModuleState>, slot: i32| -> i64 {
                caller.data().slot(slot)
            })
            .map_err(context)?;
        linker
            .func_wrap(
                "host",
                "set",
                |mut caller: Caller<'_, WasmModuleState>, slot: i32, value: i64| {
                    caller.data_mut().set_slot(slot, value);
                },
            )
            .map_err(context)?;
        linker
            .func_wrap("host", "bindings", |caller: Caller<'_, WasmModuleState>| -> i32 {
                i32::try_from(caller.data().bindings.len()).unwrap_or(i32::MAX)
            })
            .map_err(context)?;

        Ok(linker)
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine").finish_non_exhaustive()
    }
}

impl InterpreterEngine for WasmEngine {
    type Interpreter = WasmInterpreter;

    fn create(&self, ctx: &ModuleContext) -> std::result::Result<WasmInterpreter, StartupFault> {
        let linker = self.linker()?;
        let state = WasmModuleState::new(ctx.module.clone(), ctx.runtime_id, ctx.bindings.clone());
        tracing::debug!(module = %ctx.module, runtime = %ctx.runtime_id, "created wasm context");
        Ok(WasmInterpreter {
            engine: self.engine.clone(),
            linker,
            state,
        })
    }

    fn bootstrap_file_name(&self) -> &str {
        BOOTSTRAP_FILE_NAME
    }

    fn bundled_bootstrap(&self) -> &str {
        BUNDLED_BOOTSTRAP
    }
}

/// Per-context state, handed to the Wasmtime store for each execution.
pub struct WasmModuleState {
    /// Module this context belongs to.
    pub module: String,

    /// Runtime generation that owns the context.
    pub runtime_id: RuntimeId,

    bindings: BindingSet,
    slots: BTreeMap<i32, i64>,
}

impl WasmModuleState {
    pub fn new(module: String, runtime_id: RuntimeId, bindings: BindingSet) -> Self {
        Self {
            module,
            runtime_id,
            bindings,
            slots: BTreeMap::new(),
        }
    }

    pub fn slot(&self, slot: i32) -> i64 {
        self.slots.get(&slot).copied().unwrap_or(0)
    }

    pub fn set_slot(&mut self, slot: i32, value: i64) {
        self.slots.insert(slot, value);
    }

    /// Move the slots into a new state for one store, leaving this one empty
    /// until [`WasmModuleState::restore`].
    fn lend(&mut self) -> Self {
        Self {
            module: self.module.clone(),
            runtime_id: self.runtime_id,
            bindings: self.bindings.clone(),
            slots: std::mem::take(&mut self.slots),
        }
    }

    fn restore(&mut self, lent: Self) {
        self.slots = lent.slots;
    }
}

/// One WebAssembly context.
pub struct WasmInterpreter {
    engine: Engine,
    linker: Linker<WasmModuleState>,
    state: WasmModuleState,
}

impl WasmInterpreter {
    pub fn state(&self) -> &WasmModuleState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut WasmModuleState {
        &mut self.state
    }

    fn call_run(
        &self,
        store: &mut Store<WasmModuleState>,
        unit: &Module,
    ) -> std::result::Result<Value, ExecutionFault> {
        let fault = |e: wasmtime::Error| ExecutionFault::new(format!("{:#}", e));

        let instance = self.linker.instantiate(&mut *store, unit).map_err(fault)?;
        let Some(run) = instance.get_func(&mut *store, "run") else {
            return Ok(Value::Nil);
        };

        let ty = run.ty(&*store);
        if ty.params().next().is_some() {
            return Err(ExecutionFault::new("exported `run` must take no parameters"));
        }
        let mut results = vec![Val::I32(0); ty.results().len()];
        run.call(&mut *store, &[], &mut results).map_err(fault)?;

        Ok(results.first().map(val_to_value).unwrap_or_default())
    }
}

impl Interpreter for WasmInterpreter {
    type Unit = Module;

    fn load(&mut self, source: &str, chunk_name: &str) -> std::result::Result<Module, LoadError> {
        Module::new(&self.engine, source)
            .map_err(|e| LoadError::new(format!("{}: {:#}", chunk_name, e)))
    }

    fn load_file(&mut self, path: &Path) -> std::result::Result<Module, LoadError> {
        Module::from_file(&self.engine, path)
            .map_err(|e| LoadError::new(format!("{}: {:#}", path.display(), e)))
    }

    fn execute(&mut self, unit: &Module) -> std::result::Result<Value, ExecutionFault> {
        let mut store = Store::new(&self.engine, self.state.lend());
        let result = self.call_run(&mut store, unit);
        self.state.restore(store.into_data());
        result
    }
}

/// Map a WebAssembly result to a host value. Reference types have no
/// counterpart and come back as nil.
fn val_to_value(val: &Val) -> Value {
    match val {
        Val::I32(i) => Value::Integer(i64::from(*i)),
        Val::I64(i) => Value::Integer(*i),
        Val::F32(bits) => Value::Float(f64::from(f32::from_bits(*bits))),
        Val::F64(bits) => Value::Float(f64::from_bits(*bits)),
        _ => Value::Nil,
    }
}
