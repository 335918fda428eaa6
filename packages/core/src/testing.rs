//! A tiny line-oriented interpreter for exercising runtimes in tests.
//!
//! Scripts are `;`-separated statements:
//!
//! ```text
//! sleep 50; set counter 3; get counter
//! return "hello"
//! fail out of cheese
//! ```
//!
//! | Statement | Effect |
//! |-----------|--------|
//! | `sleep <ms>` | sleep the executing thread |
//! | `set <slot> <literal>` | store a value in the context |
//! | `incr <slot>` | add one to an integer slot (missing slots start at 0) |
//! | `get <slot>` | result becomes the slot's value (`nil` if unset) |
//! | `return <literal>` | result becomes the literal |
//! | `module` | result becomes the module name |
//! | `bindings` | result becomes the number of registered bindings |
//! | `fail <message>` | raise an execution fault |
//! | `panic <message>` | panic inside the interpreter |
//!
//! Literals are `nil`, `true`, `false`, integers, floats, or text (optionally
//! double-quoted).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::binding::BindingSet;
use crate::error::{ExecutionFault, LoadError, StartupFault};
use crate::interpreter::{Interpreter, InterpreterEngine, ModuleContext};
use crate::value::Value;

/// Bootstrap used when no override exists.
pub const DEFAULT_BOOTSTRAP: &str = "set booted true";

/// Engine producing [`ScriptInterpreter`] contexts.
#[derive(Debug)]
pub struct ScriptEngine {
    bootstrap: String,
    fail_create: bool,
    created: AtomicUsize,
}

impl ScriptEngine {
    pub fn new() -> Self {
        Self {
            bootstrap: DEFAULT_BOOTSTRAP.to_string(),
            fail_create: false,
            created: AtomicUsize::new(0),
        }
    }

    /// Replace the bundled bootstrap source.
    pub fn with_bootstrap(mut self, source: impl Into<String>) -> Self {
        self.bootstrap = source.into();
        self
    }

    /// Make every context creation fail.
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Number of contexts successfully created so far.
    pub fn contexts_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpreterEngine for ScriptEngine {
    type Interpreter = ScriptInterpreter;

    fn create(&self, ctx: &ModuleContext) -> Result<ScriptInterpreter, StartupFault> {
        if self.fail_create {
            return Err(StartupFault::Context(format!(
                "refusing to create context for {}",
                ctx.module
            )));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptInterpreter {
            module: ctx.module.clone(),
            bindings: ctx.bindings.clone(),
            slots: BTreeMap::new(),
        })
    }

    fn bootstrap_file_name(&self) -> &str {
        "init.script"
    }

    fn bundled_bootstrap(&self) -> &str {
        &self.bootstrap
    }
}

/// Context state of one script runtime.
pub struct ScriptInterpreter {
    module: String,
    bindings: BindingSet,
    slots: BTreeMap<String, Value>,
}

impl ScriptInterpreter {
    pub fn slot(&self, name: &str) -> Option<&Value> {
        self.slots.get(name)
    }

    pub fn set_slot(&mut self, name: impl Into<String>, value: Value) {
        self.slots.insert(name.into(), value);
    }
}

/// A parsed script.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    Sleep(Duration),
    Set(String, Value),
    Incr(String),
    Get(String),
    Return(Value),
    Module,
    Bindings,
    Fail(String),
    Panic(String),
}

impl Script {
    pub fn parse(source: &str) -> Result<Self, LoadError> {
        let statements = source
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_statement)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { statements })
    }
}

fn parse_statement(statement: &str) -> Result<Statement, LoadError> {
    let (keyword, rest) = match statement.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (statement, ""),
    };
    let require = |what: &str| {
        if rest.is_empty() {
            Err(LoadError::new(format!("`{}` expects {}", keyword, what)))
        } else {
            Ok(rest)
        }
    };

    match keyword {
        "sleep" => {
            let ms = require("milliseconds")?
                .parse::<u64>()
                .map_err(|e| LoadError::new(format!("bad sleep duration: {}", e)))?;
            Ok(Statement::Sleep(Duration::from_millis(ms)))
        }
        "set" => {
            let (slot, literal) = require("a slot and a value")?
                .split_once(char::is_whitespace)
                .ok_or_else(|| LoadError::new("`set` expects a slot and a value"))?;
            Ok(Statement::Set(slot.to_string(), parse_literal(literal.trim())))
        }
        "incr" => Ok(Statement::Incr(require("a slot")?.to_string())),
        "get" => Ok(Statement::Get(require("a slot")?.to_string())),
        "return" => Ok(Statement::Return(parse_literal(require("a value")?))),
        "module" => Ok(Statement::Module),
        "bindings" => Ok(Statement::Bindings),
        "fail" => Ok(Statement::Fail(rest.to_string())),
        "panic" => Ok(Statement::Panic(rest.to_string())),
        other => Err(LoadError::new(format!("unknown statement `{}`", other))),
    }
}

fn parse_literal(text: &str) -> Value {
    match text {
        "nil" => Value::Nil,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(i) = text.parse::<i64>() {
                Value::Integer(i)
            } else if let Ok(x) = text.parse::<f64>() {
                Value::Float(x)
            } else {
                let unquoted = text
                    .strip_prefix('"')
                    .and_then(|t| t.strip_suffix('"'))
                    .unwrap_or(text);
                Value::Text(unquoted.to_string())
            }
        }
    }
}

impl Interpreter for ScriptInterpreter {
    type Unit = Script;

    fn load(&mut self, source: &str, _chunk_name: &str) -> Result<Script, LoadError> {
        Script::parse(source)
    }

    fn load_file(&mut self, path: &Path) -> Result<Script, LoadError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| LoadError::new(format!("{}: {}", path.display(), e)))?;
        Script::parse(&source)
    }

    fn execute(&mut self, unit: &Script) -> Result<Value, ExecutionFault> {
        let mut result = Value::Nil;
        for statement in &unit.statements {
            match statement {
                Statement::Sleep(d) => std::thread::sleep(*d),
                Statement::Set(slot, value) => {
                    self.slots.insert(slot.clone(), value.clone());
                }
                Statement::Incr(slot) => {
                    let entry = self.slots.entry(slot.clone()).or_insert(Value::Integer(0));
                    match entry {
                        Value::Integer(i) => *i += 1,
                        other => {
                            return Err(ExecutionFault::new(format!(
                                "cannot increment {} in slot {}",
                                other, slot
                            )))
                        }
                    }
                }
                Statement::Get(slot) => {
                    result = self.slots.get(slot).cloned().unwrap_or_default();
                }
                Statement::Return(value) => result = value.clone(),
                Statement::Module => result = Value::Text(self.module.clone()),
                Statement::Bindings => result = Value::Integer(self.bindings.len() as i64),
                Statement::Fail(message) => return Err(ExecutionFault::new(message.clone())),
                Statement::Panic(message) => panic!("{}", message),
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter() -> ScriptInterpreter {
        ScriptInterpreter {
            module: "alpha".to_string(),
            bindings: BindingSet::new(),
            slots: BTreeMap::new(),
        }
    }

    fn run(interp: &mut ScriptInterpreter, source: &str) -> Result<Value, ExecutionFault> {
        let script = interp.load(source, "test").unwrap();
        interp.execute(&script)
    }

    #[test]
    fn slots_persist_between_executions() {
        let mut interp = interpreter();
        run(&mut interp, "set n 4").unwrap();
        assert_eq!(run(&mut interp, "incr n; get n"), Ok(Value::Integer(5)));
    }

    #[test]
    fn literals() {
        let mut interp = interpreter();
        assert_eq!(run(&mut interp, "return 1.5"), Ok(Value::Float(1.5)));
        assert_eq!(run(&mut interp, "return \"two words\""), Ok(Value::from("two words")));
        assert_eq!(run(&mut interp, "return nil"), Ok(Value::Nil));
        assert_eq!(run(&mut interp, "module"), Ok(Value::from("alpha")));
    }

    #[test]
    fn fail_is_a_fault() {
        let mut interp = interpreter();
        assert_eq!(
            run(&mut interp, "set a 1; fail nope; set a 2"),
            Err(ExecutionFault::new("nope"))
        );
        assert_eq!(interp.slot("a"), Some(&Value::Integer(1)));
    }

    #[test]
    fn unknown_statement_is_a_load_error() {
        let mut interp = interpreter();
        let err = interp.load("frobnicate 3", "test").unwrap_err();
        assert_eq!(err, LoadError::new("unknown statement `frobnicate`"));
        assert!(interp.load("sleep soon", "test").is_err());
        assert!(interp.load("set lonely", "test").is_err());
    }
}
