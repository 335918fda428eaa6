//! WebAssembly modules driven through the registry.

use std::fs;
use std::time::Duration;

use modhost_core::{HostCapabilities, HostConfig, ModuleRegistry, StartOutcome, Value};
use modhost_wasm::WasmEngine;

const COUNTER: &str = r#"(module
  (import "host" "get" (func $get (param i32) (result i64)))
  (import "host" "set" (func $set (param i32 i64)))
  (func (export "run") (result i64)
    (call $set (i32.const 1) (i64.add (call $get (i32.const 1)) (i64.const 1)))
    (call $get (i32.const 1))))"#;

const READ_SLOT_ZERO: &str = r#"(module
  (import "host" "get" (func $get (param i32) (result i64)))
  (func (export "run") (result i64) (call $get (i32.const 0))))"#;

fn registry(modules: &[&str]) -> (tempfile::TempDir, ModuleRegistry<WasmEngine>) {
    let dir = tempfile::tempdir().unwrap();
    let config = HostConfig::new(dir.path());
    config.ensure_dirs().unwrap();
    for module in modules {
        fs::create_dir_all(config.module_dir(module)).unwrap();
    }
    let registry = ModuleRegistry::new(config, WasmEngine::new().unwrap(), HostCapabilities::new());
    (dir, registry)
}

#[test]
fn bundled_bootstrap_runs_before_user_code() {
    let (_dir, registry) = registry(&["alpha"]);
    assert_eq!(registry.restart_all().unwrap(), vec!["alpha".to_string()]);

    let runtime = registry.get("alpha").unwrap();
    assert!(runtime.wait_ready());
    let unit = runtime.load(READ_SLOT_ZERO).unwrap();
    let task = runtime.execute_unit(unit);
    assert_eq!(runtime.submit(&task, true), Some(Value::Integer(1)));
}

#[test]
fn bootstrap_override_from_base_dir() {
    let (_dir, registry) = registry(&["alpha"]);
    fs::write(
        registry.config().base_dir().join("init.wat"),
        r#"(module
             (import "host" "set" (func $set (param i32 i64)))
             (func (export "run") (call $set (i32.const 0) (i64.const 7))))"#,
    )
    .unwrap();

    registry.start("alpha", false).unwrap();
    let runtime = registry.get("alpha").unwrap();
    assert!(runtime.wait_ready());
    let unit = runtime.load(READ_SLOT_ZERO).unwrap();
    assert_eq!(runtime.submit(&runtime.execute_unit(unit), true), Some(Value::Integer(7)));
}

#[test]
fn reload_starts_from_a_fresh_context() {
    let (_dir, registry) = registry(&["alpha"]);
    registry.start("alpha", false).unwrap();

    let runtime = registry.get("alpha").unwrap();
    assert!(runtime.wait_ready());
    let unit = runtime.load(COUNTER).unwrap();
    let task = runtime.execute_unit(unit);
    assert_eq!(runtime.submit(&task, true), Some(Value::Integer(1)));
    assert_eq!(runtime.submit(&task, true), Some(Value::Integer(2)));

    assert_eq!(registry.start("alpha", true).unwrap(), StartOutcome::Restarted);
    assert!(runtime.wait_terminated(Duration::from_secs(1)));

    let fresh = registry.get("alpha").unwrap();
    assert_ne!(fresh.id(), runtime.id());
    assert!(fresh.wait_ready());
    let unit = fresh.load(COUNTER).unwrap();
    assert_eq!(fresh.submit(&fresh.execute_unit(unit), true), Some(Value::Integer(1)));
}

#[test]
fn scripts_run_from_files() {
    let (_dir, registry) = registry(&["alpha"]);
    let script = registry.config().scripts_dir().join("answer.wat");
    fs::write(&script, r#"(module (func (export "run") (result i32) (i32.const 42)))"#).unwrap();

    registry.start("alpha", false).unwrap();
    let runtime = registry.get("alpha").unwrap();
    assert!(runtime.wait_ready());
    let unit = runtime.load_file(&script).unwrap();
    assert_eq!(runtime.submit(&runtime.execute_unit(unit), true), Some(Value::Integer(42)));
}

#[test]
fn trapping_task_leaves_runtime_usable() {
    let (_dir, registry) = registry(&["alpha"]);
    registry.start("alpha", false).unwrap();
    let runtime = registry.get("alpha").unwrap();
    assert!(runtime.wait_ready());

    let trap = runtime
        .load(r#"(module (func (export "run") unreachable))"#)
        .unwrap();
    assert_eq!(runtime.submit(&runtime.execute_unit(trap), true), None);

    let unit = runtime.load(READ_SLOT_ZERO).unwrap();
    assert_eq!(runtime.submit(&runtime.execute_unit(unit), true), Some(Value::Integer(1)));
    assert!(runtime.is_running());
}

#[test]
fn malformed_source_reports_a_load_error() {
    let (_dir, registry) = registry(&["alpha"]);
    registry.start("alpha", false).unwrap();
    let runtime = registry.get("alpha").unwrap();
    assert!(runtime.wait_ready());

    let err = runtime.load("(module (func").unwrap_err();
    assert!(err.to_string().contains("=alpha"), "{}", err);
}
