//! Administrative commands against a live registry.

use std::fs;
use std::sync::Arc;

use modhost_admin::io::TestHost;
use modhost_admin::{execute, CommandResult, Console};
use modhost_core::testing::ScriptEngine;
use modhost_core::{HostCapabilities, HostConfig, ManualScheduler, ModuleRegistry};

fn registry(modules: &[&str]) -> (tempfile::TempDir, ModuleRegistry<ScriptEngine>) {
    let dir = tempfile::tempdir().unwrap();
    let config = HostConfig::new(dir.path());
    config.ensure_dirs().unwrap();
    for module in modules {
        fs::create_dir_all(config.module_dir(module)).unwrap();
    }
    (dir, ModuleRegistry::new(config, ScriptEngine::new(), HostCapabilities::new()))
}

fn reply(result: CommandResult) -> String {
    match result {
        CommandResult::Ok(Some(text)) => text,
        other => panic!("expected a reply, got {:?}", other),
    }
}

fn failure(result: CommandResult) -> String {
    match result {
        CommandResult::Error(text) => text,
        other => panic!("expected a failure, got {:?}", other),
    }
}

#[test]
fn load_run_unload() {
    let (_dir, registry) = registry(&["alpha"]);

    assert_eq!(reply(execute("load alpha", &registry)), "[MH] Loaded module alpha");
    assert_eq!(
        reply(execute("load alpha", &registry)),
        "[MH] Module alpha is already running"
    );
    assert_eq!(reply(execute("run alpha get booted", &registry)), "[MH] Code = true");
    assert_eq!(
        reply(execute("run alpha set n 41; incr n; get n", &registry)),
        "[MH] Code = 42"
    );
    assert_eq!(reply(execute("run alpha module", &registry)), "[MH] Code = \"alpha\"");

    assert_eq!(reply(execute("unload alpha", &registry)), "[MH] Unloaded module alpha");
    assert_eq!(
        failure(execute("unload alpha", &registry)),
        "[MH] Module alpha is not running"
    );
    assert_eq!(
        failure(execute("run alpha get n", &registry)),
        "[MH] Module alpha is not running"
    );
}

#[test]
fn reload_resets_module_state() {
    let (_dir, registry) = registry(&["alpha"]);
    execute("load alpha", &registry);
    execute("run alpha set n 5", &registry);

    assert_eq!(reply(execute("reload alpha", &registry)), "[MH] Reloaded module alpha");
    assert_eq!(reply(execute("run alpha get n", &registry)), "[MH] Code = nil");
}

#[test]
fn reload_all_starts_discoverable_modules() {
    let (_dir, registry) = registry(&["alpha", "beta"]);
    assert_eq!(
        reply(execute("reload", &registry)),
        "[MH] Reloaded all modules (2 running)"
    );
    assert_eq!(registry.running(), vec!["alpha".to_string(), "beta".to_string()]);
}

#[test]
fn code_errors_are_reported() {
    let (_dir, registry) = registry(&["alpha"]);
    execute("load alpha", &registry);

    assert_eq!(
        failure(execute("run alpha teleport home", &registry)),
        "[MH] Error in code: unknown statement `teleport`"
    );
    let faulted = failure(execute("run alpha fail nope", &registry));
    assert!(faulted.starts_with("[MH] Code in module alpha produced no result"));

    // Still serving after both.
    assert_eq!(reply(execute("run alpha return 1", &registry)), "[MH] Code = 1");
}

#[test]
fn runfile_reads_from_scripts_dir() {
    let (_dir, registry) = registry(&["alpha"]);
    let scripts = registry.config().scripts_dir();
    fs::create_dir_all(scripts.join("tools")).unwrap();
    fs::write(scripts.join("tools/answer.script"), "return 42").unwrap();
    execute("load alpha", &registry);

    assert_eq!(
        reply(execute("runfile alpha tools/answer.script", &registry)),
        "[MH] Code = 42"
    );
    assert!(failure(execute("runfile alpha missing.script", &registry))
        .starts_with("[MH] Error in file: "));
    assert_eq!(
        failure(execute("runfile alpha ../outside.script", &registry)),
        "[MH] Script path ../outside.script escapes the scripts directory"
    );
}

#[test]
fn list_colors_running_and_stopped() {
    let (_dir, registry) = registry(&["alpha", "beta"]);
    execute("load beta", &registry);

    let text = reply(execute("list", &registry));
    assert!(text.starts_with("[MH] Modules: "));
    assert!(text.contains(&nu_ansi_term::Color::Red.paint("alpha").to_string()));
    assert!(text.contains(&nu_ansi_term::Color::Green.paint("beta").to_string()));
}

#[test]
fn list_with_no_modules() {
    let (_dir, registry) = registry(&[]);
    assert_eq!(reply(execute("list", &registry)), "[MH] Modules: (none)");
}

#[test]
fn invalid_module_names_are_rejected() {
    let (_dir, registry) = registry(&[]);
    let text = failure(execute("load ../etc", &registry));
    assert!(text.starts_with("[MH] invalid module name"), "{}", text);
}

#[test]
fn console_session() {
    let (_dir, registry) = registry(&["alpha"]);
    let scheduler = ManualScheduler::new();
    let console = Console::new(Arc::new(registry), scheduler);
    let mut host = TestHost::with_inputs(["load alpha", "run alpha return 7", "bogus", "help", "exit"]);

    console.run(&mut host).unwrap();

    let normal = host.output_with_style(modhost_admin::io::OutputStyle::Normal);
    assert!(normal.contains(&"[MH] Loaded module alpha"));
    assert!(normal.contains(&"[MH] Code = 7"));
    assert!(normal.iter().any(|text| text.contains("Commands:")));
    assert_eq!(host.errors().len(), 1);
    assert!(host.errors()[0].contains("bogus"));
}
