//! Administrative command parsing and execution.
//!
//! Commands:
//! - `reload [module]` - Restart one module, or every discoverable module
//! - `load <module>` - Start a module if it is not already running
//! - `unload <module>` - Stop a module
//! - `run <module> <code...>` - Compile code in a module's context and run it
//! - `runfile <module> <file>` - Run a file from the scripts directory
//! - `list` - Show discoverable modules, green if running, red if stopped
//! - `help` - Show help
//! - `exit` - Exit the console
//!
//! Every reply starts with [`PREFIX`].

use std::path::{Component, Path, PathBuf};

use modhost_core::{
    InterpreterEngine, ModuleRegistry, ModuleRuntime, RuntimeError, StartOutcome, Value,
};
use nu_ansi_term::{Color, Style};

/// Marker at the start of every reply.
pub const PREFIX: &str = "[MH] ";

/// A parsed administrative command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Reload(Option<String>),
    Load(String),
    Unload(String),
    Run { module: String, code: String },
    RunFile { module: String, file: String },
    List,
    Help,
    Exit,
}

impl AdminCommand {
    /// Parse one input line. Blank input yields `Ok(None)`; malformed input
    /// yields the reply to show.
    pub fn parse(input: &str) -> Result<Option<Self>, String> {
        let input = input.trim();
        let (keyword, rest) = match input.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (input, ""),
        };
        let mut args = rest.split_whitespace();

        let command = match keyword.to_lowercase().as_str() {
            "" => return Ok(None),
            "reload" => AdminCommand::Reload(args.next().map(str::to_string)),
            "load" => AdminCommand::Load(required(args.next(), "load <module>")?),
            "unload" => AdminCommand::Unload(required(args.next(), "unload <module>")?),
            "run" => {
                let (module, code) = rest
                    .split_once(char::is_whitespace)
                    .map(|(module, code)| (module, code.trim()))
                    .filter(|(_, code)| !code.is_empty())
                    .ok_or_else(|| usage("run <module> <code...>"))?;
                AdminCommand::Run {
                    module: module.to_string(),
                    code: code.to_string(),
                }
            }
            "runfile" => {
                let module = required(args.next(), "runfile <module> <file>")?;
                let file = required(args.next(), "runfile <module> <file>")?;
                AdminCommand::RunFile { module, file }
            }
            "list" | "ls" => AdminCommand::List,
            "help" | "?" => AdminCommand::Help,
            "exit" | "quit" | "q" => AdminCommand::Exit,
            other => {
                return Err(format!(
                    "{}Unknown command: {}. Type 'help' for available commands.",
                    PREFIX, other
                ))
            }
        };
        Ok(Some(command))
    }
}

fn required(arg: Option<&str>, form: &str) -> Result<String, String> {
    arg.map(str::to_string).ok_or_else(|| usage(form))
}

fn usage(form: &str) -> String {
    format!("{}Usage: {}", PREFIX, form)
}

/// Result of executing a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Command succeeded, optionally with a reply.
    Ok(Option<String>),
    /// Command failed with a reply.
    Error(String),
    /// Operator requested to exit.
    Exit,
    /// Show help.
    Help,
}

impl CommandResult {
    fn reply(text: impl AsRef<str>) -> Self {
        CommandResult::Ok(Some(format!("{}{}", PREFIX, text.as_ref())))
    }

    fn fail(text: impl AsRef<str>) -> Self {
        CommandResult::Error(format!("{}{}", PREFIX, text.as_ref()))
    }
}

/// Parse and execute a command against the registry.
pub fn execute<E: InterpreterEngine>(input: &str, registry: &ModuleRegistry<E>) -> CommandResult {
    match AdminCommand::parse(input) {
        Ok(Some(command)) => execute_command(command, registry),
        Ok(None) => CommandResult::Ok(None),
        Err(reply) => CommandResult::Error(reply),
    }
}

pub fn execute_command<E: InterpreterEngine>(
    command: AdminCommand,
    registry: &ModuleRegistry<E>,
) -> CommandResult {
    match command {
        AdminCommand::Reload(Some(module)) => match registry.start(&module, true) {
            Ok(_) => CommandResult::reply(format!("Reloaded module {}", module)),
            Err(e) => CommandResult::fail(e.to_string()),
        },
        AdminCommand::Reload(None) => match registry.restart_all() {
            Ok(started) => CommandResult::reply(format!(
                "Reloaded all modules ({} running)",
                started.len()
            )),
            Err(e) => CommandResult::fail(e.to_string()),
        },
        AdminCommand::Load(module) => match registry.start(&module, false) {
            Ok(StartOutcome::AlreadyRunning) => {
                CommandResult::reply(format!("Module {} is already running", module))
            }
            Ok(_) => CommandResult::reply(format!("Loaded module {}", module)),
            Err(e) => CommandResult::fail(e.to_string()),
        },
        AdminCommand::Unload(module) => {
            if registry.stop(&module) {
                CommandResult::reply(format!("Unloaded module {}", module))
            } else {
                CommandResult::fail(format!("Module {} is not running", module))
            }
        }
        AdminCommand::Run { module, code } => with_running(registry, &module, |runtime| {
            run_loaded(runtime, runtime.load(&code), "code")
        }),
        AdminCommand::RunFile { module, file } => {
            let Some(path) = resolve_script(&registry.config().scripts_dir(), &file) else {
                return CommandResult::fail(format!(
                    "Script path {} escapes the scripts directory",
                    file
                ));
            };
            with_running(registry, &module, |runtime| {
                run_loaded(runtime, runtime.load_file(&path), "file")
            })
        }
        AdminCommand::List => list(registry),
        AdminCommand::Help => CommandResult::Help,
        AdminCommand::Exit => CommandResult::Exit,
    }
}

fn with_running<E: InterpreterEngine>(
    registry: &ModuleRegistry<E>,
    module: &str,
    f: impl FnOnce(&ModuleRuntime<E>) -> CommandResult,
) -> CommandResult {
    match registry.get(module) {
        Some(runtime) if runtime.wait_ready() => f(&runtime),
        _ => CommandResult::fail(format!("Module {} is not running", module)),
    }
}

fn run_loaded<E: InterpreterEngine>(
    runtime: &ModuleRuntime<E>,
    unit: modhost_core::Result<modhost_core::UnitOf<E>>,
    what: &str,
) -> CommandResult {
    let unit = match unit {
        Ok(unit) => unit,
        Err(RuntimeError::Load(e)) => {
            return CommandResult::fail(format!("Error in {}: {}", what, e))
        }
        Err(e) => return CommandResult::fail(e.to_string()),
    };

    let task = runtime.execute_unit(unit);
    match runtime.submit(&task, true) {
        Some(value) => CommandResult::reply(format!("Code = {}", format_value(&value))),
        None => CommandResult::fail(format!(
            "Code in module {} produced no result (faulted or discarded)",
            runtime.name()
        )),
    }
}

/// Resolve `file` under the scripts directory. Absolute paths and paths
/// with parent components are rejected.
pub fn resolve_script(scripts_dir: &Path, file: &str) -> Option<PathBuf> {
    let relative = Path::new(file);
    let mut normal = 0;
    for component in relative.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (normal > 0).then(|| scripts_dir.join(relative))
}

fn list<E: InterpreterEngine>(registry: &ModuleRegistry<E>) -> CommandResult {
    let statuses = match registry.statuses() {
        Ok(statuses) => statuses,
        Err(e) => return CommandResult::fail(e.to_string()),
    };
    if statuses.is_empty() {
        return CommandResult::reply("Modules: (none)");
    }

    let names: Vec<String> = statuses
        .iter()
        .map(|status| {
            let color = if status.running { Color::Green } else { Color::Red };
            color.paint(&status.name).to_string()
        })
        .collect();
    CommandResult::reply(format!("Modules: {}", names.join(", ")))
}

/// Render a value the way `run` replies show it.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Text(text) => format!("{:?}", text),
        other => other.to_string(),
    }
}

/// Format help text.
pub fn format_help() -> String {
    let cmd = Style::new().fg(Color::Green).bold();
    let arg = Style::new().fg(Color::Yellow);
    let heading = Style::new().fg(Color::Cyan).bold();

    let lines = [
        ("reload", "[module]", "Restart a module, or every module"),
        ("load", "<module>", "Start a module"),
        ("unload", "<module>", "Stop a module"),
        ("run", "<module> <code...>", "Run code in a module"),
        ("runfile", "<module> <file>", "Run a script from the scripts directory"),
        ("list", "", "Show modules (green: running, red: stopped)"),
        ("help", "", "Show this help"),
        ("exit", "", "Exit the console"),
    ];

    let mut out = format!("{}\n", heading.paint("Commands:"));
    for (name, args, description) in lines {
        let usage = format!("{} {}", cmd.paint(name), arg.paint(args));
        let width = name.len() + 1 + args.len();
        out.push_str(&format!(
            "  {}{}  {}\n",
            usage,
            " ".repeat(26usize.saturating_sub(width)),
            description
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_commands() {
        assert_eq!(AdminCommand::parse("   "), Ok(None));
        assert_eq!(AdminCommand::parse("reload"), Ok(Some(AdminCommand::Reload(None))));
        assert_eq!(
            AdminCommand::parse("reload alpha"),
            Ok(Some(AdminCommand::Reload(Some("alpha".into()))))
        );
        assert_eq!(
            AdminCommand::parse("LOAD alpha"),
            Ok(Some(AdminCommand::Load("alpha".into())))
        );
        assert_eq!(AdminCommand::parse("quit"), Ok(Some(AdminCommand::Exit)));
        assert_eq!(AdminCommand::parse("ls"), Ok(Some(AdminCommand::List)));
    }

    #[test]
    fn run_keeps_code_spacing() {
        assert_eq!(
            AdminCommand::parse("run alpha set x 1;  get x"),
            Ok(Some(AdminCommand::Run {
                module: "alpha".into(),
                code: "set x 1;  get x".into(),
            }))
        );
    }

    #[test]
    fn missing_arguments_produce_usage() {
        assert_eq!(AdminCommand::parse("load"), Err("[MH] Usage: load <module>".into()));
        assert_eq!(
            AdminCommand::parse("run alpha"),
            Err("[MH] Usage: run <module> <code...>".into())
        );
        assert!(AdminCommand::parse("runfile alpha").is_err());
    }

    #[test]
    fn unknown_command_is_rejected() {
        let err = AdminCommand::parse("frobnicate").unwrap_err();
        assert!(err.starts_with(PREFIX));
        assert!(err.contains("frobnicate"));
    }

    #[test]
    fn script_paths_stay_inside_scripts_dir() {
        let scripts = Path::new("/data/scripts");
        assert_eq!(
            resolve_script(scripts, "tools/hello.wat"),
            Some(PathBuf::from("/data/scripts/tools/hello.wat"))
        );
        assert_eq!(resolve_script(scripts, "../secrets"), None);
        assert_eq!(resolve_script(scripts, "tools/../../secrets"), None);
        assert_eq!(resolve_script(scripts, "/etc/passwd"), None);
        assert_eq!(resolve_script(scripts, "."), None);
    }

    #[test]
    fn values_render_for_replies() {
        assert_eq!(format_value(&Value::Integer(3)), "3");
        assert_eq!(format_value(&Value::from("hi")), "\"hi\"");
        assert_eq!(format_value(&Value::Nil), "nil");
    }

    #[test]
    fn help_mentions_every_command() {
        let help = format_help();
        for name in ["reload", "load", "unload", "run", "runfile", "list", "help", "exit"] {
            assert!(help.contains(name), "missing {}", name);
        }
    }
}
