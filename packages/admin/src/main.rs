use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use modhost_admin::host::TerminalHost;
use modhost_admin::{CommandResult, Console};
use modhost_core::{HostCapabilities, HostConfig, ManualScheduler, ModuleRegistry};
use modhost_wasm::WasmEngine;
use tracing_subscriber::EnvFilter;

/// modhost - run WebAssembly modules side by side and manage them live
#[derive(Parser, Debug)]
#[command(name = "modhost")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory holding base/, modules/ and scripts/
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// JSON host configuration file (overrides --data-dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not start discoverable modules on launch
    #[arg(long)]
    no_autostart: bool,

    /// Run a single command and exit instead of opening the console
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = resolve_config(&args)?;
    config.ensure_dirs()?;
    tracing::info!(data_dir = %config.data_dir.display(), "using data directory");

    let scheduler = ManualScheduler::new();
    let host = HostCapabilities::new().with_main_thread(Arc::new(scheduler.clone()));
    let registry = Arc::new(ModuleRegistry::new(config, WasmEngine::new()?, host));

    if !args.no_autostart {
        let started = registry.restart_all()?;
        tracing::info!(count = started.len(), "started modules");
    }

    let console = Console::new(registry.clone(), scheduler);

    if !args.command.is_empty() {
        let code = match console.execute(&args.command.join(" ")) {
            CommandResult::Ok(reply) => {
                if let Some(reply) = reply {
                    println!("{}", reply);
                }
                ExitCode::SUCCESS
            }
            CommandResult::Error(reply) => {
                eprintln!("{}", reply);
                ExitCode::FAILURE
            }
            CommandResult::Help => {
                println!("{}", modhost_admin::commands::format_help());
                ExitCode::SUCCESS
            }
            CommandResult::Exit => ExitCode::SUCCESS,
        };
        registry.stop_all();
        return Ok(code);
    }

    let names = {
        let registry = registry.clone();
        Box::new(move || registry.list().unwrap_or_default())
    };
    let mut io = TerminalHost::new(names)?;
    let reason = console.run(&mut io)?;
    tracing::debug!(?reason, "console exited");
    registry.stop_all();
    Ok(ExitCode::SUCCESS)
}

/// `--config` first, then `--data-dir` / `MODHOST_DATA_DIR`, then the
/// platform data directory, then `./modhost-data`.
fn resolve_config(args: &Args) -> modhost_core::Result<HostConfig> {
    if let Some(path) = &args.config {
        return HostConfig::from_file(path);
    }
    let data_dir = args
        .data_dir
        .clone()
        .or_else(|| std::env::var_os("MODHOST_DATA_DIR").map(PathBuf::from))
        .or_else(|| dirs::data_local_dir().map(|dir| dir.join("modhost")))
        .unwrap_or_else(|| PathBuf::from("modhost-data"));
    Ok(HostConfig::new(data_dir))
}
