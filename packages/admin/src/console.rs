//! Platform-independent console core.
//!
//! The console reads commands through an [`IoHost`], executes them against
//! the registry and pumps the host's main-thread scheduler after every
//! command. It is the host's main update loop, so work that runtimes hand
//! to the main thread runs here.

use std::sync::Arc;

use modhost_core::{InterpreterEngine, ManualScheduler, ModuleRegistry};

use crate::commands::{self, CommandResult};
use crate::io::{ExitReason, IoError, IoHost, Output, PromptConfig, Signal};

pub struct Console<E: InterpreterEngine> {
    registry: Arc<ModuleRegistry<E>>,
    scheduler: ManualScheduler,
}

impl<E: InterpreterEngine> Console<E> {
    /// `scheduler` must be the one advertised to the registry's runtimes.
    pub fn new(registry: Arc<ModuleRegistry<E>>, scheduler: ManualScheduler) -> Self {
        Self {
            registry,
            scheduler,
        }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry<E>> {
        &self.registry
    }

    /// Execute one command line, then run queued main-thread work.
    pub fn execute(&self, line: &str) -> CommandResult {
        let result = commands::execute(line, &self.registry);
        self.pump();
        result
    }

    /// Run queued main-thread work. Returns how many jobs ran.
    pub fn pump(&self) -> usize {
        let ran = self.scheduler.run_pending();
        if ran > 0 {
            tracing::debug!(jobs = ran, "ran main-thread jobs");
        }
        ran
    }

    /// Run the console loop until the operator exits.
    pub fn run(&self, io: &mut impl IoHost) -> Result<ExitReason, IoError> {
        io.write_output(Output::banner(BANNER))?;

        loop {
            io.write_prompt(PromptConfig {
                running: self.registry.running().len(),
            })?;
            io.wait_for_input()?;

            if let Some(signal) = io.read_signal()? {
                match signal {
                    Signal::Eof => {
                        io.write_output(Output::info("Goodbye!"))?;
                        io.flush()?;
                        return Ok(ExitReason::Eof);
                    }
                    Signal::Interrupt => {
                        io.write_output(Output::info("^C (use 'exit' to quit)"))?;
                        continue;
                    }
                }
            }

            let Some(input) = io.read_input()? else {
                self.pump();
                continue;
            };

            match self.execute(&input.line) {
                CommandResult::Ok(None) => {}
                CommandResult::Ok(Some(reply)) => io.write_output(Output::normal(reply))?,
                CommandResult::Error(reply) => io.write_output(Output::error(reply))?,
                CommandResult::Help => io.write_output(Output::normal(commands::format_help()))?,
                CommandResult::Exit => {
                    io.write_output(Output::info("Goodbye!"))?;
                    io.flush()?;
                    return Ok(ExitReason::UserExit);
                }
            }

            io.flush()?;
        }
    }
}

const BANNER: &str = r#"
                     _ _               _
 _ __ ___   ___   __| | |__   ___  ___| |_
| '_ ` _ \ / _ \ / _` | '_ \ / _ \/ __| __|
| | | | | | (_) | (_| | | | | (_) \__ \ |_
|_| |_| |_|\___/ \__,_|_| |_|\___/|___/\__|

Type 'help' for available commands, 'exit' to quit.
"#;
