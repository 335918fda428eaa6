//! # modhost-admin
//!
//! Administrative command surface and interactive console for modhost.
//!
//! Commands are thin text parsing over registry operations; every reply is
//! prefixed with `[MH] `.
//!
//! ## Usage
//!
//! ```bash
//! # Interactive console over the default data directory
//! modhost
//!
//! # One-shot commands
//! modhost --data-dir ./data list
//! modhost --data-dir ./data run greeter '(module (func (export "run") (result i32) (i32.const 7)))'
//! ```
//!
//! Inside the console:
//!
//! ```text
//! > reload
//! [MH] Reloaded all modules (2 running)
//! > runfile greeter hello.wat
//! [MH] Code = 42
//! ```

pub mod commands;
pub mod completer;
pub mod console;
pub mod host;
pub mod io;

pub use commands::{execute, AdminCommand, CommandResult, PREFIX};
pub use console::Console;
