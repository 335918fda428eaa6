//! Host implementations for the console.

pub mod terminal;

pub use terminal::TerminalHost;
