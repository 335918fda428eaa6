//! I/O abstraction for the console.
//!
//! The console core interacts only through the `IoHost` trait, so the same
//! loop drives an interactive terminal or an in-memory host in tests.

pub mod test_host;
pub mod types;

pub use test_host::TestHost;
pub use types::*;

/// Error type for I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(String),
}

/// Host interface for console I/O operations.
pub trait IoHost {
    /// Wait for input to become available.
    ///
    /// After this returns, `read_input()` yields the line or `read_signal()`
    /// yields the signal that arrived.
    fn wait_for_input(&mut self) -> Result<(), IoError>;

    /// Read the next input line, if available.
    fn read_input(&mut self) -> Result<Option<InputLine>, IoError>;

    /// Read any pending signal (Ctrl+C, Ctrl+D).
    fn read_signal(&mut self) -> Result<Option<Signal>, IoError>;

    /// Write output to the user.
    fn write_output(&mut self, output: Output) -> Result<(), IoError>;

    /// Update the prompt rendered before the next input.
    fn write_prompt(&mut self, config: PromptConfig) -> Result<(), IoError>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), IoError> {
        Ok(())
    }
}
