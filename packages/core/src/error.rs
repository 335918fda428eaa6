//! Error types for module runtimes and the registry.

use std::path::PathBuf;

use thiserror::Error;

/// Source code could not be compiled into an executable unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct LoadError(pub String);

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A fault raised while executing code inside an interpreter context.
///
/// Faults are caught at the task boundary and never stop a runtime's worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ExecutionFault(pub String);

impl ExecutionFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A fault while constructing an interpreter context or running its
/// bootstrap script. Fatal for the runtime that raised it.
#[derive(Debug, Error)]
pub enum StartupFault {
    /// The interpreter engine could not create a context.
    #[error("failed to create interpreter context: {0}")]
    Context(String),

    /// The bootstrap script failed to load.
    #[error("bootstrap script failed to load: {0}")]
    Load(#[from] LoadError),

    /// The bootstrap script faulted while executing.
    #[error("bootstrap script faulted: {0}")]
    Execute(#[from] ExecutionFault),
}

/// Errors surfaced by registry and runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The module name is empty or is not a single path component.
    #[error("invalid module name: {0:?}")]
    InvalidModuleName(String),

    /// No live runtime exists for the module.
    #[error("module not running: {0}")]
    NotRunning(String),

    /// The module storage root could not be enumerated.
    #[error("cannot list modules in {}: {source}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Code could not be loaded.
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// The host configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for registry and runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
