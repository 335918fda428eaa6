//! I/O types exchanged between the console core and its host.

use serde::{Deserialize, Serialize};

/// A line of input from the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputLine {
    pub line: String,
}

/// A signal from the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "lowercase")]
pub enum Signal {
    /// Ctrl+C.
    Interrupt,
    /// Ctrl+D.
    Eof,
}

/// Output to be written by the console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub text: String,
    #[serde(default)]
    pub style: OutputStyle,
}

impl Output {
    pub fn normal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: OutputStyle::Normal,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: OutputStyle::Error,
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: OutputStyle::Info,
        }
    }

    pub fn banner(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: OutputStyle::Banner,
        }
    }
}

/// Style hint for output rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    /// Already contains ANSI codes if applicable.
    #[default]
    Normal,
    Error,
    Info,
    Banner,
}

/// Prompt state sent from the core to the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptConfig {
    /// Number of live module runtimes.
    pub running: usize,
}

/// Reason the console exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Operator typed `exit` or `quit`.
    UserExit,
    /// Ctrl+D.
    Eof,
}
