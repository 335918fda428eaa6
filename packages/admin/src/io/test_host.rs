//! In-memory console host.
//!
//! Scripted input lines and signals are consumed in order; everything the
//! console writes is buffered for inspection. Embedders can also use it to
//! drive the console without a terminal.

use std::collections::VecDeque;

use super::{InputLine, IoError, IoHost, Output, OutputStyle, PromptConfig, Signal};

/// Console host backed by in-memory buffers.
#[derive(Debug, Default)]
pub struct TestHost {
    inputs: VecDeque<String>,
    signals: VecDeque<Signal>,
    outputs: Vec<Output>,
    prompts: Vec<PromptConfig>,
}

impl TestHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host preloaded with input lines.
    pub fn with_inputs(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut host = Self::new();
        for line in lines {
            host.queue_input(line);
        }
        host
    }

    pub fn queue_input(&mut self, line: impl Into<String>) {
        self.inputs.push_back(line.into());
    }

    pub fn queue_signal(&mut self, signal: Signal) {
        self.signals.push_back(signal);
    }

    pub fn output(&self) -> &[Output] {
        &self.outputs
    }

    /// Text of every output with the given style, in order.
    pub fn output_with_style(&self, style: OutputStyle) -> Vec<&str> {
        self.outputs
            .iter()
            .filter(|o| o.style == style)
            .map(|o| o.text.as_str())
            .collect()
    }

    pub fn errors(&self) -> Vec<&str> {
        self.output_with_style(OutputStyle::Error)
    }

    /// Every prompt written so far.
    pub fn prompts(&self) -> &[PromptConfig] {
        &self.prompts
    }
}

impl IoHost for TestHost {
    fn wait_for_input(&mut self) -> Result<(), IoError> {
        if self.inputs.is_empty() && self.signals.is_empty() {
            // Nothing scripted is left; behave like a closed terminal.
            self.signals.push_back(Signal::Eof);
        }
        Ok(())
    }

    fn read_input(&mut self) -> Result<Option<InputLine>, IoError> {
        Ok(self.inputs.pop_front().map(|line| InputLine { line }))
    }

    fn read_signal(&mut self) -> Result<Option<Signal>, IoError> {
        Ok(self.signals.pop_front())
    }

    fn write_output(&mut self, output: Output) -> Result<(), IoError> {
        self.outputs.push(output);
        Ok(())
    }

    fn write_prompt(&mut self, config: PromptConfig) -> Result<(), IoError> {
        self.prompts.push(config);
        Ok(())
    }
}
