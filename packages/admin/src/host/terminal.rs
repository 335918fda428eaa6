//! Terminal host using Reedline.
//!
//! Line editing (Vi or Emacs), tab completion of commands and module names,
//! hints and persistent history.

use std::borrow::Cow;
use std::io::{self, Write};
use std::path::PathBuf;

use nu_ansi_term::{Color, Style};
use reedline::{
    default_emacs_keybindings, default_vi_insert_keybindings, default_vi_normal_keybindings,
    ColumnarMenu, DefaultHinter, EditMode, Emacs, FileBackedHistory, KeyCode, KeyModifiers,
    MenuBuilder, Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus,
    PromptViMode, Reedline, ReedlineEvent, ReedlineMenu, Signal as ReedlineSignal, Vi,
};

use crate::completer::{AdminCompleter, ModuleNames};
use crate::io::{InputLine, IoError, IoHost, Output, OutputStyle, PromptConfig, Signal};

const HISTORY_SIZE: usize = 1000;

/// Terminal host using Reedline for interactive I/O.
pub struct TerminalHost {
    line_editor: Reedline,
    pending_input: Option<InputLine>,
    pending_signal: Option<Signal>,
    prompt: PromptConfig,
}

impl TerminalHost {
    /// Create a terminal host. `modules` feeds module-name completion.
    pub fn new(modules: ModuleNames) -> io::Result<Self> {
        let completer = Box::new(AdminCompleter::new(modules));
        let hinter = Box::new(
            DefaultHinter::default().with_style(Style::new().fg(Color::LightGray).dimmed()),
        );
        let completion_menu = Box::new(
            ColumnarMenu::default()
                .with_name("completion_menu")
                .with_text_style(Style::new().fg(Color::Cyan))
                .with_selected_text_style(Style::new().fg(Color::Black).on(Color::Cyan).bold()),
        );

        let mut line_editor = Reedline::create()
            .with_completer(completer)
            .with_hinter(hinter)
            .with_menu(ReedlineMenu::EngineCompleter(completion_menu))
            .with_edit_mode(edit_mode());

        match history_path() {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        tracing::warn!(path = %parent.display(), error = %e, "cannot create history directory");
                    }
                }
                match FileBackedHistory::with_file(HISTORY_SIZE, path) {
                    Ok(history) => line_editor = line_editor.with_history(Box::new(history)),
                    Err(e) => tracing::warn!(error = %e, "history disabled"),
                }
            }
            None => tracing::debug!("no data directory; history disabled"),
        }

        Ok(Self {
            line_editor,
            pending_input: None,
            pending_signal: None,
            prompt: PromptConfig::default(),
        })
    }
}

impl IoHost for TerminalHost {
    fn wait_for_input(&mut self) -> Result<(), IoError> {
        let prompt = TerminalPrompt {
            running: self.prompt.running,
        };

        match self.line_editor.read_line(&prompt) {
            Ok(ReedlineSignal::Success(line)) => self.pending_input = Some(InputLine { line }),
            Ok(ReedlineSignal::CtrlC) => self.pending_signal = Some(Signal::Interrupt),
            Ok(ReedlineSignal::CtrlD) => self.pending_signal = Some(Signal::Eof),
            Err(e) => return Err(IoError::Io(format!("Reedline error: {}", e))),
        }
        Ok(())
    }

    fn read_input(&mut self) -> Result<Option<InputLine>, IoError> {
        Ok(self.pending_input.take())
    }

    fn read_signal(&mut self) -> Result<Option<Signal>, IoError> {
        Ok(self.pending_signal.take())
    }

    fn write_output(&mut self, output: Output) -> Result<(), IoError> {
        println!("{}", render(&output));
        Ok(())
    }

    fn write_prompt(&mut self, config: PromptConfig) -> Result<(), IoError> {
        self.prompt = config;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), IoError> {
        io::stdout().flush().map_err(|e| IoError::Io(e.to_string()))
    }
}

/// Apply terminal styling to console output.
pub fn render(output: &Output) -> String {
    match output.style {
        OutputStyle::Normal => output.text.clone(),
        OutputStyle::Error => Color::Red.paint(&output.text).to_string(),
        OutputStyle::Info | OutputStyle::Banner => Color::Cyan.paint(&output.text).to_string(),
    }
}

struct TerminalPrompt {
    running: usize,
}

impl Prompt for TerminalPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        let running = if self.running == 0 {
            Color::Yellow.paint("no modules running").to_string()
        } else {
            Color::Blue
                .bold()
                .paint(format!("{} running", self.running))
                .to_string()
        };
        Cow::Owned(format!("modhost {}", running))
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, edit_mode: PromptEditMode) -> Cow<'_, str> {
        match edit_mode {
            PromptEditMode::Default | PromptEditMode::Emacs => {
                Cow::Owned(format!(" {} ", Color::Green.bold().paint(">")))
            }
            PromptEditMode::Vi(PromptViMode::Normal) => {
                Cow::Owned(format!(" {} ", Color::Blue.bold().paint("[N]>")))
            }
            PromptEditMode::Vi(PromptViMode::Insert) => {
                Cow::Owned(format!(" {} ", Color::Green.bold().paint("[I]>")))
            }
            PromptEditMode::Custom(s) => Cow::Owned(format!(" ({})> ", s)),
        }
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed(": ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!("({}reverse-search: {}) ", prefix, history_search.term))
    }
}

fn edit_mode() -> Box<dyn EditMode> {
    let complete = ReedlineEvent::UntilFound(vec![
        ReedlineEvent::Menu("completion_menu".to_string()),
        ReedlineEvent::MenuNext,
    ]);

    if use_vi_mode() {
        let mut insert = default_vi_insert_keybindings();
        insert.add_binding(KeyModifiers::NONE, KeyCode::Tab, complete);
        Box::new(Vi::new(insert, default_vi_normal_keybindings()))
    } else {
        let mut keybindings = default_emacs_keybindings();
        keybindings.add_binding(KeyModifiers::NONE, KeyCode::Tab, complete);
        Box::new(Emacs::new(keybindings))
    }
}

/// History lives next to the default data directory.
pub fn history_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("modhost").join("history.txt"))
}

/// `MODHOST_EDIT_MODE` wins; otherwise follow `VISUAL`/`EDITOR`.
fn use_vi_mode() -> bool {
    if let Ok(mode) = std::env::var("MODHOST_EDIT_MODE") {
        return is_vi(&mode);
    }
    ["VISUAL", "EDITOR"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .any(|editor| is_vi(&editor))
}

fn is_vi(name: &str) -> bool {
    let name = name.to_lowercase();
    let base = name.rsplit('/').next().unwrap_or(&name);
    matches!(base, "vi" | "vim" | "nvim")
}
