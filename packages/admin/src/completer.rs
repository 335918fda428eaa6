use reedline::{Completer, Span, Suggestion};

/// Source of module names for argument completion.
pub type ModuleNames = Box<dyn Fn() -> Vec<String> + Send>;

const COMMANDS: &[(&str, &str)] = &[
    ("reload", "Restart a module, or every module"),
    ("load", "Start a module"),
    ("unload", "Stop a module"),
    ("run", "Run code in a module"),
    ("runfile", "Run a script from the scripts directory"),
    ("list", "Show modules"),
    ("help", "Show help"),
    ("exit", "Exit the console"),
];

/// Completes command names, and module names as the first argument of
/// commands that take one.
pub struct AdminCompleter {
    modules: ModuleNames,
}

impl AdminCompleter {
    pub fn new(modules: ModuleNames) -> Self {
        Self { modules }
    }

    /// Completer that only knows command names.
    pub fn commands_only() -> Self {
        Self::new(Box::new(Vec::<String>::new))
    }
}

impl Completer for AdminCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        let line_to_pos = &line[..pos];
        let words: Vec<&str> = line_to_pos.split_whitespace().collect();
        let trailing_space = line_to_pos.ends_with(char::is_whitespace);
        let prefix = if trailing_space {
            ""
        } else {
            words.last().copied().unwrap_or("")
        };
        let span = Span::new(pos - prefix.len(), pos);

        let candidates: Vec<(String, Option<String>)> = match (words.len(), trailing_space) {
            (0, _) | (1, false) => COMMANDS
                .iter()
                .map(|(name, description)| (name.to_string(), Some(description.to_string())))
                .collect(),
            (1, true) | (2, false) if takes_module(words[0]) => {
                (self.modules)().into_iter().map(|name| (name, None)).collect()
            }
            _ => Vec::new(),
        };

        candidates
            .into_iter()
            .filter(|(value, _)| value.starts_with(prefix))
            .map(|(value, description)| Suggestion {
                value,
                description,
                style: None,
                extra: None,
                span,
                append_whitespace: true,
                match_indices: None,
            })
            .collect()
    }
}

fn takes_module(command: &str) -> bool {
    matches!(
        command.to_lowercase().as_str(),
        "reload" | "load" | "unload" | "run" | "runfile"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completer() -> AdminCompleter {
        AdminCompleter::new(Box::new(|| vec!["alpha".to_string(), "beta".to_string()]))
    }

    fn values(suggestions: Vec<Suggestion>) -> Vec<String> {
        suggestions.into_iter().map(|s| s.value).collect()
    }

    #[test]
    fn completes_command_names() {
        let mut c = completer();
        assert_eq!(values(c.complete("re", 2)), vec!["reload"]);
        assert_eq!(values(c.complete("ru", 2)), vec!["run", "runfile"]);
        assert_eq!(c.complete("", 0).len(), COMMANDS.len());
    }

    #[test]
    fn completes_module_argument() {
        let mut c = completer();
        assert_eq!(values(c.complete("load ", 5)), vec!["alpha", "beta"]);
        let suggestions = c.complete("unload b", 8);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].value, "beta");
        assert_eq!(suggestions[0].span, Span::new(7, 8));
    }

    #[test]
    fn no_module_completion_for_list() {
        let mut c = completer();
        assert!(c.complete("list ", 5).is_empty());
        assert!(c.complete("run alpha ", 10).is_empty());
    }

    #[test]
    fn commands_only_has_no_modules() {
        let mut c = AdminCompleter::commands_only();
        assert!(c.complete("load ", 5).is_empty());
    }
}
