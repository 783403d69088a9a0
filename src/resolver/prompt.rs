//! Escalation when a library cannot be found automatically.

use std::io::{self, BufRead, Write};

/// Supplies a directory that contains a library the resolver could not find.
///
/// Returning `None` declines, which makes the reference unresolvable.
pub trait DirectoryPrompt {
    /// Asks for the directory holding `filename`.
    fn directory_for(&mut self, filename: &str) -> Option<String>;
}

impl<F> DirectoryPrompt for F
where
    F: FnMut(&str) -> Option<String>,
{
    fn directory_for(&mut self, filename: &str) -> Option<String> {
        self(filename)
    }
}

/// Asks on the terminal; `quit` or end of input declines.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl DirectoryPrompt for TerminalPrompt {
    fn directory_for(&mut self, filename: &str) -> Option<String> {
        print!(
            "Please specify the directory where {filename} is located (or enter 'quit' to abort): "
        );
        io::stdout().flush().ok();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let answer = line.trim();
                (answer != "quit").then(|| answer.to_string())
            }
        }
    }
}

/// Never supplies a directory.
#[derive(Debug, Default)]
pub struct DeclinePrompt;

impl DirectoryPrompt for DeclinePrompt {
    fn directory_for(&mut self, _filename: &str) -> Option<String> {
        None
    }
}
