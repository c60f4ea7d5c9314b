//! REPL (Read-Eval-Print Loop) for Ember
//!
//! The editor is the lexer's line source: the lexer asks for another line
//! whenever a statement is still open, and the prompt switches to `... `.

use crate::error::report_error;
use crate::interp::{Interpreter, Value};
use crate::lexer::Lexer;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::cell::RefCell;
use std::path::PathBuf;

const PROMPT: &str = "> ";
const CONTINUATION_PROMPT: &str = "... ";
const HISTORY_FILE: &str = ".ember_history";
const REPL_FILE: &str = "<repl>";

/// REPL commands (lines starting with `:`)
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Quit,
    Help,
    Clear,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with(':') {
            return None;
        }
        Some(match line {
            ":quit" | ":q" | ":exit" => Command::Quit,
            ":help" | ":h" | ":?" => Command::Help,
            ":clear" => Command::Clear,
            other => Command::Unknown(other.to_string()),
        })
    }
}

/// Text echoed for an expression statement; None is not echoed
fn echo(value: &Value) -> Option<String> {
    (!value.is_none()).then(|| value.repr())
}

/// REPL state
pub struct Repl {
    editor: DefaultEditor,
    interpreter: Interpreter,
    history_path: Option<PathBuf>,
}

impl Repl {
    pub fn new() -> RlResult<Self> {
        Self::with_interpreter(Interpreter::new())
    }

    pub fn with_interpreter(interpreter: Interpreter) -> RlResult<Self> {
        let mut editor = DefaultEditor::new()?;
        let history_path = dirs_home().map(|h| h.join(HISTORY_FILE));
        if let Some(ref path) = history_path {
            let _ = editor.load_history(path);
        }
        Ok(Repl {
            editor,
            interpreter,
            history_path,
        })
    }

    /// Run until `:quit` or end of input
    pub fn run(&mut self) -> RlResult<()> {
        println!("Ember REPL v{}", env!("CARGO_PKG_VERSION"));
        println!("Type :help for help, :quit to exit.\n");

        let Repl {
            editor,
            interpreter,
            history_path,
        } = self;
        // Everything typed so far; error positions index into it
        let transcript = RefCell::new(String::new());
        let mut failure = None;

        let source = |continuation: bool| read_line(editor, continuation, &transcript, &mut failure);
        let mut lexer = Lexer::new(REPL_FILE, source);
        loop {
            match lexer.next_statement() {
                Ok(Some(tokens)) => match interpreter.evaluate_statement(&tokens) {
                    Ok(_) => {
                        if let Some(value) = interpreter.take_last_value()
                            && let Some(text) = echo(&value)
                        {
                            println!("{text}");
                        }
                    }
                    Err(err) => report_error(REPL_FILE, &transcript.borrow(), &err),
                },
                Ok(None) => break,
                Err(err) => report_error(REPL_FILE, &transcript.borrow(), &err),
            }
        }
        drop(lexer);

        if let Err(err) = interpreter.finish() {
            report_error(REPL_FILE, &transcript.borrow(), &err);
        }
        if let Some(path) = history_path {
            let _ = editor.save_history(path);
        }
        failure.map_or(Ok(()), Err)
    }
}

/// Next line for the lexer; commands are handled here and never reach it
fn read_line(
    editor: &mut DefaultEditor,
    continuation: bool,
    transcript: &RefCell<String>,
    failure: &mut Option<ReadlineError>,
) -> Option<String> {
    loop {
        let prompt = if continuation { CONTINUATION_PROMPT } else { PROMPT };
        match editor.readline(prompt) {
            Ok(line) => {
                if !continuation && let Some(command) = Command::parse(&line) {
                    let _ = editor.add_history_entry(line.trim());
                    match command {
                        Command::Quit => {
                            println!("Goodbye!");
                            return None;
                        }
                        Command::Help => print_help(),
                        Command::Clear => print!("\x1B[2J\x1B[1;1H"),
                        Command::Unknown(cmd) => {
                            println!("Unknown command: {cmd}");
                            println!("Type :help for help.");
                        }
                    }
                    continue;
                }
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                let mut text = transcript.borrow_mut();
                text.push_str(&line);
                text.push('\n');
                return Some(line);
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                transcript.borrow_mut().push('\n');
                return Some(String::new());
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                return None;
            }
            Err(err) => {
                *failure = Some(err);
                return None;
            }
        }
    }
}

fn print_help() {
    println!("Ember REPL Commands:");
    println!("  :help, :h, :?   Show this help");
    println!("  :quit, :q       Exit the REPL");
    println!("  :clear          Clear the screen");
    println!();
    println!("Statements run as soon as they are complete. Open brackets");
    println!("continue on the next line:");
    println!("  x := [1, 2, 3]");
    println!("  func double(n) {{");
    println!("  ...   ret n * 2");
    println!("  ... }}");
    println!("  double(x)");
    println!();
    println!("Built-in functions:");
    println!("  print, println, input, len, range, string, int, float,");
    println!("  type, panic, immut, append");
}

/// Get home directory
fn dirs_home() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(Command::parse(":quit"), Some(Command::Quit));
        assert_eq!(Command::parse("  :q "), Some(Command::Quit));
        assert_eq!(Command::parse(":h"), Some(Command::Help));
        assert_eq!(Command::parse(":clear"), Some(Command::Clear));
        assert_eq!(Command::parse(":nope"), Some(Command::Unknown(":nope".to_string())));
        assert_eq!(Command::parse("x := 1"), None);
    }

    #[test]
    fn test_echo_skips_none() {
        assert_eq!(echo(&Value::None), None);
        assert_eq!(echo(&Value::int(3)), Some("3".to_string()));
        assert_eq!(echo(&Value::str("hi")), Some(Value::str("hi").repr()));
    }
}
