//! Error types and reporting

use crate::lexer::Position;
use std::fmt;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Kinds of script errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Raised by `panic` and binding failures
    Plain,
    /// Undefined or redeclared identifier
    Name,
    /// Stack exhaustion or a dropped module
    Memory,
    /// Malformed source
    Syntax,
    /// Type or shape mismatch
    Value,
    /// Index or bounds violation
    OutOfRange,
    /// Invalid operand combination
    Arithmetic,
    /// Zero divisor in `/`, `%` or `//`
    DivideByZero,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Plain => "Error",
            ErrorKind::Name => "NameError",
            ErrorKind::Memory => "MemoryError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Value => "ValueError",
            ErrorKind::OutOfRange => "OutOfRangeError",
            ErrorKind::Arithmetic => "ArithmeticError",
            ErrorKind::DivideByZero => "DivideByZeroError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error raised by the engine.
///
/// The position is filled in lazily: low-level helpers (arithmetic,
/// method tables) raise without one and the statement evaluator attaches
/// the position of the statement being run via [`ScriptError::at`].
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Option<Position>,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ScriptError {
            kind,
            message: message.into(),
            pos: None,
        }
    }

    pub fn plain(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Plain, message)
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Name, message)
    }

    pub fn memory(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Memory, message)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, message)
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfRange, message)
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Arithmetic, message)
    }

    pub fn divide_by_zero() -> Self {
        Self::new(ErrorKind::DivideByZero, "divide by zero")
    }

    /// Undefined identifier, with an optional "did you mean" hint
    pub fn undefined(name: &str, suggestion: Option<&str>) -> Self {
        Self::name(format!(
            "name is not defined: {name}{}",
            crate::util::format_suggestion_hint(suggestion)
        ))
    }

    pub fn index_out_of_range(index: i64, len: usize) -> Self {
        Self::out_of_range(format!("index {index} out of range for length {len}"))
    }

    pub fn stack_overflow(depth: usize) -> Self {
        Self::memory(format!("stack overflow: call depth exceeded {depth}"))
    }

    /// Attach a position unless one is already recorded
    pub fn at(mut self, pos: &Position) -> Self {
        if self.pos.is_none() {
            self.pos = Some(pos.clone());
        }
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Byte offset of a 1-based line/column pair within `source`
fn offset_of(source: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    for (index, text) in source.split_inclusive('\n').enumerate() {
        if index + 1 == line {
            return offset + column.saturating_sub(1).min(text.len());
        }
        offset += text.len();
    }
    source.len()
}

/// Report error with ariadne
pub fn report_error(filename: &str, source: &str, error: &ScriptError) {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let located = error
        .pos
        .as_ref()
        .filter(|pos| pos.file.as_ref() == filename);

    let result = if let Some(pos) = located {
        let start = offset_of(source, pos.line, pos.column);
        let end = (start + 1).min(source.len()).max(start);
        Report::build(ReportKind::Error, (filename, start..end))
            .with_message(error.kind.as_str())
            .with_label(
                Label::new((filename, start..end))
                    .with_message(error.message())
                    .with_color(Color::Red),
            )
            .finish()
            .print((filename, Source::from(source)))
    } else {
        // Positionless errors, or errors raised inside another module
        let origin = error
            .pos
            .as_ref()
            .map(|pos| format!(" ({pos})"))
            .unwrap_or_default();
        Report::build(ReportKind::Error, (filename, 0..0))
            .with_message(format!("{}: {}{origin}", error.kind, error.message()))
            .finish()
            .print((filename, Source::from(source)))
    };

    if let Err(err) = result {
        eprintln!("{error} ({err})");
    }
}
