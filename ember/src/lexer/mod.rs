//! Lexer implementation using logos
//!
//! Lines are tokenized one at a time with the logos-generated [`TokenKind`]
//! lexer. The [`Lexer`] wraps that in a small state machine that tracks
//! bracket nesting and open `/* */` comments, so it knows when a logical
//! statement is complete and when it has to pull another line from its
//! [`LineSource`].

mod token;

pub use token::{Position, Token, TokenKind};

use crate::error::{Result, ScriptError};
use bigdecimal::num_bigint::BigInt;
use logos::Logos;
use std::collections::VecDeque;
use std::rc::Rc;

/// Supplier of raw source lines.
///
/// `continuation` is true when the lexer is in the middle of a statement
/// (open brackets or comment), which lets interactive sources switch to a
/// continuation prompt.
pub trait LineSource {
    fn next_line(&mut self, continuation: bool) -> Option<String>;
}

impl<F> LineSource for F
where
    F: FnMut(bool) -> Option<String>,
{
    fn next_line(&mut self, continuation: bool) -> Option<String> {
        self(continuation)
    }
}

/// Line source over an in-memory buffer
#[derive(Debug, Default)]
pub struct TextSource {
    lines: VecDeque<String>,
}

impl TextSource {
    pub fn new(text: &str) -> Self {
        TextSource {
            lines: text.lines().map(str::to_string).collect(),
        }
    }
}

impl LineSource for TextSource {
    fn next_line(&mut self, _continuation: bool) -> Option<String> {
        self.lines.pop_front()
    }
}

#[derive(Debug)]
enum Lexeme {
    Token(Token),
    /// End of a logical statement: `;` or end of line at depth zero
    Boundary,
}

/// Statement-assembling lexer
pub struct Lexer<S> {
    source: S,
    file: Rc<str>,
    line: usize,
    parens: usize,
    brackets: usize,
    braces: usize,
    in_comment: bool,
    comment_start: Option<Position>,
    pending: VecDeque<Lexeme>,
    previous: Option<TokenKind>,
    /// Whether the last `-` may be read as the sign of a following number
    sign_allowed: bool,
}

impl<S: LineSource> Lexer<S> {
    pub fn new(file: impl Into<Rc<str>>, source: S) -> Self {
        Lexer {
            source,
            file: file.into(),
            line: 0,
            parens: 0,
            brackets: 0,
            braces: 0,
            in_comment: false,
            comment_start: None,
            pending: VecDeque::new(),
            previous: None,
            sign_allowed: false,
        }
    }

    pub fn file(&self) -> &Rc<str> {
        &self.file
    }

    fn depth(&self) -> usize {
        self.parens + self.brackets + self.braces
    }

    /// Produce the next logical statement, or `None` once the source is exhausted
    pub fn next_statement(&mut self) -> Result<Option<Vec<Token>>> {
        let mut statement: Vec<Token> = Vec::new();

        loop {
            match self.pending.pop_front() {
                Some(Lexeme::Token(token)) => statement.push(token),
                Some(Lexeme::Boundary) => {
                    if !statement.is_empty() {
                        return Ok(Some(statement));
                    }
                }
                None => {
                    let continuation =
                        !statement.is_empty() || self.depth() > 0 || self.in_comment;
                    match self.source.next_line(continuation) {
                        Some(text) => {
                            self.line += 1;
                            if let Err(err) = self.lex_line(&text) {
                                self.recover();
                                return Err(err);
                            }
                        }
                        None => return self.finish(statement),
                    }
                }
            }
        }
    }

    /// Drop the statement that failed to lex, so the next line starts clean
    fn recover(&mut self) {
        self.pending.clear();
        self.parens = 0;
        self.brackets = 0;
        self.braces = 0;
        self.in_comment = false;
        self.comment_start = None;
        self.previous = None;
        self.sign_allowed = false;
    }

    fn finish(&mut self, statement: Vec<Token>) -> Result<Option<Vec<Token>>> {
        if self.in_comment {
            let pos = self
                .comment_start
                .clone()
                .unwrap_or_else(|| Position::new(self.file.clone(), self.line, 1));
            return Err(ScriptError::syntax("multi-line comment is not closed").at(&pos));
        }
        if self.depth() > 0 {
            let err = ScriptError::syntax(format!("{} is not closed", self.open_bracket_name()));
            return Err(match statement.first() {
                Some(token) => err.at(&token.pos),
                None => err,
            });
        }
        Ok(if statement.is_empty() { None } else { Some(statement) })
    }

    fn open_bracket_name(&self) -> &'static str {
        if self.braces > 0 {
            "brace"
        } else if self.brackets > 0 {
            "bracket"
        } else {
            "parenthesis"
        }
    }

    fn lex_line(&mut self, text: &str) -> Result<()> {
        let mut offset = 0;

        while offset < text.len() {
            if self.in_comment {
                match text[offset..].find("*/") {
                    Some(end) => {
                        offset += end + 2;
                        self.in_comment = false;
                        self.comment_start = None;
                        continue;
                    }
                    None => break,
                }
            }

            let mut lexer = TokenKind::lexer(&text[offset..]);
            let mut resume = None;
            while let Some(result) = lexer.next() {
                let span = lexer.span();
                let pos = Position::new(self.file.clone(), self.line, offset + span.start + 1);
                match result {
                    Ok(TokenKind::CommentOpen) => {
                        self.in_comment = true;
                        self.comment_start = Some(pos);
                        resume = Some(offset + span.end);
                        break;
                    }
                    Ok(kind) => self.push_token(kind, lexer.slice(), pos)?,
                    Err(()) => return Err(unexpected_input(lexer.slice()).at(&pos)),
                }
            }
            match resume {
                Some(next) => offset = next,
                None => break,
            }
        }

        if !self.in_comment && self.depth() == 0 {
            self.boundary();
        }
        Ok(())
    }

    fn boundary(&mut self) {
        self.pending.push_back(Lexeme::Boundary);
        self.previous = None;
    }

    fn push_token(&mut self, kind: TokenKind, slice: &str, pos: Position) -> Result<()> {
        let token = match kind {
            TokenKind::Semicolon if self.depth() == 0 => {
                self.boundary();
                return Ok(());
            }
            TokenKind::Int | TokenKind::Float | TokenKind::Hex => {
                let text = if kind == TokenKind::Hex {
                    hex_to_decimal(slice).ok_or_else(|| {
                        ScriptError::syntax(format!("invalid hex literal: {slice}")).at(&pos)
                    })?
                } else {
                    slice.to_string()
                };
                let kind = if kind == TokenKind::Hex { TokenKind::Int } else { kind };
                if let Some(signed) = self.take_sign(&pos) {
                    Token::new(kind, format!("-{text}"), signed)
                } else {
                    Token::new(kind, text, pos)
                }
            }
            TokenKind::Str => Token::new(kind, unescape(&slice[1..slice.len() - 1]), pos),
            _ => {
                self.track_nesting(kind, &pos)?;
                Token::new(kind, slice, pos)
            }
        };

        if token.kind == TokenKind::Minus {
            self.sign_allowed = match self.previous {
                None => true,
                Some(prev) => {
                    prev.is_operator()
                        || prev.is_keyword()
                        || prev.is_open()
                        || matches!(prev, TokenKind::Comma | TokenKind::Colon)
                }
            };
        }
        self.previous = Some(token.kind);
        self.pending.push_back(Lexeme::Token(token));
        Ok(())
    }

    /// Pop a directly preceding `-` when it reads as the sign of a number
    fn take_sign(&mut self, number: &Position) -> Option<Position> {
        if !self.sign_allowed {
            return None;
        }
        match self.pending.back() {
            Some(Lexeme::Token(minus))
                if minus.kind == TokenKind::Minus
                    && minus.pos.line == number.line
                    && minus.pos.column + 1 == number.column => {}
            _ => return None,
        }
        match self.pending.pop_back() {
            Some(Lexeme::Token(minus)) => {
                self.sign_allowed = false;
                Some(minus.pos)
            }
            _ => None,
        }
    }

    fn track_nesting(&mut self, kind: TokenKind, pos: &Position) -> Result<()> {
        let counter = match kind {
            TokenKind::LParen | TokenKind::RParen => &mut self.parens,
            TokenKind::LBracket | TokenKind::RBracket => &mut self.brackets,
            TokenKind::LBrace | TokenKind::RBrace => &mut self.braces,
            _ => return Ok(()),
        };
        if kind.is_open() {
            *counter += 1;
        } else if *counter == 0 {
            return Err(ScriptError::syntax(format!("unexpected closing {kind:?}")).at(pos));
        } else {
            *counter -= 1;
        }
        Ok(())
    }
}

fn unexpected_input(slice: &str) -> ScriptError {
    if slice.starts_with('"') || slice.starts_with('\'') {
        ScriptError::syntax("string literal is not terminated")
    } else {
        ScriptError::syntax(format!("unexpected character: {slice:?}"))
    }
}

fn hex_to_decimal(slice: &str) -> Option<String> {
    BigInt::parse_bytes(slice[2..].as_bytes(), 16).map(|n| n.to_string())
}

/// Resolve backslash escapes in a string literal body
fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('a') => out.push('\u{7}'),
            Some('v') => out.push('\u{b}'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Pull the next logical statement from a lexer
pub fn tokenize_statement<S: LineSource>(lexer: &mut Lexer<S>) -> Result<Option<Vec<Token>>> {
    lexer.next_statement()
}

/// Tokenize a whole source text into logical statements
pub fn tokenize(file: &str, text: &str) -> Result<Vec<Vec<Token>>> {
    let mut lexer = Lexer::new(file, TextSource::new(text));
    let mut statements = Vec::new();
    while let Some(statement) = lexer.next_statement()? {
        statements.push(statement);
    }
    Ok(statements)
}

/// One line per token, statements separated by a header line
pub fn dump_statements(statements: &[Vec<Token>]) -> String {
    let mut out = String::new();
    for (i, statement) in statements.iter().enumerate() {
        out.push_str(&format!("statement {}\n", i + 1));
        for token in statement {
            out.push_str(&format!("  {token}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn kinds(statement: &[Token]) -> Vec<TokenKind> {
        statement.iter().map(|t| t.kind).collect()
    }

    fn texts(statement: &[Token]) -> Vec<&str> {
        statement.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("t", "").unwrap().is_empty());
        assert!(tokenize("t", "\n\n  # only a comment\n").unwrap().is_empty());
    }

    #[test]
    fn test_tokenize_keywords() {
        let stmts = tokenize("t", "var mut const func ret if else for in").unwrap();
        use TokenKind::*;
        assert_eq!(
            kinds(&stmts[0]),
            vec![Var, Mut, Const, Func, Ret, If, Else, For, In]
        );
    }

    #[test]
    fn test_newline_ends_statement() {
        let stmts = tokenize("t", "a := 1\nb := 2").unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(texts(&stmts[1]), vec!["b", ":=", "2"]);
        assert_eq!(stmts[1][0].pos.line, 2);
    }

    #[test]
    fn test_semicolon_splits_at_depth_zero() {
        let stmts = tokenize("t", "a := 1; b := 2;").unwrap();
        assert_eq!(stmts.len(), 2);
        let stmts = tokenize("t", "f(1; 2)").unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].iter().any(|t| t.is(TokenKind::Semicolon)));
    }

    #[test]
    fn test_open_brace_pulls_more_lines() {
        let source = "if x {\n  y := 1\n}\nz := 2";
        let stmts = tokenize("t", source).unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].len(), 7);
        assert_eq!(stmts[0].last().unwrap().pos.line, 3);
    }

    #[test]
    fn test_signed_number_after_operator() {
        let stmts = tokenize("t", "x := -5").unwrap();
        assert_eq!(texts(&stmts[0]), vec!["x", ":=", "-5"]);
        let stmts = tokenize("t", "[1, -2.5]").unwrap();
        assert_eq!(texts(&stmts[0]), vec!["[", "1", ",", "-2.5", "]"]);
    }

    #[test]
    fn test_minus_after_operand_is_subtraction() {
        let stmts = tokenize("t", "a -5").unwrap();
        assert_eq!(texts(&stmts[0]), vec!["a", "-", "5"]);
        let stmts = tokenize("t", "xs[0]-1").unwrap();
        assert_eq!(kinds(&stmts[0]).last(), Some(&TokenKind::Int));
        assert_eq!(stmts[0][4].kind, TokenKind::Minus);
        let stmts = tokenize("t", "x := - 5").unwrap();
        assert_eq!(texts(&stmts[0]), vec!["x", ":=", "-", "5"]);
    }

    #[test]
    fn test_hex_literal_converted() {
        let stmts = tokenize("t", "0xff").unwrap();
        assert_eq!(stmts[0][0].kind, TokenKind::Int);
        assert_eq!(stmts[0][0].text, "255");
    }

    #[test]
    fn test_string_escapes() {
        let stmts = tokenize("t", r#"s := "a\tb\n\"c\"" + 'it\'s'"#).unwrap();
        assert_eq!(stmts[0][2].text, "a\tb\n\"c\"");
        assert_eq!(stmts[0][4].text, "it's");
    }

    #[test]
    fn test_block_comment_spans_lines() {
        let source = "a := 1 /* start\nstill comment\nend */ b := 2\nc := 3";
        let stmts = tokenize("t", source).unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(texts(&stmts[0]), vec!["a", ":=", "1", "b", ":=", "2"]);
    }

    #[test]
    fn test_integer_division_is_not_a_comment() {
        let stmts = tokenize("t", "7 // 2 # trailing").unwrap();
        assert_eq!(
            kinds(&stmts[0]),
            vec![TokenKind::Int, TokenKind::SlashSlash, TokenKind::Int]
        );
    }

    #[test]
    fn test_unterminated_string_is_fatal() {
        let err = tokenize("t", "s := \"abc").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert!(err.message.contains("not terminated"));
    }

    #[test]
    fn test_unclosed_brace_is_fatal() {
        let err = tokenize("t", "func f() {\n ret 1\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.pos.unwrap().line, 1);
    }

    #[test]
    fn test_extra_closing_bracket() {
        let err = tokenize("t", "x := 1)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_unclosed_comment_is_fatal() {
        let err = tokenize("t", "/* never closed\n").unwrap_err();
        assert!(err.message.contains("comment"));
    }

    #[test]
    fn test_continuation_flag_reaches_source() {
        let mut lines = vec!["for {".to_string(), "}".to_string()].into_iter();
        let mut flags = Vec::new();
        let source = |continuation: bool| {
            flags.push(continuation);
            lines.next()
        };
        let mut lexer = Lexer::new("<stdin>", source);
        let stmt = tokenize_statement(&mut lexer).unwrap().unwrap();
        assert_eq!(stmt.len(), 3);
        drop(lexer);
        assert_eq!(flags, vec![false, true]);
    }

    #[test]
    fn test_lexing_resumes_after_bad_line() {
        let mut lines = ["s := \"abc", "y := 1", "a := (1 +", "2 \"x", "z := 3"]
            .into_iter()
            .map(str::to_string);
        let mut flags = Vec::new();
        let source = |continuation: bool| {
            flags.push(continuation);
            lines.next()
        };
        let mut lexer = Lexer::new("<stdin>", source);

        let err = tokenize_statement(&mut lexer).unwrap_err();
        assert!(err.message.contains("not terminated"));
        let stmt = tokenize_statement(&mut lexer).unwrap().unwrap();
        assert_eq!(texts(&stmt), vec!["y", ":=", "1"]);

        assert!(tokenize_statement(&mut lexer).is_err());
        let stmt = tokenize_statement(&mut lexer).unwrap().unwrap();
        assert_eq!(texts(&stmt), vec!["z", ":=", "3"]);
        assert!(tokenize_statement(&mut lexer).unwrap().is_none());
        drop(lexer);
        assert_eq!(flags, vec![false, false, false, true, false, false]);
    }

    #[test]
    fn test_token_dump_snapshot() {
        let stmts = tokenize("t", "total += xs[-1] ** 2").unwrap();
        let dump: Vec<String> = stmts[0].iter().map(|t| t.to_string()).collect();
        insta::assert_snapshot!(dump.join("\n"), @r###"
        1:1 Ident "total"
        1:7 PlusAssign "+="
        1:10 Ident "xs"
        1:12 LBracket "["
        1:13 Int "-1"
        1:15 RBracket "]"
        1:17 StarStar "**"
        1:20 Int "2"
        "###);
    }
}
