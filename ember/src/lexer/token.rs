//! Token definitions

use logos::Logos;
use std::fmt;
use std::rc::Rc;

/// Ember token kinds
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"#[^\n]*")]
pub enum TokenKind {
    // Keywords
    #[token("var")]
    Var,
    #[token("mut")]
    Mut,
    #[token("const")]
    Const,
    #[token("func")]
    Func,
    #[token("ret")]
    Ret,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("defer")]
    Defer,
    #[token("go")]
    Go,
    #[token("open")]
    Open,
    #[token("struct")]
    Struct,
    #[token("class")]
    Class,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("none")]
    NoneLit,

    // Literals
    #[regex(r"[0-9]+")]
    Int,
    #[regex(r"0[xX][0-9a-fA-F]+")]
    Hex,
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?")]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+")]
    Float,
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    #[regex(r"'([^'\\\n]|\\.)*'")]
    Str,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    // Arithmetic operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("//")]
    SlashSlash,
    #[token("%")]
    Percent,
    #[token("**")]
    StarStar,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,

    // Logic and comparison
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("==")]
    EqEq,
    #[token("!=")]
    #[token("<>")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,

    // Assignment
    #[token("=")]
    Assign,
    #[token(":=")]
    Define,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,
    #[token("**=")]
    StarStarAssign,
    #[token("<<=")]
    ShlAssign,
    #[token(">>=")]
    ShrAssign,
    #[token("&=")]
    AmpAssign,
    #[token("|=")]
    PipeAssign,
    #[token("^=")]
    CaretAssign,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,

    // Opens a `/* ... */` comment; the lexer scans for the close itself
    #[token("/*")]
    CommentOpen,
}

impl TokenKind {
    pub fn is_keyword(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Var | Mut
                | Const
                | Func
                | Ret
                | If
                | Else
                | For
                | In
                | Break
                | Continue
                | Try
                | Catch
                | Defer
                | Go
                | Open
                | Struct
                | Class
        )
    }

    /// Precedence class of a binary arithmetic operator, higher binds tighter
    pub fn precedence(&self) -> Option<u8> {
        use TokenKind::*;
        match self {
            StarStar | Shl | Shr | Percent => Some(3),
            Star | Slash | SlashSlash => Some(2),
            Amp | Pipe | Caret => Some(1),
            Plus | Minus => Some(0),
            _ => None,
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        self.precedence().is_some()
    }

    /// Relational and membership operators
    pub fn is_comparison(&self) -> bool {
        use TokenKind::*;
        matches!(self, EqEq | NotEq | Lt | Gt | LtEq | GtEq | In)
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, TokenKind::AndAnd | TokenKind::OrOr)
    }

    pub fn is_assignment(&self) -> bool {
        self.compound_operator().is_some() || matches!(self, TokenKind::Assign | TokenKind::Define)
    }

    /// The arithmetic operator behind a compound assignment
    pub fn compound_operator(&self) -> Option<TokenKind> {
        use TokenKind::*;
        match self {
            PlusAssign => Some(Plus),
            MinusAssign => Some(Minus),
            StarAssign => Some(Star),
            SlashAssign => Some(Slash),
            PercentAssign => Some(Percent),
            StarStarAssign => Some(StarStar),
            ShlAssign => Some(Shl),
            ShrAssign => Some(Shr),
            AmpAssign => Some(Amp),
            PipeAssign => Some(Pipe),
            CaretAssign => Some(Caret),
            _ => None,
        }
    }

    pub fn is_operator(&self) -> bool {
        self.is_arithmetic()
            || self.is_comparison()
            || self.is_logical()
            || self.is_assignment()
            || *self == TokenKind::Bang
    }

    pub fn is_open(&self) -> bool {
        matches!(self, TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace)
    }

    pub fn is_close(&self) -> bool {
        matches!(self, TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace)
    }

    pub fn is_literal(&self) -> bool {
        use TokenKind::*;
        matches!(self, Int | Float | Str | True | False | NoneLit)
    }
}

/// Location of a token in its source file (1-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub file: Rc<str>,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(file: impl Into<Rc<str>>, line: usize, column: usize) -> Self {
        Position {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A positioned token.
///
/// `text` holds the literal text, except for string literals (unescaped
/// contents) and hex literals (converted to decimal).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: Position,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, pos: Position) -> Self {
        Token {
            kind,
            text: text.into(),
            pos,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn line(&self) -> usize {
        self.pos.line
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {:?} {:?}",
            self.pos.line, self.pos.column, self.kind, self.text
        )
    }
}
