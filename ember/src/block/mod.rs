//! Block resolution
//!
//! Statements never become an AST. Control structures hand their token
//! slice to [`resolve_block`], which finds the matching `}` and splits the
//! interior into statement groups. The helpers here do the depth-aware
//! scanning shared by the evaluator.

use crate::error::{Result, ScriptError};
use crate::lexer::{Token, TokenKind};

/// Interior of a `{ ... }` block
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Vec<Token>>,
    /// Index just past the closing brace in the input slice
    pub end: usize,
}

/// Index of the bracket closing the one at `open`
pub fn matching_close(tokens: &[Token], open: usize) -> Result<usize> {
    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate().skip(open) {
        if token.kind.is_open() {
            depth += 1;
        } else if token.kind.is_close() {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Ok(index);
            }
        }
    }
    let err = ScriptError::syntax("bracket is not closed");
    Err(match tokens.get(open) {
        Some(token) => err.at(&token.pos),
        None => err,
    })
}

/// Index of the first token at bracket depth zero matching `pred`
pub fn find_top_level(tokens: &[Token], pred: impl Fn(&Token) -> bool) -> Option<usize> {
    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate() {
        if depth == 0 && pred(token) {
            return Some(index);
        }
        if token.kind.is_open() {
            depth += 1;
        } else if token.kind.is_close() {
            depth = depth.saturating_sub(1);
        }
    }
    None
}

/// First `{` outside parentheses and brackets
pub fn find_block_open(tokens: &[Token]) -> Option<usize> {
    find_top_level(tokens, |t| t.is(TokenKind::LBrace))
}

/// Split at every depth-zero occurrence of `separator`.
///
/// A trailing separator does not produce an empty final part.
pub fn split_top_level(tokens: &[Token], separator: TokenKind) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, token) in tokens.iter().enumerate() {
        if depth == 0 && token.kind == separator {
            parts.push(&tokens[start..index]);
            start = index + 1;
            continue;
        }
        if token.kind.is_open() {
            depth += 1;
        } else if token.kind.is_close() {
            depth = depth.saturating_sub(1);
        }
    }
    if start < tokens.len() {
        parts.push(&tokens[start..]);
    }
    parts
}

/// Resolve the block opening at `tokens[0]`
pub fn resolve_block(tokens: &[Token]) -> Result<Block> {
    let Some(first) = tokens.first() else {
        return Err(ScriptError::syntax("block is expected"));
    };
    if first.kind != TokenKind::LBrace {
        return Err(ScriptError::syntax("block must start with '{'").at(&first.pos));
    }
    let close = matching_close(tokens, 0)?;
    Ok(Block {
        statements: split_statements(&tokens[1..close])?,
        end: close + 1,
    })
}

/// Split a block interior into statement groups.
///
/// A group ends at a depth-zero `;` or when a depth-zero token sits on a
/// later line than the previous one. After a bracketed construct closes,
/// its closing token's line is the current line.
pub fn split_statements(tokens: &[Token]) -> Result<Vec<Vec<Token>>> {
    let mut groups = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut depth = 0usize;
    let mut line = tokens.first().map(Token::line).unwrap_or(0);

    for token in tokens {
        if depth == 0 {
            if token.kind == TokenKind::Semicolon {
                if !current.is_empty() {
                    groups.push(std::mem::take(&mut current));
                }
                continue;
            }
            if token.line() > line && !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
            line = token.line();
        }

        if token.kind.is_open() {
            depth += 1;
        } else if token.kind.is_close() {
            if depth == 0 {
                return Err(ScriptError::syntax(format!("unexpected closing {:?}", token.kind))
                    .at(&token.pos));
            }
            depth -= 1;
            if depth == 0 {
                line = token.line();
            }
        }
        current.push(token.clone());
    }

    if !current.is_empty() {
        groups.push(current);
    }
    Ok(groups)
}

/// Cursor over a sequence of statement groups.
///
/// Tokens that trail a closing brace on the same statement (`} else {`)
/// are pushed back with [`Cursor::push_front`] and come out as the next
/// statement.
#[derive(Debug)]
pub struct Cursor<'a> {
    groups: &'a [Vec<Token>],
    index: usize,
    spill: Option<&'a [Token]>,
}

impl<'a> Cursor<'a> {
    pub fn new(groups: &'a [Vec<Token>]) -> Self {
        Cursor {
            groups,
            index: 0,
            spill: None,
        }
    }

    /// Cursor over a single statement
    pub fn single(tokens: &'a [Token]) -> Self {
        Cursor {
            groups: &[],
            index: 0,
            spill: (!tokens.is_empty()).then_some(tokens),
        }
    }

    pub fn next(&mut self) -> Option<&'a [Token]> {
        if let Some(spill) = self.spill.take() {
            return Some(spill);
        }
        let group = self.groups.get(self.index)?;
        self.index += 1;
        Some(group.as_slice())
    }

    pub fn peek(&self) -> Option<&'a [Token]> {
        self.spill
            .or_else(|| self.groups.get(self.index).map(Vec::as_slice))
    }

    /// Whether the next statement starts with `kind`
    pub fn next_starts_with(&self, kind: TokenKind) -> bool {
        self.peek()
            .and_then(|tokens| tokens.first())
            .is_some_and(|token| token.kind == kind)
    }

    pub fn push_front(&mut self, tokens: &'a [Token]) {
        if !tokens.is_empty() {
            self.spill = Some(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn statement(source: &str) -> Vec<Token> {
        let mut stmts = tokenize("t", source).unwrap();
        assert_eq!(stmts.len(), 1, "expected one statement");
        stmts.remove(0)
    }

    fn texts(tokens: &[Token]) -> String {
        tokens
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_resolve_splits_by_line() {
        let tokens = statement("{\n a := 1\n b := 2\n}");
        let block = resolve_block(&tokens).unwrap();
        assert_eq!(block.statements.len(), 2);
        assert_eq!(texts(&block.statements[1]), "b := 2");
        assert_eq!(block.end, tokens.len());
    }

    #[test]
    fn test_resolve_splits_by_semicolon() {
        let tokens = statement("{ a := 1; b := 2; c := 3 }");
        let block = resolve_block(&tokens).unwrap();
        assert_eq!(block.statements.len(), 3);
    }

    #[test]
    fn test_multiline_bracket_stays_one_statement() {
        let tokens = statement("{\n xs := [1,\n  2,\n  3]\n y := 4\n}");
        let block = resolve_block(&tokens).unwrap();
        assert_eq!(block.statements.len(), 2);
        assert_eq!(texts(&block.statements[0]), "xs := [ 1 , 2 , 3 ]");
    }

    #[test]
    fn test_nested_block_is_one_group() {
        let tokens = statement("{\n if x {\n  y := 1\n }\n z := 2\n}");
        let block = resolve_block(&tokens).unwrap();
        assert_eq!(block.statements.len(), 2);
        assert_eq!(block.statements[0].first().unwrap().kind, TokenKind::If);
    }

    #[test]
    fn test_trailing_tokens_after_close() {
        let tokens = statement("{ a } else { b }");
        let block = resolve_block(&tokens).unwrap();
        assert_eq!(tokens[block.end].kind, TokenKind::Else);
    }

    #[test]
    fn test_empty_block() {
        let tokens = statement("{}");
        let block = resolve_block(&tokens).unwrap();
        assert!(block.statements.is_empty());
    }

    #[test]
    fn test_missing_open_brace() {
        let tokens = statement("a b");
        assert!(resolve_block(&tokens).is_err());
    }

    #[test]
    fn test_split_top_level_ignores_nested_commas() {
        let tokens = statement("f(a, b), [c, d], e,");
        let parts = split_top_level(&tokens, TokenKind::Comma);
        assert_eq!(parts.len(), 3);
        assert_eq!(texts(parts[1]), "[ c , d ]");
    }

    #[test]
    fn test_find_block_open_skips_parens() {
        let tokens = statement("for x in f({}) { }");
        let open = find_block_open(&tokens).unwrap();
        assert_eq!(open, 8);
    }

    #[test]
    fn test_cursor_push_front() {
        let groups = tokenize("t", "a\nb").unwrap();
        let extra = statement("c");
        let mut cursor = Cursor::new(&groups);
        assert_eq!(texts(cursor.next().unwrap()), "a");
        cursor.push_front(&extra);
        assert!(cursor.next_starts_with(TokenKind::Ident));
        assert_eq!(texts(cursor.next().unwrap()), "c");
        assert_eq!(texts(cursor.next().unwrap()), "b");
        assert!(cursor.next().is_none());
    }
}
