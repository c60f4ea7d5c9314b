//! Expression evaluation
//!
//! Expressions are evaluated straight from their token slice. A slice with
//! a top-level comparison or logical operator is a condition; anything
//! else is split into operands and arithmetic operators and reduced.

use super::arith;
use super::compare::compare;
use super::eval::Engine;
use super::function::Arg;
use super::index;
use super::methods;
use super::number;
use super::scope::{Binding, Entry, Frame, Module};
use super::value::Value;
use crate::block::{find_top_level, matching_close, resolve_block, split_top_level};
use crate::error::{Result, ScriptError};
use crate::lexer::{Position, Token, TokenKind};
use crate::util::find_similar_name;
use std::rc::Rc;

/// Name given to `func(...) { }` expressions
pub const ANONYMOUS: &str = "<anonymous>";

/// A resolved operand: either a value or a module reference
pub(crate) enum Operand {
    Value(Value),
    Module(Rc<Module>),
}

impl Operand {
    pub(crate) fn into_value(self) -> Result<Value> {
        match self {
            Operand::Value(value) => Ok(value),
            Operand::Module(module) => Err(ScriptError::value(format!(
                "module {} cannot be used as a value",
                module.name
            ))),
        }
    }
}

fn is_condition(tokens: &[Token]) -> bool {
    find_top_level(tokens, |t| t.kind.is_comparison() || t.kind.is_logical()).is_some()
}

fn missing_operand(tokens: &[Token]) -> ScriptError {
    let err = ScriptError::syntax("operator is missing an operand");
    match tokens.first() {
        Some(t) => err.at(&t.pos),
        None => err,
    }
}

type Split<'a> = (Vec<&'a [Token]>, Vec<(TokenKind, Position)>);

/// Split at top-level arithmetic operators.
///
/// An operator seen where an operand is expected is a unary prefix and
/// stays with its operand.
fn split_operands(tokens: &[Token]) -> Result<Split<'_>> {
    let mut operands = Vec::new();
    let mut operators = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut expecting = true;

    for (i, token) in tokens.iter().enumerate() {
        if depth == 0 && !expecting && token.kind.is_arithmetic() {
            operands.push(&tokens[start..i]);
            operators.push((token.kind, token.pos.clone()));
            start = i + 1;
            expecting = true;
            continue;
        }
        if token.kind.is_open() {
            depth += 1;
        } else if token.kind.is_close() {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && expecting && matches!(token.kind, TokenKind::Minus | TokenKind::Bang) {
            continue;
        }
        expecting = false;
    }
    operands.push(&tokens[start..]);

    if let Some(i) = operands.iter().position(|o| o.is_empty()) {
        let err = ScriptError::syntax("operator is missing an operand");
        return Err(match operators.get(i.saturating_sub(1)) {
            Some((_, pos)) => err.at(pos),
            None => err,
        });
    }
    Ok((operands, operators))
}

/// Values produced by iterating a list, map or str: (index or key, element)
pub(crate) fn enumerate(source: &Value) -> Result<Vec<(Value, Value)>> {
    match source {
        Value::List(items) => Ok(items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, item)| (Value::int(i as i64), item.clone()))
            .collect()),
        Value::Map(entries) => Ok(entries.borrow().clone()),
        Value::Str(text) => Ok(text
            .chars()
            .enumerate()
            .map(|(i, c)| (Value::int(i as i64), Value::from(c.to_string())))
            .collect()),
        other => Err(ScriptError::value(format!(
            "{} is not iterable",
            other.type_name()
        ))),
    }
}

impl Engine {
    /// Evaluate an expression slice
    pub(crate) fn eval_expr(&mut self, frame: &mut Frame, tokens: &[Token]) -> Result<Value> {
        if tokens.is_empty() {
            return Err(ScriptError::syntax("value is expected"));
        }
        if is_condition(tokens) {
            return self.eval_condition(frame, tokens).map(Value::Bool);
        }
        self.eval_arithmetic(frame, tokens)
    }

    /// `||` branches of `&&` conjuncts, short-circuiting both ways
    pub(crate) fn eval_condition(&mut self, frame: &mut Frame, tokens: &[Token]) -> Result<bool> {
        if let Some(last) = tokens.last().filter(|t| t.kind.is_logical()) {
            return Err(ScriptError::syntax("condition is missing an operand").at(&last.pos));
        }
        for branch in split_top_level(tokens, TokenKind::OrOr) {
            let mut all = true;
            for conjunct in split_top_level(branch, TokenKind::AndAnd) {
                if !self.eval_conjunct(frame, conjunct)? {
                    all = false;
                    break;
                }
            }
            if all {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn eval_conjunct(&mut self, frame: &mut Frame, tokens: &[Token]) -> Result<bool> {
        if tokens.is_empty() {
            return Err(ScriptError::syntax("condition is missing an operand"));
        }
        let Some(at) = find_top_level(tokens, |t| t.kind.is_comparison()) else {
            return Ok(self.eval_arithmetic(frame, tokens)?.is_true());
        };
        let op = &tokens[at];
        let (left, right) = (&tokens[..at], &tokens[at + 1..]);
        if left.is_empty() || right.is_empty() {
            return Err(ScriptError::syntax("comparison needs two operands").at(&op.pos));
        }
        let left = self.eval_arithmetic(frame, left)?;
        let right = self.eval_arithmetic(frame, right)?;
        compare(op.kind, &left, &right).map_err(|e| e.at(&op.pos))
    }

    pub(crate) fn eval_arithmetic(&mut self, frame: &mut Frame, tokens: &[Token]) -> Result<Value> {
        if tokens.is_empty() {
            return Err(missing_operand(tokens));
        }
        let (operands, operators) = split_operands(tokens)?;
        if operators.is_empty() {
            return self.eval_operand(frame, tokens);
        }
        let mut values = Vec::with_capacity(operands.len());
        for operand in operands {
            values.push(self.eval_operand(frame, operand)?);
        }
        arith::reduce(values, operators, self.config.float_digits)
    }

    /// Single operand with its unary prefixes and postfix chain
    pub(crate) fn eval_operand(&mut self, frame: &mut Frame, tokens: &[Token]) -> Result<Value> {
        self.resolve_operand(frame, tokens)?.into_value()
    }

    pub(crate) fn resolve_operand(&mut self, frame: &mut Frame, tokens: &[Token]) -> Result<Operand> {
        let Some(first) = tokens.first() else {
            return Err(ScriptError::syntax("value is expected"));
        };
        match first.kind {
            TokenKind::Minus => {
                let value = self.eval_operand(frame, &tokens[1..])?;
                return arith::negate(&value).map(Operand::Value).map_err(|e| e.at(&first.pos));
            }
            TokenKind::Bang => {
                let value = self.eval_operand(frame, &tokens[1..])?;
                return Ok(Operand::Value(Value::Bool(!value.is_true())));
            }
            _ => {}
        }

        let (mut current, mut i) = self.eval_primary(frame, tokens)?;
        while let Some(token) = tokens.get(i) {
            match token.kind {
                TokenKind::Dot => {
                    let Some(name) = tokens.get(i + 1).filter(|t| t.is(TokenKind::Ident)) else {
                        return Err(ScriptError::syntax("member name is expected").at(&token.pos));
                    };
                    current = self.member(current, &name.text).map_err(|e| e.at(&name.pos))?;
                    i += 2;
                }
                TokenKind::LBracket => {
                    let close = matching_close(tokens, i)?;
                    let key = self.eval_expr(frame, &tokens[i + 1..close])?;
                    let container = current.into_value()?;
                    current = Operand::Value(
                        index::get(&container, &key).map_err(|e| e.at(&token.pos))?,
                    );
                    i = close + 1;
                }
                TokenKind::LParen => {
                    let close = matching_close(tokens, i)?;
                    let callee = current.into_value()?;
                    let value = self.call_value(frame, callee, &tokens[i + 1..close], &token.pos)?;
                    current = Operand::Value(value);
                    i = close + 1;
                }
                _ => {
                    return Err(
                        ScriptError::syntax(format!("unexpected '{}'", token.text)).at(&token.pos)
                    );
                }
            }
        }
        Ok(current)
    }

    /// Leading literal, name or bracketed construct; returns the index after it
    fn eval_primary(&mut self, frame: &mut Frame, tokens: &[Token]) -> Result<(Operand, usize)> {
        let first = &tokens[0];
        let value = match first.kind {
            TokenKind::Int | TokenKind::Float => {
                let n = number::parse(&first.text).ok_or_else(|| {
                    ScriptError::syntax(format!("invalid number: {}", first.text)).at(&first.pos)
                })?;
                Value::number(n, first.kind == TokenKind::Float)
            }
            TokenKind::Str => Value::str(&first.text),
            TokenKind::True => Value::Bool(true),
            TokenKind::False => Value::Bool(false),
            TokenKind::NoneLit => Value::None,
            TokenKind::Ident => return Ok((self.resolve_name(frame, first)?, 1)),
            TokenKind::LParen => {
                let close = matching_close(tokens, 0)?;
                let inner = &tokens[1..close];
                if inner.is_empty() {
                    return Err(ScriptError::syntax("empty parentheses").at(&first.pos));
                }
                return Ok((Operand::Value(self.eval_expr(frame, inner)?), close + 1));
            }
            TokenKind::LBracket => {
                let close = matching_close(tokens, 0)?;
                let list = self.eval_list_literal(frame, &tokens[1..close])?;
                return Ok((Operand::Value(list), close + 1));
            }
            TokenKind::LBrace => {
                let close = matching_close(tokens, 0)?;
                let map = self.eval_map_literal(frame, &tokens[1..close])?;
                return Ok((Operand::Value(map), close + 1));
            }
            TokenKind::Func => {
                let Some(open) = tokens.get(1).filter(|t| t.is(TokenKind::LParen)) else {
                    return Err(ScriptError::syntax("'(' is expected after func").at(&first.pos));
                };
                let close = matching_close(tokens, 1).map_err(|e| e.at(&open.pos))?;
                let block = resolve_block(&tokens[close + 1..]).map_err(|e| e.at(&first.pos))?;
                let function =
                    self.make_function(frame, ANONYMOUS, &tokens[2..close], block.statements, first.line())?;
                return Ok((Operand::Value(Value::Func(function)), close + 1 + block.end));
            }
            _ => {
                return Err(
                    ScriptError::syntax(format!("invalid value '{}'", first.text)).at(&first.pos)
                );
            }
        };
        Ok((Operand::Value(value), 1))
    }

    fn resolve_name(&self, frame: &Frame, token: &Token) -> Result<Operand> {
        match frame.lookup(&token.text) {
            Some(Entry::Binding(binding)) => Ok(Operand::Value(binding.get())),
            Some(Entry::Function(function)) => Ok(Operand::Value(Value::Func(function))),
            Some(Entry::Module(module)) => Ok(Operand::Module(module)),
            None => {
                let names = frame.names();
                let candidates: Vec<&str> = names.iter().map(String::as_str).collect();
                let suggestion = find_similar_name(&token.text, &candidates, 2);
                Err(ScriptError::undefined(&token.text, suggestion).at(&token.pos))
            }
        }
    }

    /// `operand.name`
    fn member(&mut self, operand: Operand, name: &str) -> Result<Operand> {
        let value = match operand {
            Operand::Module(module) => {
                return Ok(match module.member(name)? {
                    Entry::Binding(binding) => Operand::Value(binding.get()),
                    Entry::Function(function) => Operand::Value(Value::Func(function)),
                    Entry::Module(inner) => Operand::Module(inner),
                });
            }
            Operand::Value(value) => value,
        };

        let found = match &value {
            Value::StructIns(instance) => Some(instance.get(name)?),
            Value::ClassIns(instance) => instance.get(name).or_else(|| {
                instance
                    .class
                    .method(name)
                    .map(|method| Value::Func(method.bind(value.clone())))
            }),
            Value::Str(_) | Value::List(_) | Value::Map(_) => {
                methods::lookup(&value, name).map(Value::Func)
            }
            _ => None,
        };
        found.map(Operand::Value).ok_or_else(|| {
            ScriptError::name(format!("{} has no member '{name}'", value.type_name()))
        })
    }

    fn eval_list_literal(&mut self, frame: &mut Frame, inner: &[Token]) -> Result<Value> {
        if let Some(at) = find_top_level(inner, |t| t.is(TokenKind::For)) {
            return self.eval_comprehension(frame, &inner[..at], &inner[at + 1..]);
        }
        let mut items = Vec::new();
        for part in split_top_level(inner, TokenKind::Comma) {
            if part.is_empty() {
                return Err(ScriptError::syntax("list element is expected"));
            }
            items.push(self.eval_expr(frame, part)?);
        }
        Ok(Value::list(items))
    }

    /// `[select for name in source, filter]`
    fn eval_comprehension(
        &mut self,
        frame: &mut Frame,
        select: &[Token],
        header: &[Token],
    ) -> Result<Value> {
        if select.is_empty() {
            return Err(ScriptError::syntax("comprehension needs an expression before 'for'"));
        }
        let (Some(name), Some(in_token)) = (header.first(), header.get(1)) else {
            return Err(ScriptError::syntax("comprehension needs 'for name in source'"));
        };
        if name.kind != TokenKind::Ident || in_token.kind != TokenKind::In {
            return Err(ScriptError::syntax("comprehension needs 'for name in source'").at(&name.pos));
        }
        let rest = &header[2..];
        let (source, filter) = match find_top_level(rest, |t| t.is(TokenKind::Comma)) {
            Some(comma) => (&rest[..comma], &rest[comma + 1..]),
            None => (rest, &rest[rest.len()..]),
        };
        let source = self.eval_expr(frame, source)?;
        let is_map = matches!(source, Value::Map(_));
        // Lists and strings yield their elements, maps their keys
        let items = enumerate(&source)?
            .into_iter()
            .map(|(key, element)| if is_map { key } else { element })
            .collect();

        let mark = frame.enter_block();
        let result = self.collect_comprehension(frame, name, items, select, filter);
        frame.exit_block(mark);
        result.map(Value::list)
    }

    fn collect_comprehension(
        &mut self,
        frame: &mut Frame,
        name: &Token,
        items: Vec<Value>,
        select: &[Token],
        filter: &[Token],
    ) -> Result<Vec<Value>> {
        let mark = frame.mark();
        let mut selected = Vec::new();
        for value in items {
            if name.text != "_" {
                frame.declare(Binding::new(&name.text, name.line(), value, false, true))?;
            }
            let keep = filter.is_empty() || self.eval_condition(frame, filter)?;
            if keep {
                selected.push(self.eval_expr(frame, select)?);
            }
            frame.truncate(mark);
        }
        Ok(selected)
    }

    fn eval_map_literal(&mut self, frame: &mut Frame, inner: &[Token]) -> Result<Value> {
        let mut entries: Vec<(Value, Value)> = Vec::new();
        for part in split_top_level(inner, TokenKind::Comma) {
            let Some(colon) = find_top_level(part, |t| t.is(TokenKind::Colon)) else {
                let err = ScriptError::syntax("map entry needs 'key: value'");
                return Err(match part.first() {
                    Some(t) => err.at(&t.pos),
                    None => err,
                });
            };
            let key = self.eval_expr(frame, &part[..colon])?;
            let value = self.eval_expr(frame, &part[colon + 1..])?;
            if entries.iter().any(|(k, _)| k.deep_eq(&key)) {
                return Err(ScriptError::value(format!("map key {} is given twice", key.repr())));
            }
            entries.push((key.deep_clone(), value));
        }
        Ok(Value::map(entries))
    }

    /// Evaluate call-site arguments: `a`, `name = a`, `xs...`
    pub(crate) fn eval_args(&mut self, frame: &mut Frame, tokens: &[Token]) -> Result<Vec<Arg>> {
        let mut args = Vec::new();
        for part in split_top_level(tokens, TokenKind::Comma) {
            let arg = match part {
                [] => return Err(ScriptError::syntax("argument is expected")),
                [name, assign, value @ ..]
                    if name.is(TokenKind::Ident) && assign.is(TokenKind::Assign) =>
                {
                    if value.is_empty() {
                        return Err(ScriptError::syntax("keyword argument needs a value").at(&assign.pos));
                    }
                    Arg::Keyword(name.text.clone(), self.eval_expr(frame, value)?)
                }
                [value @ .., spread] if spread.is(TokenKind::Ellipsis) => {
                    Arg::Spread(self.eval_expr(frame, value)?)
                }
                value => Arg::Positional(self.eval_expr(frame, value)?),
            };
            args.push(arg);
        }
        Ok(args)
    }
}
