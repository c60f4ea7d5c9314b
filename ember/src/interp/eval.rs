//! Statement evaluator

use super::arith;
use super::call::{CallMode, PendingCall};
use super::function::{Body, Function, parse_params};
use super::index;
use super::module::ModuleLoader;
use super::record::{ClassDef, FieldDecl, StructDef};
use super::scope::{Binding, Entry, Frame, FrameKind, Module, ModuleScope, is_public_name};
use super::value::Value;
use crate::block::{
    Block, Cursor, find_block_open, find_top_level, matching_close, resolve_block,
    split_statements, split_top_level,
};
use crate::config::EngineConfig;
use crate::error::{Result, ScriptError};
use crate::lexer::{Token, TokenKind};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::rc::Rc;
use tracing::debug;

/// Stack growth parameters for deep recursion
pub(crate) const STACK_RED_ZONE: usize = 128 * 1024; // 128KB remaining triggers growth
pub(crate) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024; // Grow by 4MB each time

/// Control-flow outcome of a statement
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    None,
    Break,
    Continue,
    Return(Value),
}

/// Evaluation context shared by every frame
pub struct Engine {
    pub(crate) config: EngineConfig,
    /// Natives visible in every module
    pub(crate) natives: Vec<Rc<Function>>,
    pub(crate) loader: Box<dyn ModuleLoader>,
    /// Evaluated modules by name
    pub(crate) modules: HashMap<String, Rc<ModuleScope>>,
    /// Deferred calls; each function call owns the ones it pushed
    pub(crate) deferred: Vec<PendingCall>,
    /// Detached calls, drained between top-level statements
    pub(crate) detached: VecDeque<PendingCall>,
    pub(crate) call_depth: usize,
    pub(crate) out: Box<dyn Write>,
    /// Value of the last expression statement
    pub(crate) last_value: Option<Value>,
}

/// Clause keyword that continues a statement (`else`, `catch`), either
/// trailing the closing brace or starting the next statement
fn take_clause<'a>(rest: &'a [Token], cursor: &mut Cursor<'a>, keyword: TokenKind) -> Option<&'a [Token]> {
    if let Some(first) = rest.first() {
        if first.is(keyword) {
            return Some(rest);
        }
        cursor.push_front(rest);
        return None;
    }
    if cursor.next_starts_with(keyword) {
        return cursor.next();
    }
    None
}

/// `else { ... }` after a loop or the final `else` of an if chain
fn else_block<'a>(clause: &'a [Token], cursor: &mut Cursor<'a>) -> Result<Block> {
    let block = resolve_block(&clause[1..]).map_err(|e| e.at(&clause[0].pos))?;
    cursor.push_front(&clause[1 + block.end..]);
    Ok(block)
}

/// Header and block of `keyword header { ... }`
fn header_and_block(tokens: &[Token]) -> Result<(&[Token], Block, usize)> {
    let Some(open) = find_block_open(&tokens[1..]).map(|i| i + 1) else {
        return Err(ScriptError::syntax(format!("'{}' needs a block", tokens[0].text)));
    };
    let block = resolve_block(&tokens[open..])?;
    let end = open + block.end;
    Ok((&tokens[1..open], block, end))
}

fn expect_ident<'a>(token: Option<&'a Token>, what: &str) -> Result<&'a Token> {
    match token {
        Some(t) if t.is(TokenKind::Ident) => Ok(t),
        Some(t) => Err(ScriptError::syntax(format!("{what} is expected, found '{}'", t.text)).at(&t.pos)),
        None => Err(ScriptError::syntax(format!("{what} is expected"))),
    }
}

/// Names bound by `for a, b in ...`; `_` binds nothing
fn loop_names(names: &[Token]) -> Result<(Option<&Token>, Option<&Token>)> {
    let parts = split_top_level(names, TokenKind::Comma);
    let mut bound = Vec::new();
    for part in &parts {
        let [name] = part else {
            return Err(ScriptError::syntax("loop variable must be a single name"));
        };
        let name = expect_ident(Some(name), "loop variable")?;
        bound.push((name.text != "_").then_some(name));
    }
    match bound.as_slice() {
        [first] => Ok((*first, None)),
        [first, second] => Ok((*first, *second)),
        _ => Err(ScriptError::syntax("a loop binds at most two names")),
    }
}

/// Index of the `(` whose `)` ends the slice
fn trailing_call_open(tokens: &[Token]) -> Option<usize> {
    if !tokens.last()?.is(TokenKind::RParen) {
        return None;
    }
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().rev() {
        if token.kind.is_close() {
            depth += 1;
        } else if token.kind.is_open() {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return token.is(TokenKind::LParen).then_some(i);
            }
        }
    }
    None
}

/// Position of the last top-level `.` or `[` (the final accessor)
fn last_accessor(tokens: &[Token]) -> Option<usize> {
    let mut depth = 0usize;
    let mut last = None;
    for (i, token) in tokens.iter().enumerate() {
        if depth == 0 && i > 0 && matches!(token.kind, TokenKind::Dot | TokenKind::LBracket) {
            last = Some(i);
        }
        if token.kind.is_open() {
            depth += 1;
        } else if token.kind.is_close() {
            depth = depth.saturating_sub(1);
        }
    }
    last
}

impl Engine {
    pub fn new(config: EngineConfig, loader: Box<dyn ModuleLoader>, out: Box<dyn Write>) -> Self {
        Engine {
            config,
            natives: Vec::new(),
            loader,
            modules: HashMap::new(),
            deferred: Vec::new(),
            detached: VecDeque::new(),
            call_depth: 0,
            out,
            last_value: None,
        }
    }

    /// Run a module's top-level statements, draining detached calls
    /// after each one
    pub(crate) fn exec_top_level(&mut self, frame: &mut Frame, statements: &[Vec<Token>]) -> Result<Signal> {
        let mut cursor = Cursor::new(statements);
        while let Some(tokens) = cursor.next() {
            let signal = self.exec_statement(frame, tokens, &mut cursor)?;
            self.drain_detached()?;
            if signal != Signal::None {
                return Ok(signal);
            }
        }
        Ok(Signal::None)
    }

    pub(crate) fn exec_sequence(&mut self, frame: &mut Frame, statements: &[Vec<Token>]) -> Result<Signal> {
        let mut cursor = Cursor::new(statements);
        while let Some(tokens) = cursor.next() {
            let signal = self.exec_statement(frame, tokens, &mut cursor)?;
            if signal != Signal::None {
                return Ok(signal);
            }
        }
        Ok(Signal::None)
    }

    /// Run a block in its own scope; bindings are dropped however it exits
    pub(crate) fn exec_block(&mut self, frame: &mut Frame, statements: &[Vec<Token>]) -> Result<Signal> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            let mark = frame.enter_block();
            let result = self.exec_sequence(frame, statements);
            frame.exit_block(mark);
            result
        })
    }

    /// Execute one statement; continuation clauses are read from `cursor`
    pub(crate) fn exec_statement<'a>(
        &mut self,
        frame: &mut Frame,
        tokens: &'a [Token],
        cursor: &mut Cursor<'a>,
    ) -> Result<Signal> {
        let Some(first) = tokens.first() else {
            return Ok(Signal::None);
        };
        self.exec_statement_inner(frame, tokens, cursor)
            .map_err(|e| e.at(&first.pos))
    }

    fn exec_statement_inner<'a>(
        &mut self,
        frame: &mut Frame,
        tokens: &'a [Token],
        cursor: &mut Cursor<'a>,
    ) -> Result<Signal> {
        let first = &tokens[0];
        match first.kind {
            TokenKind::Var | TokenKind::Mut | TokenKind::Const => {
                self.exec_declaration(frame, tokens)?;
            }
            TokenKind::Func if tokens.get(1).is_some_and(|t| t.is(TokenKind::Ident)) => {
                self.exec_function_decl(frame, tokens, cursor)?;
            }
            TokenKind::If => return self.exec_if(frame, tokens, cursor),
            TokenKind::For => return self.exec_for(frame, tokens, cursor),
            TokenKind::Break | TokenKind::Continue => {
                if tokens.len() > 1 {
                    return Err(ScriptError::syntax(format!("unexpected '{}'", tokens[1].text)).at(&tokens[1].pos));
                }
                if frame.loops == 0 {
                    return Err(ScriptError::syntax(format!("'{}' outside of a loop", first.text)));
                }
                return Ok(if first.is(TokenKind::Break) { Signal::Break } else { Signal::Continue });
            }
            TokenKind::Ret => {
                if frame.kind() != FrameKind::Function {
                    return Err(ScriptError::syntax("'ret' outside of a function"));
                }
                let value = if tokens.len() == 1 {
                    Value::None
                } else {
                    self.eval_expr(frame, &tokens[1..])?
                };
                return Ok(Signal::Return(value));
            }
            TokenKind::Try => return self.exec_try(frame, tokens, cursor),
            TokenKind::Defer => self.exec_pending(frame, tokens, CallMode::Deferred)?,
            TokenKind::Go => self.exec_pending(frame, tokens, CallMode::Detached)?,
            TokenKind::Open => self.exec_open(frame, tokens)?,
            TokenKind::Struct => self.exec_struct(frame, tokens)?,
            TokenKind::Class => self.exec_class(frame, tokens)?,
            TokenKind::Else | TokenKind::Catch => {
                return Err(ScriptError::syntax(format!("'{}' without a matching statement", first.text)));
            }
            _ => match find_top_level(tokens, |t| t.kind.is_assignment()) {
                Some(at) if tokens[at].is(TokenKind::Define) => {
                    if at != 1 {
                        return Err(ScriptError::syntax("':=' needs a single name on the left").at(&tokens[at].pos));
                    }
                    self.declare_one(frame, tokens, false, false)?;
                }
                Some(at) => self.exec_assignment(frame, &tokens[..at], &tokens[at], &tokens[at + 1..])?,
                None => {
                    let value = self.eval_expr(frame, tokens)?;
                    self.last_value = Some(value);
                }
            },
        }
        Ok(Signal::None)
    }

    // ========================================================================
    // Declarations and assignment
    // ========================================================================

    fn exec_declaration(&mut self, frame: &mut Frame, tokens: &[Token]) -> Result<()> {
        let (constant, mutable) = match tokens[0].kind {
            TokenKind::Const => (true, false),
            TokenKind::Mut => (false, true),
            _ => (false, false),
        };
        let rest = &tokens[1..];
        if !rest.first().is_some_and(|t| t.is(TokenKind::LParen)) {
            return self.declare_one(frame, rest, constant, mutable);
        }

        // var ( a = 1 \n b = 2 )
        let close = matching_close(rest, 0)?;
        if close + 1 != rest.len() {
            return Err(ScriptError::syntax("unexpected tokens after declaration group").at(&rest[close + 1].pos));
        }
        for line in split_statements(&rest[1..close])? {
            self.declare_one(frame, &line, constant, mutable)?;
        }
        Ok(())
    }

    /// `name`, `name = expr` or `name := expr`
    fn declare_one(&mut self, frame: &mut Frame, tokens: &[Token], constant: bool, mutable: bool) -> Result<()> {
        let name = expect_ident(tokens.first(), "variable name")?;
        let value = match tokens.get(1) {
            None if constant => {
                return Err(ScriptError::syntax(format!("constant '{}' needs a value", name.text)).at(&name.pos));
            }
            None => Value::None,
            Some(t) if matches!(t.kind, TokenKind::Assign | TokenKind::Define) => {
                if tokens.len() == 2 {
                    return Err(ScriptError::syntax("value is expected").at(&t.pos));
                }
                self.eval_expr(frame, &tokens[2..])?
            }
            Some(t) => {
                return Err(ScriptError::syntax(format!("unexpected '{}' in declaration", t.text)).at(&t.pos));
            }
        };
        frame
            .declare(Binding::new(&name.text, name.line(), value, constant, mutable))
            .map_err(|e| e.at(&name.pos))
    }

    fn exec_assignment(&mut self, frame: &mut Frame, target: &[Token], op: &Token, value: &[Token]) -> Result<()> {
        if target.is_empty() {
            return Err(ScriptError::syntax("assignment needs a target").at(&op.pos));
        }
        if value.is_empty() {
            return Err(ScriptError::syntax("value is expected").at(&op.pos));
        }
        let value = self.eval_expr(frame, value)?;
        let value = match op.kind.compound_operator() {
            Some(operator) => {
                let current = self.eval_expr(frame, target)?;
                arith::apply(operator, &current, &value, self.config.float_digits).map_err(|e| e.at(&op.pos))?
            }
            None => value,
        };
        self.store(frame, target, value)
    }

    /// Write `value` to a name, index or field target
    fn store(&mut self, frame: &mut Frame, target: &[Token], value: Value) -> Result<()> {
        if let [name] = target {
            let name = expect_ident(Some(name), "assignment target")?;
            return match frame.lookup(&name.text) {
                Some(Entry::Binding(binding)) => binding.set(value).map_err(|e| e.at(&name.pos)),
                Some(_) => Err(ScriptError::syntax(format!("'{}' cannot be assigned to", name.text)).at(&name.pos)),
                None => Err(ScriptError::undefined(&name.text, None).at(&name.pos)),
            };
        }

        let Some(at) = last_accessor(target) else {
            return Err(ScriptError::syntax("invalid assignment target").at(&target[0].pos));
        };
        let base = &target[..at];
        if target[at].is(TokenKind::Dot) {
            let field = expect_ident(target.get(at + 1), "field name")?;
            if at + 2 != target.len() {
                return Err(ScriptError::syntax("invalid assignment target").at(&field.pos));
            }
            return match self.eval_operand(frame, base)? {
                Value::StructIns(instance) => instance.set(&field.text, value),
                Value::ClassIns(instance) => instance.set(&field.text, value),
                other => Err(ScriptError::value(format!("cannot set field '{}' on {}", field.text, other.type_name()))),
            }
            .map_err(|e| e.at(&field.pos));
        }

        let close = matching_close(target, at)?;
        if close + 1 != target.len() {
            return Err(ScriptError::syntax("invalid assignment target").at(&target[at].pos));
        }
        let key = self.eval_expr(frame, &target[at + 1..close])?;
        let container = self.eval_operand(frame, base)?;
        match index::set(&container, &key, value).map_err(|e| e.at(&target[at].pos))? {
            // Strings are values: write the updated copy back
            Some(updated) => self.store(frame, base, updated),
            None => Ok(()),
        }
    }

    // ========================================================================
    // Functions and records
    // ========================================================================

    /// Build a script function defined in `frame`
    pub(crate) fn make_function(
        &self,
        frame: &Frame,
        name: &str,
        params: &[Token],
        statements: Vec<Vec<Token>>,
        line: usize,
    ) -> Result<Rc<Function>> {
        Ok(Rc::new(Function {
            name: name.to_string(),
            params: parse_params(params)?,
            body: Body::Block(Rc::from(statements)),
            line,
            protected: !is_public_name(name),
            module: Rc::downgrade(frame.module_scope()),
            captured: frame.capture(),
            receiver: None,
        }))
    }

    /// Parse `func name(params) { ... }` starting at `tokens[0]`
    fn function_parts<'a>(&self, frame: &Frame, tokens: &'a [Token]) -> Result<(Rc<Function>, &'a [Token])> {
        let name = expect_ident(tokens.get(1), "function name")?;
        if !tokens.get(2).is_some_and(|t| t.is(TokenKind::LParen)) {
            return Err(ScriptError::syntax("'(' is expected after the function name").at(&name.pos));
        }
        let close = matching_close(tokens, 2)?;
        let block = resolve_block(&tokens[close + 1..]).map_err(|e| e.at(&name.pos))?;
        let function = self.make_function(frame, &name.text, &tokens[3..close], block.statements, name.line())?;
        Ok((function, &tokens[close + 1 + block.end..]))
    }

    fn exec_function_decl<'a>(&mut self, frame: &mut Frame, tokens: &'a [Token], cursor: &mut Cursor<'a>) -> Result<()> {
        let (function, rest) = self.function_parts(frame, tokens)?;
        frame.declare_function(function)?;
        cursor.push_front(rest);
        Ok(())
    }

    /// `struct Name { a, b }`
    fn exec_struct(&mut self, frame: &mut Frame, tokens: &[Token]) -> Result<()> {
        let name = expect_ident(tokens.get(1), "struct name")?;
        let block = resolve_block(&tokens[2..]).map_err(|e| e.at(&name.pos))?;
        if 2 + block.end != tokens.len() {
            return Err(ScriptError::syntax("unexpected tokens after struct").at(&name.pos));
        }
        let mut fields: Vec<String> = Vec::new();
        for line in &block.statements {
            for part in split_top_level(line, TokenKind::Comma) {
                let field = expect_ident(part.first(), "field name")?;
                if part.len() != 1 {
                    return Err(ScriptError::syntax("struct fields are plain names").at(&field.pos));
                }
                if fields.contains(&field.text) {
                    return Err(ScriptError::syntax(format!("field '{}' is declared twice", field.text)).at(&field.pos));
                }
                fields.push(field.text.clone());
            }
        }
        let def = StructDef {
            name: name.text.clone(),
            fields,
            line: name.line(),
        };
        frame
            .declare(Binding::new(&name.text, name.line(), Value::StructDef(Rc::new(def)), true, false))
            .map_err(|e| e.at(&name.pos))
    }

    /// `class Name { var field = init  func method() { } }`
    fn exec_class(&mut self, frame: &mut Frame, tokens: &[Token]) -> Result<()> {
        let name = expect_ident(tokens.get(1), "class name")?;
        let block = resolve_block(&tokens[2..]).map_err(|e| e.at(&name.pos))?;
        if 2 + block.end != tokens.len() {
            return Err(ScriptError::syntax("unexpected tokens after class").at(&name.pos));
        }

        let mut fields: Vec<FieldDecl> = Vec::new();
        let mut methods: Vec<Rc<Function>> = Vec::new();
        for member in &block.statements {
            let first = &member[0];
            match first.kind {
                TokenKind::Var | TokenKind::Mut | TokenKind::Const => {
                    let field = expect_ident(member.get(1), "field name")?;
                    let init = match member.get(2) {
                        None => Vec::new(),
                        Some(t) if t.is(TokenKind::Assign) && member.len() > 3 => member[3..].to_vec(),
                        Some(t) => return Err(ScriptError::syntax("invalid field declaration").at(&t.pos)),
                    };
                    if fields.iter().any(|f| f.name == field.text) {
                        return Err(ScriptError::name(format!("field '{}' is declared twice", field.text)).at(&field.pos));
                    }
                    fields.push(FieldDecl {
                        name: field.text.clone(),
                        init,
                        constant: first.is(TokenKind::Const),
                        mutable: first.is(TokenKind::Mut),
                    });
                }
                TokenKind::Func => {
                    let (method, rest) = self.function_parts(frame, member)?;
                    if let Some(extra) = rest.first() {
                        return Err(ScriptError::syntax("unexpected tokens after method").at(&extra.pos));
                    }
                    if methods.iter().any(|m| m.name == method.name) {
                        return Err(ScriptError::name(format!("method '{}' is declared twice", method.name)).at(&first.pos));
                    }
                    methods.push(method);
                }
                _ => {
                    return Err(ScriptError::syntax("a class body holds only fields and methods").at(&first.pos));
                }
            }
        }

        let constructor = methods.iter().find(|m| m.name == name.text).cloned();
        let class = ClassDef {
            name: name.text.clone(),
            fields,
            methods,
            constructor,
            module: Rc::downgrade(frame.module_scope()),
            line: name.line(),
        };
        frame
            .declare(Binding::new(&name.text, name.line(), Value::ClassDef(Rc::new(class)), true, false))
            .map_err(|e| e.at(&name.pos))
    }

    /// `open name` or `open alias name`
    fn exec_open(&mut self, frame: &mut Frame, tokens: &[Token]) -> Result<()> {
        let (alias, name) = match &tokens[1..] {
            [name] => (name, name),
            [alias, name] => (alias, name),
            _ => return Err(ScriptError::syntax("expected 'open name' or 'open alias name'")),
        };
        let alias = expect_ident(Some(alias), "module alias")?;
        let name = expect_ident(Some(name), "module name")?;
        let scope = self.import(&name.text).map_err(|e| e.at(&name.pos))?;
        frame
            .declare_module(Rc::new(Module {
                name: alias.text.clone(),
                scope,
                line: alias.line(),
            }))
            .map_err(|e| e.at(&alias.pos))
    }

    /// `defer f(args)` / `go f(args)`
    fn exec_pending(&mut self, frame: &mut Frame, tokens: &[Token], mode: CallMode) -> Result<()> {
        let call = &tokens[1..];
        let Some(open) = trailing_call_open(call).filter(|&open| open > 0) else {
            return Err(ScriptError::syntax(format!("'{}' needs a function call", tokens[0].text)));
        };
        let callee = self.eval_operand(frame, &call[..open])?;
        self.invoke(frame, callee, &call[open + 1..call.len() - 1], &call[open].pos, mode)?;
        Ok(())
    }

    // ========================================================================
    // Control flow
    // ========================================================================

    fn exec_if<'a>(&mut self, frame: &mut Frame, tokens: &'a [Token], cursor: &mut Cursor<'a>) -> Result<Signal> {
        let mut tokens = tokens;
        let mut taken = false;
        let mut signal = Signal::None;

        loop {
            let (condition, block, end) = header_and_block(tokens)?;
            if condition.is_empty() {
                return Err(ScriptError::syntax("'if' needs a condition").at(&tokens[0].pos));
            }
            if !taken && self.eval_condition(frame, condition)? {
                taken = true;
                signal = self.exec_block(frame, &block.statements)?;
            }

            let Some(clause) = take_clause(&tokens[end..], cursor, TokenKind::Else) else {
                break;
            };
            if clause.get(1).is_some_and(|t| t.is(TokenKind::If)) {
                tokens = &clause[1..];
                continue;
            }
            let block = else_block(clause, cursor)?;
            if !taken {
                signal = self.exec_block(frame, &block.statements)?;
            }
            break;
        }
        Ok(signal)
    }

    fn exec_for<'a>(&mut self, frame: &mut Frame, tokens: &'a [Token], cursor: &mut Cursor<'a>) -> Result<Signal> {
        let (header, block, end) = header_and_block(tokens)?;
        let otherwise = match take_clause(&tokens[end..], cursor, TokenKind::Else) {
            Some(clause) => Some(else_block(clause, cursor)?),
            None => None,
        };

        let enumerable = find_top_level(header, |t| t.is(TokenKind::In)).filter(|&at| {
            at > 0 && header[..at].iter().all(|t| t.is(TokenKind::Ident) || t.is(TokenKind::Comma))
        });

        frame.loops += 1;
        let outcome = match enumerable {
            Some(at) => self.enumerable_loop(frame, &header[..at], &header[at + 1..], &block),
            None => self.conditional_loop(frame, header, &block),
        };
        frame.loops -= 1;

        let (ran, signal) = outcome?;
        if let Signal::Return(_) = signal {
            return Ok(signal);
        }
        match otherwise {
            Some(block) if !ran => self.exec_block(frame, &block.statements),
            _ => Ok(Signal::None),
        }
    }

    /// `for cond { }` or `for { }`; returns whether the body ran
    fn conditional_loop(&mut self, frame: &mut Frame, condition: &[Token], block: &Block) -> Result<(bool, Signal)> {
        let mut ran = false;
        loop {
            if !condition.is_empty() && !self.eval_condition(frame, condition)? {
                break;
            }
            ran = true;
            match self.exec_block(frame, &block.statements)? {
                Signal::Break => break,
                signal @ Signal::Return(_) => return Ok((ran, signal)),
                Signal::None | Signal::Continue => {}
            }
        }
        Ok((ran, Signal::None))
    }

    /// `for i, e in source { }` over a snapshot of the source
    fn enumerable_loop(
        &mut self,
        frame: &mut Frame,
        names: &[Token],
        source: &[Token],
        block: &Block,
    ) -> Result<(bool, Signal)> {
        let (first, second) = loop_names(names)?;
        if source.is_empty() {
            return Err(ScriptError::syntax("'in' needs something to iterate"));
        }
        let items = super::expr::enumerate(&self.eval_expr(frame, source)?)?;
        let ran = !items.is_empty();

        for (key, element) in items {
            let mark = frame.enter_block();
            let result = self.loop_iteration(frame, first, second, key, element, block);
            frame.exit_block(mark);
            match result? {
                Signal::Break => break,
                signal @ Signal::Return(_) => return Ok((ran, signal)),
                Signal::None | Signal::Continue => {}
            }
        }
        Ok((ran, Signal::None))
    }

    fn loop_iteration(
        &mut self,
        frame: &mut Frame,
        first: Option<&Token>,
        second: Option<&Token>,
        key: Value,
        element: Value,
        block: &Block,
    ) -> Result<Signal> {
        for (name, value) in [(first, key), (second, element)] {
            if let Some(name) = name {
                frame.declare(Binding::new(&name.text, name.line(), value, false, true))?;
            }
        }
        self.exec_sequence(frame, &block.statements)
    }

    /// `try { } catch name { }`
    fn exec_try<'a>(&mut self, frame: &mut Frame, tokens: &'a [Token], cursor: &mut Cursor<'a>) -> Result<Signal> {
        let block = resolve_block(&tokens[1..]).map_err(|e| e.at(&tokens[0].pos))?;
        let handler = match take_clause(&tokens[1 + block.end..], cursor, TokenKind::Catch) {
            Some(clause) => {
                let (names, handler, end) = header_and_block(clause)?;
                let name = match names {
                    [] => None,
                    [name] => Some(expect_ident(Some(name), "error name")?),
                    [_, extra, ..] => {
                        return Err(ScriptError::syntax("catch binds a single name").at(&extra.pos));
                    }
                };
                cursor.push_front(&clause[end..]);
                Some((name, handler))
            }
            None => None,
        };

        let mark = frame.mark();
        let loops = frame.loops;
        let deferred = self.deferred.len();

        let error = match self.exec_block(frame, &block.statements) {
            Ok(signal) => return Ok(signal),
            Err(error) => error,
        };
        debug!(error = %error, "caught error");
        self.run_deferred(deferred, Some(&error))?;
        frame.truncate(mark);
        frame.loops = loops;

        let Some((name, handler)) = handler else {
            return Ok(Signal::None);
        };
        let mark = frame.enter_block();
        let result = match name {
            Some(name) => frame
                .declare(Binding::new(&name.text, name.line(), Value::str(error.message()), false, false))
                .and_then(|()| self.exec_sequence(frame, &handler.statements)),
            None => self.exec_sequence(frame, &handler.statements),
        };
        frame.exit_block(mark);
        result
    }
}
