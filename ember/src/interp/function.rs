//! Functions, parameters and argument binding

use super::scope::{Entries, ModuleScope, is_public_name};
use super::value::Value;
use crate::block::split_top_level;
use crate::error::{Result, ScriptError};
use crate::lexer::{Token, TokenKind};
use std::io::Write;
use std::rc::{Rc, Weak};

/// Native function signature
pub type NativeFn = fn(&mut NativeCall<'_>) -> Result<Value>;

/// Arguments handed to a native function, already bound in parameter order
pub struct NativeCall<'a> {
    pub args: Vec<Value>,
    /// Receiver for native methods (`"abc".upper()`)
    pub this: Option<&'a Value>,
    pub out: &'a mut dyn Write,
}

impl NativeCall<'_> {
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::None)
    }

    pub fn receiver(&self) -> Result<&Value> {
        self.this
            .ok_or_else(|| ScriptError::plain("method is called without a receiver"))
    }
}

/// Default of an optional parameter
#[derive(Debug, Clone)]
pub enum DefaultArg {
    /// Fixed value, used by natives
    Value(Value),
    /// Expression evaluated in the callee frame at call time
    Expr(Rc<[Token]>),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<DefaultArg>,
    pub variadic: bool,
}

impl Param {
    pub fn required(name: &str) -> Self {
        Param {
            name: name.to_string(),
            default: None,
            variadic: false,
        }
    }

    pub fn optional(name: &str, default: Value) -> Self {
        Param {
            name: name.to_string(),
            default: Some(DefaultArg::Value(default)),
            variadic: false,
        }
    }

    pub fn variadic(name: &str) -> Self {
        Param {
            name: name.to_string(),
            default: None,
            variadic: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Body {
    Block(Rc<[Vec<Token>]>),
    Native(NativeFn),
}

/// Script or native function
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Body,
    pub line: usize,
    pub protected: bool,
    /// Module whose persistent scope the body resolves against
    pub module: Weak<ModuleScope>,
    /// Persistent bindings of the defining function frame, for closures
    pub captured: Option<Rc<Entries>>,
    /// Bound `this` / method receiver
    pub receiver: Option<Value>,
}

impl Function {
    pub fn native(name: &str, params: Vec<Param>, f: NativeFn) -> Self {
        Function {
            name: name.to_string(),
            params,
            body: Body::Native(f),
            line: 0,
            protected: !is_public_name(name),
            module: Weak::new(),
            captured: None,
            receiver: None,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.body, Body::Native(_))
    }

    /// Copy of this function bound to a receiver
    pub fn bind(&self, receiver: Value) -> Rc<Function> {
        Rc::new(Function {
            receiver: Some(receiver),
            ..self.clone()
        })
    }
}

/// Parse a parameter list (the tokens between the parentheses)
pub fn parse_params(tokens: &[Token]) -> Result<Vec<Param>> {
    let mut params: Vec<Param> = Vec::new();

    for part in split_top_level(tokens, TokenKind::Comma) {
        let (variadic, rest) = match part.first() {
            Some(t) if t.is(TokenKind::Ellipsis) => (true, &part[1..]),
            _ => (false, part),
        };
        let Some(name) = rest.first() else {
            return Err(ScriptError::syntax("parameter name is expected"));
        };
        if name.kind != TokenKind::Ident {
            return Err(
                ScriptError::syntax(format!("invalid parameter name: {}", name.text)).at(&name.pos)
            );
        }
        if params.iter().any(|p| p.name == name.text) {
            return Err(
                ScriptError::syntax(format!("parameter '{}' is declared twice", name.text))
                    .at(&name.pos),
            );
        }
        if params.last().is_some_and(|p| p.variadic) {
            return Err(ScriptError::syntax("variadic parameter must be the last one").at(&name.pos));
        }

        let default = match rest.get(1) {
            None => None,
            Some(t) if t.is(TokenKind::Assign) && rest.len() > 2 => {
                Some(DefaultArg::Expr(Rc::from(rest[2..].to_vec())))
            }
            Some(t) => {
                return Err(ScriptError::syntax("invalid parameter declaration").at(&t.pos));
            }
        };
        if default.is_none() && !variadic && params.iter().any(|p| p.default.is_some()) {
            return Err(ScriptError::syntax(format!(
                "parameter '{}' needs a default: parameters after a default must have defaults",
                name.text
            ))
            .at(&name.pos));
        }

        params.push(Param {
            name: name.text.clone(),
            default,
            variadic,
        });
    }
    Ok(params)
}

/// Evaluated call-site argument
#[derive(Debug, Clone)]
pub enum Arg {
    Positional(Value),
    /// `xs...`
    Spread(Value),
    Keyword(String, Value),
}

fn spread_items(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::List(list) => Ok(list.borrow().clone()),
        other => Err(ScriptError::value(format!(
            "only a list can be spread, not {}",
            other.type_name()
        ))),
    }
}

/// Bind arguments to parameter slots.
///
/// Unfilled slots are left `None` only for parameters with a default; the
/// caller evaluates those. Variadic parameters always come back filled.
pub fn bind_arguments(name: &str, params: &[Param], args: Vec<Arg>) -> Result<Vec<Option<Value>>> {
    let mut slots: Vec<Option<Value>> = vec![None; params.len()];
    let mut next = 0;
    let mut keyword_seen = false;
    let mut args = args.into_iter().peekable();

    while let Some(arg) = args.next() {
        let (value, spread) = match arg {
            Arg::Keyword(key, value) => {
                keyword_seen = true;
                let index = params.iter().position(|p| p.name == key).ok_or_else(|| {
                    ScriptError::name(format!("{name} has no parameter named '{key}'"))
                })?;
                if slots[index].is_some() {
                    return Err(ScriptError::syntax(format!(
                        "parameter '{key}' of {name} is given more than once"
                    )));
                }
                slots[index] = Some(if params[index].variadic {
                    match value {
                        list @ Value::List(_) => list,
                        single => Value::list(vec![single]),
                    }
                } else {
                    value
                });
                continue;
            }
            Arg::Positional(value) => (value, false),
            Arg::Spread(value) => (value, true),
        };

        if keyword_seen {
            return Err(ScriptError::syntax(format!(
                "positional argument follows a keyword argument in call to {name}"
            )));
        }
        let Some(param) = params.get(next) else {
            return Err(ScriptError::syntax(format!(
                "too many arguments: {name} takes {}",
                params.len()
            )));
        };

        if param.variadic {
            let mut items = Vec::new();
            if spread {
                items.extend(spread_items(value)?);
            } else {
                items.push(value);
            }
            while let Some(Arg::Positional(_) | Arg::Spread(_)) = args.peek() {
                match args.next() {
                    Some(Arg::Spread(value)) => items.extend(spread_items(value)?),
                    Some(Arg::Positional(value)) => items.push(value),
                    _ => {}
                }
            }
            slots[next] = Some(Value::list(items));
        } else if spread {
            return Err(ScriptError::value(format!(
                "spread argument needs a variadic parameter, '{}' is not",
                param.name
            )));
        } else {
            slots[next] = Some(value);
        }
        next += 1;
    }

    let missing: Vec<String> = params
        .iter()
        .zip(slots.iter())
        .filter(|(p, slot)| slot.is_none() && p.default.is_none() && !p.variadic)
        .map(|(p, _)| format!("'{}'", p.name))
        .collect();
    if !missing.is_empty() {
        return Err(ScriptError::plain(format!(
            "required arguments of {name} are not given: {}",
            missing.join(", ")
        )));
    }

    for (param, slot) in params.iter().zip(slots.iter_mut()) {
        if param.variadic && slot.is_none() && param.default.is_none() {
            *slot = Some(Value::list(Vec::new()));
        }
    }
    Ok(slots)
}
