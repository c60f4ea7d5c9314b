//! Function call engine

use super::eval::{Engine, STACK_GROW_SIZE, STACK_RED_ZONE, Signal};
use super::expr::ANONYMOUS;
use super::function::{Body, DefaultArg, Function, NativeCall, Param, bind_arguments};
use super::record::{ClassDef, ClassInstance, Field, StructInstance};
use super::scope::{Binding, Frame};
use super::value::Value;
use crate::error::{Result, ScriptError};
use crate::lexer::{Position, Token};
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// When a call runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Immediately
    Now,
    /// When the owning function call (or the program) completes
    Deferred,
    /// At the next top-level statement boundary. A call queued inside a
    /// long-running function waits until that top-level statement returns.
    Detached,
}

/// Call with arguments already bound, waiting to run
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub function: Rc<Function>,
    pub slots: Vec<Option<Value>>,
    pub pos: Position,
}

impl Engine {
    /// Call `callee` with the argument tokens between its parentheses
    pub(crate) fn call_value(
        &mut self,
        frame: &mut Frame,
        callee: Value,
        args: &[Token],
        pos: &Position,
    ) -> Result<Value> {
        match callee {
            Value::StructDef(def) => {
                let params: Vec<Param> = def
                    .fields
                    .iter()
                    .map(|field| Param::optional(field, Value::None))
                    .collect();
                let args = self.eval_args(frame, args)?;
                let slots = bind_arguments(&def.name, &params, args).map_err(|e| e.at(pos))?;
                let values = slots.into_iter().map(|slot| slot.unwrap_or(Value::None)).collect();
                Ok(Value::StructIns(Rc::new(StructInstance::new(def, values))))
            }
            Value::ClassDef(class) => self.instantiate(frame, class, args, pos),
            callee => self.invoke(frame, callee, args, pos, CallMode::Now),
        }
    }

    /// Bind arguments and run, defer or detach the call
    pub(crate) fn invoke(
        &mut self,
        frame: &mut Frame,
        callee: Value,
        args: &[Token],
        pos: &Position,
        mode: CallMode,
    ) -> Result<Value> {
        let Value::Func(function) = callee else {
            return Err(ScriptError::value(format!("{} is not callable", callee.type_name())).at(pos));
        };
        let args = self.eval_args(frame, args)?;
        let slots = bind_arguments(&function.name, &function.params, args).map_err(|e| e.at(pos))?;
        let call = PendingCall {
            function,
            slots,
            pos: pos.clone(),
        };
        match mode {
            CallMode::Now => self.call_function(&call.function, call.slots, &call.pos),
            CallMode::Deferred => {
                debug!(function = %call.function.name, "deferring call");
                self.deferred.push(call);
                Ok(Value::None)
            }
            CallMode::Detached => {
                debug!(function = %call.function.name, "detaching call");
                self.detached.push_back(call);
                Ok(Value::None)
            }
        }
    }

    /// Call a function with bound slots, with automatic stack growth
    pub(crate) fn call_function(
        &mut self,
        function: &Rc<Function>,
        slots: Vec<Option<Value>>,
        pos: &Position,
    ) -> Result<Value> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.call_function_inner(function, slots, pos)
        })
    }

    fn call_function_inner(
        &mut self,
        function: &Rc<Function>,
        slots: Vec<Option<Value>>,
        pos: &Position,
    ) -> Result<Value> {
        trace!(function = %function.name, depth = self.call_depth, "call");
        if self.call_depth >= self.config.max_call_depth {
            return Err(ScriptError::stack_overflow(self.config.max_call_depth).at(pos));
        }

        let statements = match &function.body {
            Body::Native(native) => {
                // Natives bypass frame creation
                let args = slots
                    .into_iter()
                    .zip(function.params.iter())
                    .map(|(slot, param)| match (slot, &param.default) {
                        (Some(value), _) => value,
                        (None, Some(DefaultArg::Value(value))) => value.clone(),
                        _ => Value::None,
                    })
                    .collect();
                let mut call = NativeCall {
                    args,
                    this: function.receiver.as_ref(),
                    out: &mut *self.out,
                };
                return native(&mut call).map_err(|e| e.at(pos));
            }
            Body::Block(statements) => statements.clone(),
        };

        let module = function.module.upgrade().ok_or_else(|| {
            ScriptError::memory(format!("module of {} is no longer loaded", function.name))
        })?;
        let mut frame = Frame::call(module, function.captured.as_deref());

        self.call_depth += 1;
        let deferred = self.deferred.len();
        let result = self.run_body(&mut frame, function, slots, &statements);
        let cleanup = self.run_deferred(deferred, result.as_ref().err());
        self.call_depth -= 1;

        let value = result?;
        cleanup?;
        Ok(value)
    }

    fn run_body(
        &mut self,
        frame: &mut Frame,
        function: &Rc<Function>,
        slots: Vec<Option<Value>>,
        statements: &[Vec<Token>],
    ) -> Result<Value> {
        if let Some(receiver) = &function.receiver {
            frame.declare(Binding::new("this", function.line, receiver.clone(), false, true))?;
        }
        for (param, slot) in function.params.iter().zip(slots) {
            let value = match (slot, &param.default) {
                (Some(value), _) => value,
                (None, Some(DefaultArg::Value(value))) => value.clone(),
                (None, Some(DefaultArg::Expr(tokens))) => self.eval_expr(frame, tokens)?,
                (None, None) => Value::None,
            };
            // Arguments share aggregates with the caller
            frame.declare(Binding::new(&param.name, function.line, value, false, true))?;
        }
        // Nested functions are not in their own captured scope; make
        // them visible to themselves for recursion
        if function.name != ANONYMOUS && frame.lookup(&function.name).is_none() {
            frame.declare_function(function.clone())?;
        }

        match self.exec_sequence(frame, statements)? {
            Signal::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    /// Create a class instance: field initializers, then the constructor
    fn instantiate(
        &mut self,
        frame: &mut Frame,
        class: Rc<ClassDef>,
        args: &[Token],
        pos: &Position,
    ) -> Result<Value> {
        let module = class.module.upgrade().ok_or_else(|| {
            ScriptError::memory(format!("module of class {} is no longer loaded", class.name))
        })?;
        let mut init = Frame::call(module, None);
        let mut fields = Vec::with_capacity(class.fields.len());
        for decl in &class.fields {
            let value = if decl.init.is_empty() {
                Value::None
            } else {
                self.eval_expr(&mut init, &decl.init)?
            };
            fields.push(Field {
                name: decl.name.clone(),
                value: if decl.mutable { value } else { value.deep_clone() },
                constant: decl.constant,
            });
        }

        let instance = Value::ClassIns(Rc::new(ClassInstance::new(class.clone(), fields)));
        match &class.constructor {
            Some(constructor) => {
                let bound = constructor.bind(instance.clone());
                self.invoke(frame, Value::Func(bound), args, pos, CallMode::Now)?;
            }
            None if !args.is_empty() => {
                return Err(ScriptError::syntax(format!(
                    "class {} has no constructor and takes no arguments",
                    class.name
                ))
                .at(pos));
            }
            None => {}
        }
        Ok(instance)
    }

    /// Run deferred calls pushed since `mark`, last first.
    ///
    /// With `failing` set an error is already propagating; further errors
    /// are logged and dropped. Otherwise the first error is returned after
    /// every call has run.
    pub(crate) fn run_deferred(&mut self, mark: usize, failing: Option<&ScriptError>) -> Result<()> {
        if mark >= self.deferred.len() {
            return Ok(());
        }
        let pending: Vec<PendingCall> = self.deferred.drain(mark..).collect();
        debug!(count = pending.len(), "running deferred calls");

        let mut first_error = None;
        for call in pending.into_iter().rev() {
            if let Err(error) = self.call_function(&call.function, call.slots, &call.pos) {
                if failing.is_some() || first_error.is_some() {
                    warn!(function = %call.function.name, error = %error, "deferred call failed during unwind");
                } else {
                    first_error = Some(error);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Run queued detached calls
    pub(crate) fn drain_detached(&mut self) -> Result<()> {
        while let Some(call) = self.detached.pop_front() {
            debug!(function = %call.function.name, "running detached call");
            self.call_function(&call.function, call.slots, &call.pos)?;
        }
        Ok(())
    }
}
