//! Tree-walking interpreter for Ember
//!
//! Statements arrive as token vectors from the lexer and are evaluated
//! directly; there is no AST. [`Interpreter`] owns the evaluation context
//! ([`Engine`]) and the top-level frame of the main module.

mod arith;
mod builtins;
mod call;
mod compare;
mod eval;
mod expr;
pub mod function;
mod index;
mod methods;
mod module;
pub mod number;
pub mod record;
pub mod scope;
pub mod value;

pub use builtins::positional_params;
pub use call::CallMode;
pub use eval::{Engine, Signal};
pub use function::{Function, NativeCall, NativeFn, Param};
pub use module::{FileLoader, MemoryLoader, ModuleLoader, ModuleSource};
pub use scope::{Entry, Frame, ModuleScope};
pub use value::{Kind, Value};

use crate::block::Cursor;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::lexer::{Token, tokenize};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// Name of the module the interpreter evaluates into
pub const MAIN_MODULE: &str = "main";

/// Interpreter facade: engine plus the main module's frame
pub struct Interpreter {
    engine: Engine,
    frame: Frame,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Default configuration, modules from the working directory
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let loader = FileLoader::from_config(&config);
        Self::with_loader(config, Box::new(loader))
    }

    pub fn with_loader(config: EngineConfig, loader: Box<dyn ModuleLoader>) -> Self {
        let mut engine = Engine::new(config, loader, Box::new(std::io::stdout()));
        engine.natives = builtins::defaults();
        let scope = ModuleScope::new(MAIN_MODULE, &engine.natives);
        Interpreter {
            engine,
            frame: Frame::module(scope),
        }
    }

    /// Send program output somewhere other than stdout
    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.engine.out = Box::new(out);
        self
    }

    /// Register a native taking `arity` positional arguments
    pub fn register_native(&mut self, name: &str, arity: usize, f: NativeFn) -> Result<()> {
        self.register_native_with(name, positional_params(arity), f)
    }

    /// Register a native with explicit parameters.
    ///
    /// The native is visible in the main module and in every module loaded
    /// afterwards.
    pub fn register_native_with(&mut self, name: &str, params: Vec<Param>, f: NativeFn) -> Result<()> {
        let function = Rc::new(Function::native(name, params, f));
        self.engine.natives.push(function.clone());
        self.frame.declare_function(function)
    }

    /// Run a sequence of top-level statements.
    ///
    /// If an error escapes, program-level deferred calls run before it is
    /// returned. On success they wait for [`Interpreter::finish`].
    pub fn evaluate_program(&mut self, statements: &[Vec<Token>]) -> Result<Signal> {
        let result = self.engine.exec_top_level(&mut self.frame, statements);
        if let Err(error) = &result {
            self.engine.run_deferred(0, Some(error))?;
        }
        result
    }

    /// Run one statement, as the REPL does
    pub fn evaluate_statement(&mut self, tokens: &[Token]) -> Result<Signal> {
        let mut cursor = Cursor::single(tokens);
        let mut signal = Signal::None;
        while let Some(statement) = cursor.next() {
            let result = self.engine.exec_statement(&mut self.frame, statement, &mut cursor);
            self.frame.loops = 0;
            signal = result?;
            self.engine.drain_detached()?;
            if signal != Signal::None {
                break;
            }
        }
        Ok(signal)
    }

    /// Tokenize and run a whole source text
    pub fn run_source(&mut self, file: &str, source: &str) -> Result<Signal> {
        let statements = tokenize(file, source)?;
        self.evaluate_program(&statements)
    }

    pub fn import_module(&mut self, name: &str) -> Result<Rc<ModuleScope>> {
        self.engine.import(name)
    }

    /// Bindings currently in the main frame
    pub fn binding_count(&self) -> usize {
        self.frame.binding_count()
    }

    /// Current value of a binding or function in the main frame
    pub fn lookup(&self, name: &str) -> Option<Value> {
        match self.frame.lookup(name)? {
            Entry::Binding(binding) => Some(binding.get()),
            Entry::Function(function) => Some(Value::Func(function)),
            Entry::Module(_) => None,
        }
    }

    /// Value of the last expression statement, if not taken yet
    pub fn take_last_value(&mut self) -> Option<Value> {
        self.engine.last_value.take()
    }

    /// Run program-level deferred calls and any detached calls still queued
    pub fn finish(&mut self) -> Result<()> {
        let deferred = self.engine.run_deferred(0, None);
        self.engine.drain_detached()?;
        deferred
    }
}

/// Cloneable in-memory output sink
#[derive(Debug, Clone, Default)]
pub struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl SharedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn interpreter() -> (Interpreter, SharedOutput) {
        let out = SharedOutput::new();
        let interp = Interpreter::with_loader(EngineConfig::default(), Box::new(MemoryLoader::new()))
            .with_output(out.clone());
        (interp, out)
    }

    fn double(call: &mut NativeCall<'_>) -> Result<Value> {
        let n = call.arg(0).as_index()?;
        Ok(Value::int(n * 2))
    }

    #[test]
    fn test_run_source_and_lookup() {
        let (mut interp, out) = interpreter();
        interp.run_source("t", "x := 2 + 3\nprintln(x)").unwrap();
        assert_eq!(interp.lookup("x"), Some(Value::int(5)));
        assert_eq!(out.contents(), "5\n");
    }

    #[test]
    fn test_register_native() {
        let (mut interp, _) = interpreter();
        interp.register_native("double", 1, double).unwrap();
        interp.run_source("t", "y := double(21)").unwrap();
        assert_eq!(interp.lookup("y"), Some(Value::int(42)));
    }

    #[test]
    fn test_native_reaches_modules_loaded_later() {
        let loader = MemoryLoader::new().with("m", "Y := double(4)");
        let mut interp = Interpreter::with_loader(EngineConfig::default(), Box::new(loader));
        interp.register_native("double", 1, double).unwrap();
        interp.run_source("t", "open m\nz := m.Y").unwrap();
        assert_eq!(interp.lookup("z"), Some(Value::int(8)));
    }

    #[test]
    fn test_evaluate_statement_records_last_value() {
        let (mut interp, _) = interpreter();
        let statements = tokenize("repl", "1 + 1").unwrap();
        interp.evaluate_statement(&statements[0]).unwrap();
        assert_eq!(interp.take_last_value(), Some(Value::int(2)));
        assert_eq!(interp.take_last_value(), None);
    }

    #[test]
    fn test_repl_error_keeps_state() {
        let (mut interp, _) = interpreter();
        for line in ["a := 1", "a := 2", "b := a + 1"] {
            let statements = tokenize("repl", line).unwrap();
            let _ = interp.evaluate_statement(&statements[0]);
        }
        assert_eq!(interp.lookup("b"), Some(Value::int(2)));
        let statements = tokenize("repl", "missing + 1").unwrap();
        let err = interp.evaluate_statement(&statements[0]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Name);
    }

    #[test]
    fn test_finish_runs_program_defers() {
        let (mut interp, out) = interpreter();
        interp.run_source("t", "defer println(1)\ndefer println(2)").unwrap();
        assert_eq!(out.contents(), "");
        interp.finish().unwrap();
        assert_eq!(out.contents(), "2\n1\n");
    }
}
