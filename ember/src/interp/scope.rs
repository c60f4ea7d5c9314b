//! Scope frames
//!
//! A frame is an append-only arena of bindings, functions and imported
//! modules. Entering a block records a [`Mark`]; leaving it truncates every
//! list back to that mark, whatever the exit path. Declarations made at
//! block depth zero extend the frame's persistent prefix; for module frames
//! they are also published to the shared [`ModuleScope`], which is what
//! functions declared in that module resolve against when they are called.

use super::function::Function;
use super::value::Value;
use crate::error::{Result, ScriptError};
use std::cell::RefCell;
use std::rc::Rc;

/// Names starting with an uppercase letter are visible to other modules
pub fn is_public_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Named variable
#[derive(Debug)]
pub struct Binding {
    pub name: String,
    pub line: usize,
    value: RefCell<Value>,
    pub constant: bool,
    /// `mut` bindings alias aggregates instead of copying them
    pub mutable: bool,
}

impl Binding {
    pub fn new(name: &str, line: usize, value: Value, constant: bool, mutable: bool) -> Rc<Self> {
        let value = if mutable { value } else { value.deep_clone() };
        Rc::new(Binding {
            name: name.to_string(),
            line,
            value: RefCell::new(value),
            constant,
            mutable,
        })
    }

    pub fn get(&self) -> Value {
        self.value.borrow().clone()
    }

    /// Rebind; constants refuse
    pub fn set(&self, value: Value) -> Result<()> {
        if self.constant {
            return Err(ScriptError::syntax(format!(
                "'{}' is constant and cannot be changed",
                self.name
            )));
        }
        *self.value.borrow_mut() = if self.mutable {
            value
        } else {
            value.deep_clone()
        };
        Ok(())
    }

    pub fn is_public(&self) -> bool {
        is_public_name(&self.name)
    }
}

/// Imported module reference
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub scope: Rc<ModuleScope>,
    pub line: usize,
}

impl Module {
    /// Public member lookup across the module boundary
    pub fn member(&self, name: &str) -> Result<Entry> {
        if !is_public_name(name) {
            return Err(ScriptError::name(format!(
                "'{name}' is private to module {}",
                self.name
            )));
        }
        self.scope.lookup(name).ok_or_else(|| {
            ScriptError::name(format!("module {} has no member '{name}'", self.name))
        })
    }
}

/// Result of a name lookup
#[derive(Debug, Clone)]
pub enum Entry {
    Binding(Rc<Binding>),
    Function(Rc<Function>),
    Module(Rc<Module>),
}

/// Boundary between entries of a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mark {
    pub bindings: usize,
    pub functions: usize,
    pub modules: usize,
}

/// The three entry lists of a frame
#[derive(Debug, Clone, Default)]
pub struct Entries {
    pub bindings: Vec<Rc<Binding>>,
    pub functions: Vec<Rc<Function>>,
    pub modules: Vec<Rc<Module>>,
}

impl Entries {
    pub fn mark(&self) -> Mark {
        Mark {
            bindings: self.bindings.len(),
            functions: self.functions.len(),
            modules: self.modules.len(),
        }
    }

    pub fn truncate(&mut self, mark: Mark) {
        self.bindings.truncate(mark.bindings);
        self.functions.truncate(mark.functions);
        self.modules.truncate(mark.modules);
    }

    /// Entries up to `mark`
    pub fn prefix(&self, mark: Mark) -> Entries {
        Entries {
            bindings: self.bindings[..mark.bindings].to_vec(),
            functions: self.functions[..mark.functions].to_vec(),
            modules: self.modules[..mark.modules].to_vec(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Entry> {
        if let Some(b) = self.bindings.iter().rev().find(|b| b.name == name) {
            return Some(Entry::Binding(b.clone()));
        }
        if let Some(f) = self.functions.iter().rev().find(|f| f.name == name) {
            return Some(Entry::Function(f.clone()));
        }
        self.modules
            .iter()
            .rev()
            .find(|m| m.name == name)
            .map(|m| Entry::Module(m.clone()))
    }

    /// Declaration line of `name`, if defined here
    pub fn defined_line(&self, name: &str) -> Option<usize> {
        self.lookup(name).map(|entry| match entry {
            Entry::Binding(b) => b.line,
            Entry::Function(f) => f.line,
            Entry::Module(m) => m.line,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings
            .iter()
            .map(|b| b.name.as_str())
            .chain(self.functions.iter().map(|f| f.name.as_str()))
            .chain(self.modules.iter().map(|m| m.name.as_str()))
    }
}

/// Persistent definitions of one module, shared with its functions
#[derive(Debug)]
pub struct ModuleScope {
    pub name: String,
    entries: RefCell<Entries>,
}

impl ModuleScope {
    pub fn new(name: &str, natives: &[Rc<Function>]) -> Rc<Self> {
        Rc::new(ModuleScope {
            name: name.to_string(),
            entries: RefCell::new(Entries {
                functions: natives.to_vec(),
                ..Entries::default()
            }),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Entry> {
        self.entries.borrow().lookup(name)
    }

    pub fn snapshot(&self) -> Entries {
        self.entries.borrow().clone()
    }

    fn publish(&self, entry: Entry) {
        let mut entries = self.entries.borrow_mut();
        match entry {
            Entry::Binding(b) => entries.bindings.push(b),
            Entry::Function(f) => entries.functions.push(f),
            Entry::Module(m) => entries.modules.push(m),
        }
    }

    pub fn binding_count(&self) -> usize {
        self.entries.borrow().bindings.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Module,
    Function,
}

/// Evaluation frame
#[derive(Debug)]
pub struct Frame {
    entries: Entries,
    persistent: Mark,
    module: Rc<ModuleScope>,
    kind: FrameKind,
    depth: usize,
    /// Enclosing loops within this frame
    pub loops: usize,
}

impl Frame {
    /// Top-level frame of a module
    pub fn module(scope: Rc<ModuleScope>) -> Self {
        let entries = scope.snapshot();
        Frame {
            persistent: entries.mark(),
            entries,
            module: scope,
            kind: FrameKind::Module,
            depth: 0,
            loops: 0,
        }
    }

    /// Fresh callee frame: captured closure entries plus the module scope
    pub fn call(module: Rc<ModuleScope>, captured: Option<&Entries>) -> Self {
        let entries = captured.cloned().unwrap_or_default();
        Frame {
            persistent: entries.mark(),
            entries,
            module,
            kind: FrameKind::Function,
            depth: 0,
            loops: 0,
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn module_scope(&self) -> &Rc<ModuleScope> {
        &self.module
    }

    pub fn mark(&self) -> Mark {
        self.entries.mark()
    }

    pub fn persistent_mark(&self) -> Mark {
        self.persistent
    }

    pub fn binding_count(&self) -> usize {
        self.entries.bindings.len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn enter_block(&mut self) -> Mark {
        self.depth += 1;
        self.mark()
    }

    pub fn exit_block(&mut self, mark: Mark) {
        self.truncate(mark);
        self.depth = self.depth.saturating_sub(1);
    }

    /// O(1) per list: drop everything declared after `mark`
    pub fn truncate(&mut self, mark: Mark) {
        self.entries.truncate(mark);
    }

    /// Closure capture: the persistent prefix of function frames
    pub fn capture(&self) -> Option<Rc<Entries>> {
        match self.kind {
            FrameKind::Module => None,
            FrameKind::Function => Some(Rc::new(self.entries.prefix(self.persistent))),
        }
    }

    fn check_unique(&self, name: &str) -> Result<()> {
        if let Some(line) = self.entries.defined_line(name) {
            return Err(ScriptError::name(format!(
                "'{name}' is already defined at line {line}"
            )));
        }
        Ok(())
    }

    fn declared(&mut self, entry: Entry) {
        if self.depth == 0 {
            self.persistent = self.entries.mark();
            if self.kind == FrameKind::Module {
                self.module.publish(entry);
            }
        }
    }

    pub fn declare(&mut self, binding: Rc<Binding>) -> Result<()> {
        self.check_unique(&binding.name)?;
        self.entries.bindings.push(binding.clone());
        self.declared(Entry::Binding(binding));
        Ok(())
    }

    pub fn declare_function(&mut self, function: Rc<Function>) -> Result<()> {
        self.check_unique(&function.name)?;
        self.entries.functions.push(function.clone());
        self.declared(Entry::Function(function));
        Ok(())
    }

    pub fn declare_module(&mut self, module: Rc<Module>) -> Result<()> {
        self.check_unique(&module.name)?;
        self.entries.modules.push(module.clone());
        self.declared(Entry::Module(module));
        Ok(())
    }

    /// Frame entries first, then the module's persistent scope
    pub fn lookup(&self, name: &str) -> Option<Entry> {
        self.entries
            .lookup(name)
            .or_else(|| self.module.lookup(name))
    }

    /// Visible names, for "did you mean" hints
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.names().map(str::to_string).collect();
        names.extend(self.module.snapshot().names().map(str::to_string));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn binding(name: &str) -> Rc<Binding> {
        Binding::new(name, 1, Value::int(1), false, false)
    }

    fn module_frame() -> Frame {
        Frame::module(ModuleScope::new("main", &[]))
    }

    #[test]
    fn test_block_truncates_to_mark() {
        let mut frame = module_frame();
        frame.declare(binding("a")).unwrap();
        let mark = frame.enter_block();
        frame.declare(binding("b")).unwrap();
        frame.declare(binding("c")).unwrap();
        assert_eq!(frame.binding_count(), 3);
        frame.exit_block(mark);
        assert_eq!(frame.binding_count(), 1);
        assert!(frame.lookup("b").is_none());
    }

    #[test]
    fn test_depth_zero_declarations_are_published() {
        let scope = ModuleScope::new("main", &[]);
        let mut frame = Frame::module(scope.clone());
        frame.declare(binding("a")).unwrap();
        let mark = frame.enter_block();
        frame.declare(binding("tmp")).unwrap();
        assert_eq!(scope.binding_count(), 1);
        frame.exit_block(mark);
        assert_eq!(frame.persistent_mark().bindings, 1);
    }

    #[test]
    fn test_redeclaration_is_name_error() {
        let mut frame = module_frame();
        frame.declare(binding("a")).unwrap();
        let err = frame.declare(binding("a")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Name);
    }

    #[test]
    fn test_callee_frame_sees_module_not_caller_temporaries() {
        let scope = ModuleScope::new("main", &[]);
        let mut caller = Frame::module(scope.clone());
        caller.declare(Binding::new("x", 1, Value::int(1), false, false)).unwrap();
        caller.enter_block();
        caller.declare(Binding::new("tmp", 2, Value::int(2), false, false)).unwrap();

        let mut callee = Frame::call(scope, None);
        assert!(callee.lookup("tmp").is_none());
        assert!(callee.lookup("x").is_some());
        // Function locals may shadow module names
        callee.declare(Binding::new("x", 5, Value::int(5), false, false)).unwrap();
        match callee.lookup("x") {
            Some(Entry::Binding(b)) => assert_eq!(b.get(), Value::int(5)),
            other => panic!("unexpected lookup: {other:?}"),
        }
    }

    #[test]
    fn test_capture_takes_persistent_prefix() {
        let scope = ModuleScope::new("main", &[]);
        let mut frame = Frame::call(scope, None);
        frame.declare(binding("arg")).unwrap();
        let mark = frame.enter_block();
        frame.declare(binding("inner")).unwrap();
        let captured = frame.capture().unwrap();
        assert_eq!(captured.bindings.len(), 1);
        frame.exit_block(mark);
    }

    #[test]
    fn test_constant_refuses_set() {
        let b = Binding::new("k", 1, Value::int(1), true, false);
        assert_eq!(b.set(Value::int(2)).unwrap_err().kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_immutable_binding_copies_aggregates() {
        let list = Value::list(vec![Value::int(1)]);
        let copy = Binding::new("a", 1, list.clone(), false, false);
        let alias = Binding::new("b", 1, list.clone(), false, true);
        if let Value::List(l) = &list {
            l.borrow_mut().unwrap().push(Value::int(2));
        }
        assert_ne!(copy.get(), list);
        assert_eq!(alias.get(), list);
    }

    #[test]
    fn test_module_member_protection() {
        let scope = ModuleScope::new("lib", &[]);
        let mut frame = Frame::module(scope.clone());
        frame.declare(binding("Public")).unwrap();
        frame.declare(binding("hidden")).unwrap();
        let module = Module {
            name: "lib".into(),
            scope,
            line: 1,
        };
        assert!(module.member("Public").is_ok());
        assert_eq!(module.member("hidden").unwrap_err().kind, ErrorKind::Name);
    }
}
