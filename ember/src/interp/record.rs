//! Struct and class records

use super::function::Function;
use super::scope::ModuleScope;
use super::value::Value;
use crate::error::{Result, ScriptError};
use crate::lexer::Token;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// `struct Name { a, b }`
#[derive(Debug)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<String>,
    pub line: usize,
}

/// Struct instance; fields are stored in declaration order
#[derive(Debug)]
pub struct StructInstance {
    pub def: Rc<StructDef>,
    values: RefCell<Vec<Value>>,
}

impl StructInstance {
    pub fn new(def: Rc<StructDef>, values: Vec<Value>) -> Self {
        StructInstance {
            def,
            values: RefCell::new(values),
        }
    }

    fn index_of(&self, field: &str) -> Result<usize> {
        self.def
            .fields
            .iter()
            .position(|f| f == field)
            .ok_or_else(|| {
                ScriptError::name(format!("struct {} has no field '{field}'", self.def.name))
            })
    }

    pub fn get(&self, field: &str) -> Result<Value> {
        let index = self.index_of(field)?;
        Ok(self.values.borrow()[index].clone())
    }

    pub fn values(&self) -> Vec<Value> {
        self.values.borrow().clone()
    }

    pub fn set(&self, field: &str, value: Value) -> Result<()> {
        let index = self.index_of(field)?;
        if value.reaches(std::ptr::from_ref(self).cast()) {
            return Err(ScriptError::value(format!(
                "struct {} cannot contain itself",
                self.def.name
            )));
        }
        self.values.borrow_mut()[index] = value;
        Ok(())
    }

    pub fn deep_clone(&self) -> Self {
        StructInstance::new(
            self.def.clone(),
            self.values.borrow().iter().map(Value::deep_clone).collect(),
        )
    }

    pub fn deep_eq(&self, other: &StructInstance) -> bool {
        Rc::ptr_eq(&self.def, &other.def)
            && self
                .values
                .borrow()
                .iter()
                .zip(other.values.borrow().iter())
                .all(|(a, b)| a.deep_eq(b))
    }
}

impl fmt::Display for StructInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.borrow();
        let fields: Vec<String> = self
            .def
            .fields
            .iter()
            .zip(values.iter())
            .map(|(name, value)| format!("{name}: {}", value.repr()))
            .collect();
        write!(f, "{}{{{}}}", self.def.name, fields.join(", "))
    }
}

/// Field declaration inside a class body
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub init: Vec<Token>,
    pub constant: bool,
    pub mutable: bool,
}

/// `class Name { var ... func ... }`
#[derive(Debug)]
pub struct ClassDef {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<Rc<Function>>,
    /// Method named after the class
    pub constructor: Option<Rc<Function>>,
    pub module: Weak<ModuleScope>,
    pub line: usize,
}

impl ClassDef {
    pub fn method(&self, name: &str) -> Option<&Rc<Function>> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[derive(Debug)]
pub struct Field {
    pub name: String,
    pub value: Value,
    pub constant: bool,
}

/// Class instance; shared by reference
#[derive(Debug)]
pub struct ClassInstance {
    pub class: Rc<ClassDef>,
    fields: RefCell<Vec<Field>>,
}

impl ClassInstance {
    pub fn new(class: Rc<ClassDef>, fields: Vec<Field>) -> Self {
        ClassInstance {
            class,
            fields: RefCell::new(fields),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields
            .borrow()
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.clone())
    }

    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        let mut fields = self.fields.borrow_mut();
        let field = fields.iter_mut().find(|f| f.name == name).ok_or_else(|| {
            ScriptError::name(format!("class {} has no field '{name}'", self.class.name))
        })?;
        if field.constant {
            return Err(ScriptError::syntax(format!(
                "field '{name}' is constant and cannot be changed"
            )));
        }
        field.value = value;
        Ok(())
    }
}

thread_local! {
    /// Class instances being formatted on this thread
    static FORMATTING: RefCell<Vec<*const ClassInstance>> = const { RefCell::new(Vec::new()) };
}

impl fmt::Display for ClassInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let this = std::ptr::from_ref(self);
        // Instances may refer back to themselves through their fields
        if FORMATTING.with(|active| active.borrow().contains(&this)) {
            return write!(f, "{}{{...}}", self.class.name);
        }
        FORMATTING.with(|active| active.borrow_mut().push(this));
        let fields: Vec<String> = self
            .fields
            .borrow()
            .iter()
            .map(|field| format!("{}: {}", field.name, field.value.repr()))
            .collect();
        FORMATTING.with(|active| active.borrow_mut().pop());
        write!(f, "{}{{{}}}", self.class.name, fields.join(", "))
    }
}
