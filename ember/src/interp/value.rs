//! Runtime values for the interpreter

use super::function::Function;
use super::number;
use super::record::{ClassDef, ClassInstance, StructDef, StructInstance};
use crate::error::{Result, ScriptError};
use bigdecimal::BigDecimal;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Shared list/map storage.
///
/// Lists and maps are reference-like: every `Value` clone points at the
/// same aggregate. A frozen aggregate rejects mutation.
#[derive(Debug, Default)]
pub struct Aggregate<T> {
    items: RefCell<T>,
    frozen: bool,
}

impl<T> Aggregate<T> {
    pub fn new(items: T) -> Rc<Self> {
        Rc::new(Aggregate {
            items: RefCell::new(items),
            frozen: false,
        })
    }

    pub fn frozen(items: T) -> Rc<Self> {
        Rc::new(Aggregate {
            items: RefCell::new(items),
            frozen: true,
        })
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.items.borrow()
    }

    /// Mutable access, refused for frozen aggregates
    pub fn borrow_mut(&self) -> Result<RefMut<'_, T>> {
        if self.frozen {
            return Err(ScriptError::value("value is immutable"));
        }
        self.items
            .try_borrow_mut()
            .map_err(|_| ScriptError::value("value is modified while it is being read"))
    }
}

pub type ListRef = Rc<Aggregate<Vec<Value>>>;
pub type MapRef = Rc<Aggregate<Vec<(Value, Value)>>>;

/// Value kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    None,
    Int,
    Float,
    Str,
    Bool,
    List,
    Map,
    Func,
    StructDef,
    StructIns,
    ClassDef,
    ClassIns,
}

impl Kind {
    pub fn name(&self) -> &'static str {
        match self {
            Kind::None => "none",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Str => "str",
            Kind::Bool => "bool",
            Kind::List => "list",
            Kind::Map => "map",
            Kind::Func => "func",
            Kind::StructDef => "structdef",
            Kind::StructIns => "struct",
            Kind::ClassDef => "classdef",
            Kind::ClassIns => "class",
        }
    }
}

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Int(BigDecimal),
    Float(BigDecimal),
    Str(Rc<str>),
    Bool(bool),
    List(ListRef),
    Map(MapRef),
    Func(Rc<Function>),
    StructDef(Rc<StructDef>),
    StructIns(Rc<StructInstance>),
    ClassDef(Rc<ClassDef>),
    ClassIns(Rc<ClassInstance>),
}

impl Value {
    pub fn int(n: i64) -> Self {
        Value::Int(BigDecimal::from(n))
    }

    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Aggregate::new(items))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Map(Aggregate::new(entries))
    }

    /// Number typed as Float or Int; Int payloads are truncated
    pub fn number(n: BigDecimal, float: bool) -> Self {
        if float {
            Value::Float(n)
        } else if number::is_integral(&n) {
            Value::Int(n)
        } else {
            Value::Int(number::truncate(&n))
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Value::None => Kind::None,
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::Str(_) => Kind::Str,
            Value::Bool(_) => Kind::Bool,
            Value::List(_) => Kind::List,
            Value::Map(_) => Kind::Map,
            Value::Func(_) => Kind::Func,
            Value::StructDef(_) => Kind::StructDef,
            Value::StructIns(_) => Kind::StructIns,
            Value::ClassDef(_) => Kind::ClassDef,
            Value::ClassIns(_) => Kind::ClassIns,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Only `true` itself is truthy
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Numeric view used by arithmetic and ordering (bools coerce to 1/0)
    pub fn as_number(&self) -> Option<(BigDecimal, bool)> {
        match self {
            Value::Int(n) => Some((n.clone(), false)),
            Value::Float(n) => Some((n.clone(), true)),
            Value::Bool(b) => Some((BigDecimal::from(i32::from(*b)), false)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integral index value
    pub fn as_index(&self) -> Result<i64> {
        match self {
            Value::Int(n) => number::to_i64(n)
                .ok_or_else(|| ScriptError::out_of_range("index is too large")),
            Value::Float(n) if number::is_integral(n) => number::to_i64(n)
                .ok_or_else(|| ScriptError::out_of_range("index is too large")),
            other => Err(ScriptError::value(format!(
                "index must be an integer, not {}",
                other.type_name()
            ))),
        }
    }

    /// Copy lists, maps and struct instances all the way down; frozen
    /// aggregates stay frozen
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::List(list) => {
                let items = list.borrow().iter().map(Value::deep_clone).collect();
                Value::List(if list.is_frozen() {
                    Aggregate::frozen(items)
                } else {
                    Aggregate::new(items)
                })
            }
            Value::Map(map) => {
                let entries = map
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.deep_clone(), v.deep_clone()))
                    .collect();
                Value::Map(if map.is_frozen() {
                    Aggregate::frozen(entries)
                } else {
                    Aggregate::new(entries)
                })
            }
            Value::StructIns(ins) => Value::StructIns(Rc::new(ins.deep_clone())),
            other => other.clone(),
        }
    }

    /// Frozen deep copy
    pub fn freeze(&self) -> Value {
        match self {
            Value::List(list) => {
                Value::List(Aggregate::frozen(list.borrow().iter().map(Value::freeze).collect()))
            }
            Value::Map(map) => Value::Map(Aggregate::frozen(
                map.borrow()
                    .iter()
                    .map(|(k, v)| (k.freeze(), v.freeze()))
                    .collect(),
            )),
            other => other.deep_clone(),
        }
    }

    /// Deep structural equality; Int and Float compare numerically
    pub fn deep_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Int(a) | Value::Float(a), Value::Int(b) | Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.deep_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        b.iter()
                            .any(|(k, v)| k.deep_eq(key) && v.deep_eq(value))
                    })
            }
            (Value::Func(a), Value::Func(b)) => Rc::ptr_eq(a, b),
            (Value::StructDef(a), Value::StructDef(b)) => Rc::ptr_eq(a, b),
            (Value::StructIns(a), Value::StructIns(b)) => a.deep_eq(b),
            (Value::ClassDef(a), Value::ClassDef(b)) => Rc::ptr_eq(a, b),
            (Value::ClassIns(a), Value::ClassIns(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Address of the list, map or struct instance behind this value
    fn identity(&self) -> Option<*const ()> {
        match self {
            Value::List(list) => Some(Rc::as_ptr(list).cast()),
            Value::Map(map) => Some(Rc::as_ptr(map).cast()),
            Value::StructIns(ins) => Some(Rc::as_ptr(ins).cast()),
            _ => None,
        }
    }

    /// Whether the aggregate at `target` is this value or sits anywhere
    /// inside it. Class instances are shared objects and are not entered.
    pub(crate) fn reaches(&self, target: *const ()) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![self.clone()];
        while let Some(value) = stack.pop() {
            let Some(id) = value.identity() else {
                continue;
            };
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            match &value {
                Value::List(list) => stack.extend(list.borrow().iter().cloned()),
                Value::Map(map) => stack.extend(
                    map.borrow()
                        .iter()
                        .flat_map(|(k, v)| [k.clone(), v.clone()]),
                ),
                Value::StructIns(ins) => stack.extend(ins.values()),
                _ => {}
            }
        }
        false
    }

    /// Refuse to store `value` inside this list or map when the result
    /// would contain itself
    pub fn ensure_storable(&self, value: &Value) -> Result<()> {
        match self.identity() {
            Some(target) if value.reaches(target) => Err(ScriptError::value(format!(
                "a {} cannot contain itself",
                self.type_name()
            ))),
            _ => Ok(()),
        }
    }

    /// Formatting used inside aggregates: strings are quoted
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{s:?}"),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.deep_eq(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Int(n) => write!(f, "{}", number::format(n, false)),
            Value::Float(n) => write!(f, "{}", number::format(n, true)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::List(list) => {
                let items: Vec<String> = list.borrow().iter().map(Value::repr).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Map(map) => {
                let entries: Vec<String> = map
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Value::Func(func) => write!(f, "<func {}>", func.name),
            Value::StructDef(def) => write!(f, "<struct {}>", def.name),
            Value::StructIns(ins) => write!(f, "{ins}"),
            Value::ClassDef(def) => write!(f, "<class {}>", def.name),
            Value::ClassIns(ins) => write!(f, "{ins}"),
        }
    }
}
